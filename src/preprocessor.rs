//! Normalization and simplification pipeline over the PDAG.
//!
//! The passes run in a fixed order and each preserves the Boolean
//! semantics of the graph:
//!
//! 1. constant propagation,
//! 2. normalization to negation normal form (AND/OR over possibly
//!    complemented variables),
//! 3. NULL-gate elimination,
//! 4. coalescing of same-logic gates,
//! 5. Boolean absorption,
//! 6. module detection by visit intervals,
//! 7. the final feature check.
//!
//! Passes 3-5 feed each other, so they loop until a fixed point. Graph
//! invariants are re-checked at every pass boundary; a breach surfaces as
//! a logic error carrying the pass name.

use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;
use log::debug;

use crate::error::Error;
use crate::pdag::{AddOutcome, Branch, GateState, GateType, Pdag};

/// Hard bound on cleanup sweeps; the loop converges in a handful of
/// iterations on sane graphs.
const MAX_CLEANUP_SWEEPS: usize = 64;

pub struct Preprocessor<'a> {
    graph: &'a mut Pdag,
    abort: Option<&'a AtomicBool>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(graph: &'a mut Pdag, abort: Option<&'a AtomicBool>) -> Self {
        Self { graph, abort }
    }

    /// Run the whole pipeline.
    pub fn run(&mut self) -> Result<(), Error> {
        self.propagate_constants();
        self.checkpoint("constant propagation")?;

        self.normalize();
        self.checkpoint("normalization")?;

        let mut sweeps = 0;
        loop {
            let mut changed = false;
            changed |= self.eliminate_null_gates();
            changed |= self.coalesce_gates();
            changed |= self.absorb_args();
            self.checkpoint("cleanup")?;
            if !changed {
                break;
            }
            sweeps += 1;
            if sweeps > MAX_CLEANUP_SWEEPS {
                return Err(Error::Logic {
                    context: "cleanup".to_string(),
                    reason: "rewrite passes did not reach a fixed point".to_string(),
                });
            }
        }

        self.detect_modules();
        self.finalize_flags();
        self.checkpoint("module detection")
    }

    fn checkpoint(&self, pass: &str) -> Result<(), Error> {
        if let Some(flag) = self.abort {
            if flag.load(Ordering::Relaxed) {
                return Err(Error::Interrupted);
            }
        }
        debug!("checkpoint after {}", pass);
        self.graph.check_consistency().map_err(|reason| Error::Logic {
            context: pass.to_string(),
            reason,
        })
    }

    /// Pass 1: absorb Boolean constants into their parents and drop the
    /// constant nodes from the graph.
    fn propagate_constants(&mut self) {
        let mut queue: Vec<(u32, bool)> = Vec::new();
        for gate in self.graph.gather_gates() {
            for &arg in self.graph.gate(gate).constant_args() {
                let index = arg.unsigned_abs();
                let value = self.graph.constant_value(index);
                if !queue.contains(&(index, value)) {
                    queue.push((index, value));
                }
            }
            if self.graph.gate(gate).state() != GateState::Normal {
                let value = self.graph.gate(gate).state() == GateState::Unity;
                queue.push((gate, value));
            }
        }
        while let Some((index, value)) = queue.pop() {
            let parents: Vec<u32> = self.graph.parents(index).iter().copied().collect();
            for parent in parents {
                let arg = if self.graph.gate(parent).args().contains(&(index as i32)) {
                    index as i32
                } else if self.graph.gate(parent).args().contains(&-(index as i32)) {
                    -(index as i32)
                } else {
                    continue;
                };
                if self.graph.process_constant_arg(parent, arg, value) == AddOutcome::BecameConstant {
                    let state = self.graph.gate(parent).state();
                    if state != GateState::Normal {
                        queue.push((parent, state == GateState::Unity));
                    }
                }
            }
        }
    }

    /// Propagate a gate that collapsed into a constant state mid-pass.
    fn propagate_gate_state(&mut self, start: u32) {
        let mut queue = vec![start];
        while let Some(gate) = queue.pop() {
            let value = match self.graph.gate(gate).state() {
                GateState::Unity => true,
                GateState::Null => false,
                GateState::Normal => continue,
            };
            let parents: Vec<u32> = self.graph.parents(gate).iter().copied().collect();
            for parent in parents {
                let arg = if self.graph.gate(parent).args().contains(&(gate as i32)) {
                    gate as i32
                } else if self.graph.gate(parent).args().contains(&-(gate as i32)) {
                    -(gate as i32)
                } else {
                    continue;
                };
                if self.graph.process_constant_arg(parent, arg, value) == AddOutcome::BecameConstant {
                    queue.push(parent);
                }
            }
        }
    }

    /// Pass 2: rewrite the graph into negation normal form.
    ///
    /// NOT becomes a pass-through with a complemented argument, NAND/NOR
    /// complement their output edges, XOR and ATLEAST expand into AND/OR
    /// trees, and complemented gate edges are resolved into De Morgan
    /// twins, so complements survive only on variables.
    fn normalize(&mut self) {
        let mut complement_root = false;

        // NOT/NAND/NOR desugaring.
        for gate in self.graph.gather_gates() {
            match self.graph.gate(gate).gate_type() {
                GateType::Not => {
                    self.graph.gate_mut(gate).gate_type = GateType::Null;
                    let arg = self.graph.only_arg(gate);
                    self.graph.invert_arg(gate, arg);
                }
                kind @ (GateType::Nand | GateType::Nor) => {
                    self.graph.gate_mut(gate).gate_type = if kind == GateType::Nand {
                        GateType::And
                    } else {
                        GateType::Or
                    };
                    let parents: Vec<u32> = self.graph.parents(gate).iter().copied().collect();
                    for parent in parents {
                        let existing = if self.graph.gate(parent).args().contains(&(gate as i32)) {
                            gate as i32
                        } else {
                            -(gate as i32)
                        };
                        self.graph.invert_arg(parent, existing);
                    }
                    if gate == self.graph.root_index() {
                        complement_root = !complement_root;
                    }
                }
                _ => {}
            }
        }

        // XOR and ATLEAST expansion, including freshly created subgates.
        let mut worklist = self.graph.gather_gates();
        while let Some(gate) = worklist.pop() {
            match self.graph.gate(gate).gate_type() {
                GateType::Xor => self.normalize_xor(gate),
                GateType::Atleast => {
                    let fresh = self.normalize_atleast(gate);
                    worklist.extend(fresh);
                }
                _ => {}
            }
        }

        if complement_root {
            let root = self.graph.root_index();
            let flipped = match self.graph.gate(root).gate_type() {
                GateType::And => GateType::Or,
                GateType::Or => GateType::And,
                GateType::Null => GateType::Null,
                kind => unreachable!("complemented root of type {:?} after desugaring", kind),
            };
            self.graph.gate_mut(root).gate_type = flipped;
            self.graph.invert_args(root);
        }

        self.propagate_complements();
    }

    /// XOR(a, b) = (a ∧ ¬b) ∨ (¬a ∧ b).
    fn normalize_xor(&mut self, gate: u32) {
        let args: Vec<i32> = self.graph.gate(gate).args().iter().copied().collect();
        debug_assert_eq!(args.len(), 2);
        let (a, b) = (args[0], args[1]);
        self.graph.erase_all_args(gate);
        self.graph.gate_mut(gate).gate_type = GateType::Or;
        let left = self.graph.new_gate(GateType::And);
        let _ = self.graph.add_arg(left, a);
        let _ = self.graph.add_arg(left, -b);
        let right = self.graph.new_gate(GateType::And);
        let _ = self.graph.add_arg(right, -a);
        let _ = self.graph.add_arg(right, b);
        let _ = self.graph.add_arg(gate, left as i32);
        let _ = self.graph.add_arg(gate, right as i32);
    }

    /// @(k, {x} ∪ R) = (x ∧ @(k-1, R)) ∨ @(k, R), recursively.
    ///
    /// Returns fresh ATLEAST subgates that still need expansion.
    fn normalize_atleast(&mut self, gate: u32) -> Vec<u32> {
        let k = self.graph.gate(gate).vote_number().unwrap_or(0);
        debug_assert!(k >= 1);
        let args: Vec<i32> = self.graph.gate(gate).args().iter().copied().collect();
        let x = args[0];
        let rest = &args[1..];

        self.graph.erase_all_args(gate);
        {
            let entry = self.graph.gate_mut(gate);
            entry.gate_type = GateType::Or;
            entry.vote_number = None;
        }

        let mut fresh = Vec::new();
        let register = |graph: &Pdag, literal: i32, fresh: &mut Vec<u32>| {
            let index = literal.unsigned_abs();
            if graph.is_gate(index) && graph.gate(index).gate_type() == GateType::Atleast {
                fresh.push(index);
            }
        };

        match self.graph.atleast_branch(k - 1, rest) {
            // @(0, R): the branch is just x.
            Branch::True => {
                let _ = self.graph.add_arg(gate, x);
            }
            Branch::False => {}
            Branch::Literal(sub) => {
                register(self.graph, sub, &mut fresh);
                let and = self.graph.new_gate(GateType::And);
                let _ = self.graph.add_arg(and, x);
                let _ = self.graph.add_arg(and, sub);
                let _ = self.graph.add_arg(gate, and as i32);
            }
        }
        match self.graph.atleast_branch(k, rest) {
            Branch::True => unreachable!("atleast vote number collapsed to zero"),
            Branch::False => {}
            Branch::Literal(sub) => {
                register(self.graph, sub, &mut fresh);
                let _ = self.graph.add_arg(gate, sub);
            }
        }
        let _ = self.graph.reduce_arity(gate);
        fresh
    }

    /// Resolve complemented gate edges by building De Morgan twins.
    fn propagate_complements(&mut self) {
        let mut twins: HashMap<u32, u32> = HashMap::new();
        let mut stack = vec![self.graph.root_index()];
        let mut visited = hashbrown::HashSet::new();
        while let Some(gate) = stack.pop() {
            if !visited.insert(gate) {
                continue;
            }
            let negated: Vec<i32> = self
                .graph
                .gate(gate)
                .gate_args()
                .iter()
                .copied()
                .filter(|&a| a < 0)
                .collect();
            for arg in negated {
                let child = arg.unsigned_abs();
                let twin = match twins.get(&child) {
                    Some(&twin) => twin,
                    None => {
                        let twin = self.mk_twin(child);
                        twins.insert(child, twin);
                        twins.insert(twin, child);
                        twin
                    }
                };
                self.graph.erase_arg(gate, arg);
                let _ = self.graph.add_arg(gate, twin as i32);
                self.graph.release_if_orphan(child);
            }
            for &arg in self.graph.gate(gate).gate_args() {
                stack.push(arg.unsigned_abs());
            }
        }
    }

    /// Build the De Morgan complement of a normalized gate.
    fn mk_twin(&mut self, gate: u32) -> u32 {
        let flipped = match self.graph.gate(gate).gate_type() {
            GateType::And => GateType::Or,
            GateType::Or => GateType::And,
            GateType::Null => GateType::Null,
            kind => unreachable!("complement of unnormalized gate type {:?}", kind),
        };
        let args: Vec<i32> = self.graph.gate(gate).args().iter().copied().collect();
        let twin = self.graph.new_gate(flipped);
        for arg in args {
            let _ = self.graph.add_arg(twin, -arg);
        }
        debug!("built complement twin G{} for G{}", twin, gate);
        twin
    }

    /// Pass 3: splice single-argument pass-through gates into their
    /// parents, preserving edge signs.
    fn eliminate_null_gates(&mut self) -> bool {
        let mut changed = false;
        loop {
            // Demote single-argument AND/OR gates first.
            for gate in self.graph.gather_gates() {
                let entry = self.graph.gate(gate);
                if entry.state() == GateState::Normal
                    && matches!(entry.gate_type(), GateType::And | GateType::Or)
                    && entry.args().len() == 1
                {
                    self.graph.gate_mut(gate).gate_type = GateType::Null;
                }
            }

            let root = self.graph.root_index();
            let nulls: Vec<u32> = self
                .graph
                .gather_gates()
                .into_iter()
                .filter(|&g| {
                    g != root
                        && self.graph.gate(g).gate_type() == GateType::Null
                        && self.graph.gate(g).state() == GateState::Normal
                })
                .collect();
            if nulls.is_empty() {
                break;
            }
            for gate in nulls {
                if self.graph.gate(gate).gate_type() != GateType::Null
                    || self.graph.gate(gate).state() != GateState::Normal
                {
                    continue;
                }
                let arg = self.graph.only_arg(gate);
                let parents: Vec<u32> = self.graph.parents(gate).iter().copied().collect();
                for parent in parents {
                    let sign = if self.graph.gate(parent).args().contains(&(gate as i32)) {
                        1
                    } else {
                        -1
                    };
                    self.graph.erase_arg(parent, sign * gate as i32);
                    if self.graph.add_arg(parent, sign * arg) == AddOutcome::BecameConstant {
                        self.propagate_gate_state(parent);
                    }
                }
                self.graph.release_if_orphan(gate);
                changed = true;
            }
        }

        // A NULL root over a gate hoists the child into the root slot.
        loop {
            let root = self.graph.root_index();
            let entry = self.graph.gate(root);
            if entry.gate_type() != GateType::Null || entry.state() != GateState::Normal {
                break;
            }
            let arg = self.graph.only_arg(root);
            if arg < 0 || !self.graph.is_gate(arg.unsigned_abs()) {
                break;
            }
            let child = arg.unsigned_abs();
            self.graph.erase_arg(root, arg);
            self.graph.set_root(child);
            self.graph.release_if_orphan(root);
            changed = true;
        }
        changed
    }

    /// Pass 4: merge same-logic positive argument gates that have no other
    /// parent into their parent.
    fn coalesce_gates(&mut self) -> bool {
        let mut changed = false;
        let mut merged = true;
        while merged {
            merged = false;
            for gate in self.graph.gather_gates() {
                let kind = self.graph.gate(gate).gate_type();
                if !matches!(kind, GateType::And | GateType::Or)
                    || self.graph.gate(gate).state() != GateState::Normal
                {
                    continue;
                }
                let candidates: Vec<u32> = self
                    .graph
                    .gate(gate)
                    .gate_args()
                    .iter()
                    .copied()
                    .filter(|&a| a > 0)
                    .map(|a| a.unsigned_abs())
                    .filter(|&child| {
                        let entry = self.graph.gate(child);
                        entry.gate_type() == kind
                            && entry.state() == GateState::Normal
                            && !entry.is_module()
                            && self.graph.parents(child).len() == 1
                    })
                    .collect();
                for child in candidates {
                    if !self.graph.gate(gate).args().contains(&(child as i32)) {
                        continue;
                    }
                    debug!("coalescing G{} into G{}", child, gate);
                    if self.graph.join_gate(gate, child) == AddOutcome::BecameConstant {
                        self.propagate_gate_state(gate);
                    }
                    merged = true;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Pass 5: absorption. An AND gate drops an OR argument that shares a
    /// literal with its siblings (x ∧ (x ∨ y) = x), and dually for OR.
    fn absorb_args(&mut self) -> bool {
        let mut changed = false;
        for gate in self.graph.gather_gates() {
            let kind = self.graph.gate(gate).gate_type();
            let dual = match kind {
                GateType::And => GateType::Or,
                GateType::Or => GateType::And,
                _ => continue,
            };
            if self.graph.gate(gate).state() != GateState::Normal {
                continue;
            }
            let sub_gates: Vec<i32> = self
                .graph
                .gate(gate)
                .gate_args()
                .iter()
                .copied()
                .filter(|&a| a > 0)
                .collect();
            for sub in sub_gates {
                let child = sub.unsigned_abs();
                if self.graph.gate(child).gate_type() != dual {
                    continue;
                }
                if !self.graph.gate(gate).args().contains(&sub) {
                    continue;
                }
                let absorbed = self
                    .graph
                    .gate(child)
                    .args()
                    .iter()
                    .any(|a| self.graph.gate(gate).args().contains(a));
                if absorbed {
                    debug!("absorbing G{} out of G{}", child, gate);
                    self.graph.erase_arg(gate, sub);
                    self.graph.release_if_orphan(child);
                    let _ = self.graph.reduce_arity(gate);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Pass 6: mark independent modules.
    ///
    /// A DFS stamps enter/exit times; a gate is a module iff every
    /// descendant's visit interval nests strictly inside its own, meaning
    /// no descendant is shared with the rest of the graph.
    fn detect_modules(&mut self) {
        if self.graph.root_constant().is_some() {
            return;
        }
        self.graph.clear_visits();
        self.graph.clear_marks();
        let root = self.graph.root_index();
        let total = self.assign_timing(0, root);
        debug!("timing assigned up to {}", total);
        self.find_modules(root);
        debug_assert!(self.graph.gate(root).is_module());
    }

    fn assign_timing(&mut self, mut time: i32, gate: u32) -> i32 {
        time += 1;
        if self.graph.visit(gate, time) {
            return time; // Revisit of a shared gate.
        }
        let args: Vec<i32> = self.graph.gate(gate).args().iter().copied().collect();
        for arg in args {
            let index = arg.unsigned_abs();
            if self.graph.is_gate(index) {
                time = self.assign_timing(time, index);
            } else {
                time += 1;
                let _ = self.graph.visit(index, time);
            }
        }
        time += 1;
        let revisited = self.graph.visit(gate, time);
        debug_assert!(!revisited);
        time
    }

    fn find_modules(&mut self, gate: u32) -> (i32, i32) {
        if self.graph.gate(gate).mark {
            let entry = self.graph.gate(gate);
            return (entry.min_time, entry.max_time);
        }
        self.graph.gate_mut(gate).mark = true;

        let enter = self.graph.enter_time(gate);
        let exit = self.graph.exit_time(gate);
        let mut min_time = i32::MAX;
        let mut max_time = 0;
        let args: Vec<i32> = self.graph.gate(gate).args().iter().copied().collect();
        for arg in &args {
            let index = arg.unsigned_abs();
            let (lo, hi) = if self.graph.is_gate(index) {
                self.find_modules(index)
            } else {
                (self.graph.enter_time(index), self.graph.last_visit(index))
            };
            min_time = min_time.min(lo);
            max_time = max_time.max(hi);
        }
        if !args.is_empty() && min_time > enter && max_time < exit {
            debug!("module found: G{}", gate);
            self.graph.gate_mut(gate).module = true;
        }
        let min_time = min_time.min(enter);
        let max_time = max_time.max(self.graph.last_visit(gate));
        let entry = self.graph.gate_mut(gate);
        entry.min_time = min_time;
        entry.max_time = max_time;
        (min_time, max_time)
    }

    /// Pass 7: record the final graph features for the analysis driver.
    fn finalize_flags(&mut self) {
        let mut coherent = true;
        let mut normal = true;
        let mut constants = false;
        for gate in self.graph.gather_gates() {
            let entry = self.graph.gate(gate);
            if entry.state() != GateState::Normal {
                continue;
            }
            match entry.gate_type() {
                GateType::And | GateType::Or => {}
                _ => normal = false,
            }
            if !entry.constant_args().is_empty() {
                constants = true;
            }
            if entry.args().iter().any(|&a| a < 0) {
                coherent = false;
            }
        }
        self.graph.set_flags(coherent, normal, constants);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Formula, Model, Operand};
    use crate::pdag::format_pdag;

    use test_log::test;

    fn preprocessed(model: &Model) -> Pdag {
        let mut graph = Pdag::from_model(model, false).unwrap();
        Preprocessor::new(&mut graph, None).run().unwrap();
        graph
    }

    fn assert_normalized(graph: &Pdag) {
        for gate in graph.gather_gates() {
            let entry = graph.gate(gate);
            if entry.state() != GateState::Normal {
                continue;
            }
            if gate == graph.root_index() && entry.gate_type() == GateType::Null {
                continue;
            }
            assert!(
                matches!(entry.gate_type(), GateType::And | GateType::Or),
                "G{} kept type {:?}",
                gate,
                entry.gate_type()
            );
            assert!(entry.constant_args().is_empty());
        }
    }

    #[test]
    fn test_nand_normalizes_to_complemented_variables() {
        let mut model = Model::new("top");
        model
            .add_basic_event("a", 0.1)
            .add_basic_event("b", 0.2)
            .add_basic_event("c", 0.3)
            .add_gate(
                "top",
                Formula::or(vec![
                    Operand::formula(Formula::new(
                        crate::model::Connective::Nand,
                        vec![Operand::event("a"), Operand::event("b")],
                    )),
                    Operand::event("c"),
                ]),
            );
        let graph = preprocessed(&model);
        assert_normalized(&graph);
        assert!(!graph.coherent());
        // or(~a, ~b, c) after De Morgan and coalescing.
        let root = graph.root_index();
        assert_eq!(graph.gate(root).gate_type(), GateType::Or);
        assert!(graph.gate(root).variable_args().contains(&-1));
        assert!(graph.gate(root).variable_args().contains(&-2));
        assert!(graph.gate(root).variable_args().contains(&3));
    }

    #[test]
    fn test_atleast_expansion() {
        let mut model = Model::new("top");
        model
            .add_basic_event("a", 0.1)
            .add_basic_event("b", 0.1)
            .add_basic_event("c", 0.1)
            .add_gate(
                "top",
                Formula::atleast(
                    2,
                    vec![Operand::event("a"), Operand::event("b"), Operand::event("c")],
                ),
            );
        let graph = preprocessed(&model);
        assert_normalized(&graph);
        assert!(graph.coherent());
        assert!(graph.normal());
    }

    #[test]
    fn test_absorption() {
        // a ∨ (a ∧ b) = a.
        let mut model = Model::new("top");
        model
            .add_basic_event("a", 0.1)
            .add_basic_event("b", 0.2)
            .add_gate(
                "top",
                Formula::or(vec![
                    Operand::event("a"),
                    Operand::formula(Formula::and(vec![Operand::event("a"), Operand::event("b")])),
                ]),
            );
        let graph = preprocessed(&model);
        let root = graph.root_index();
        assert_eq!(graph.gate(root).gate_type(), GateType::Null);
        assert_eq!(graph.only_arg(root), 1);
    }

    #[test]
    fn test_constant_propagation() {
        // and(a, true) reduces to the variable; and(a, false) to nothing.
        let mut model = Model::new("top");
        model
            .add_basic_event("a", 0.1)
            .add_gate(
                "top",
                Formula::and(vec![Operand::event("a"), Operand::Constant(true)]),
            );
        let graph = preprocessed(&model);
        let root = graph.root_index();
        assert_eq!(graph.gate(root).gate_type(), GateType::Null);
        assert!(!graph.constants());

        let mut model = Model::new("top");
        model
            .add_basic_event("a", 0.1)
            .add_gate(
                "top",
                Formula::and(vec![Operand::event("a"), Operand::Constant(false)]),
            );
        let graph = preprocessed(&model);
        assert_eq!(graph.root_constant(), Some(false));
    }

    #[test]
    fn test_coalescing() {
        // or(a, or(b, c)) with the inner gate unshared flattens.
        let mut model = Model::new("top");
        model
            .add_basic_event("a", 0.1)
            .add_basic_event("b", 0.2)
            .add_basic_event("c", 0.3)
            .add_gate(
                "top",
                Formula::or(vec![
                    Operand::event("a"),
                    Operand::formula(Formula::or(vec![Operand::event("b"), Operand::event("c")])),
                ]),
            );
        let graph = preprocessed(&model);
        let root = graph.root_index();
        assert_eq!(graph.gate(root).args().len(), 3);
        assert!(graph.gate(root).gate_args().is_empty());
    }

    #[test]
    fn test_module_detection() {
        // top = (x ∧ y) ∨ z: the AND subgraph is an independent module.
        let mut model = Model::new("top");
        model
            .add_basic_event("x", 0.1)
            .add_basic_event("y", 0.2)
            .add_basic_event("z", 0.3)
            .add_gate("m1", Formula::and(vec![Operand::event("x"), Operand::event("y")]))
            .add_gate("top", Formula::or(vec![Operand::gate("m1"), Operand::event("z")]));
        let graph = preprocessed(&model);
        let root = graph.root_index();
        assert!(graph.gate(root).is_module());
        let inner = graph.gate(root).gate_args().iter().next().copied().unwrap() as u32;
        assert!(graph.gate(inner).is_module());
    }

    #[test]
    fn test_shared_gate_modularity() {
        // g = a ∧ b is referenced from both branches. Its own variables
        // stay inside its subtree, so g itself is an independent module;
        // the hosts sharing it are not.
        let mut model = Model::new("top");
        model
            .add_basic_event("a", 0.1)
            .add_basic_event("b", 0.2)
            .add_basic_event("c", 0.3)
            .add_basic_event("d", 0.4)
            .add_gate("g", Formula::and(vec![Operand::event("a"), Operand::event("b")]))
            .add_gate("left", Formula::and(vec![Operand::gate("g"), Operand::event("c")]))
            .add_gate("right", Formula::and(vec![Operand::gate("g"), Operand::event("d")]))
            .add_gate("top", Formula::or(vec![Operand::gate("left"), Operand::gate("right")]));
        let graph = preprocessed(&model);
        let mut shorthand = String::new();
        format_pdag(&graph, &mut shorthand).unwrap();
        for gate in graph.gather_gates() {
            let entry = graph.gate(gate);
            if gate == graph.root_index() {
                continue;
            }
            if entry.variable_args().contains(&1) && entry.variable_args().contains(&2) {
                assert!(entry.is_module(), "independent shared gate lost modularity:\n{}", shorthand);
            } else {
                // The hosts see g revisited from the other branch.
                assert!(!entry.is_module(), "host of a shared gate marked module:\n{}", shorthand);
            }
        }
    }
}
