//! Propositional directed acyclic graph (PDAG).
//!
//! The PDAG is the indexed, mutable intermediate form of a fault tree.
//! Basic events become variables with dense indices `1..=n` (so `index - 1`
//! recovers the event), while gates and constants take indices above the
//! variable range. Arguments are signed indices: a negative argument is the
//! complement of the node it points to.
//!
//! Nodes live in an arena owned by the graph. The argument side of an edge
//! is a signed index in the gate's ordered argument set; the parent side is
//! a plain index set, so parents never keep a gate alive and shared
//! subgraphs are shared by construction.
//!
//! Structural preconditions are asserted rather than reported: the graph
//! API trusts its caller (the preprocessor) to keep the graph well-formed,
//! and [`Pdag::check_consistency`] verifies the invariants at pass
//! boundaries.

use std::collections::BTreeSet;
use std::fmt::Write;

use hashbrown::{HashMap, HashSet};

use crate::error::ValidityError;
use crate::model::{CcfGroup, Connective, Formula, Model, Operand};

/// Boolean operator of an indexed gate.
///
/// Only `And` and `Or` survive preprocessing; the rest exist to capture the
/// input faithfully before normalization.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GateType {
    And,
    Or,
    Atleast,
    Xor,
    Not,
    Nand,
    Nor,
    /// Single-argument pass-through.
    Null,
}

/// Constant state a gate may collapse into.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GateState {
    Normal,
    /// The gate is the empty set: guaranteed non-failure.
    Null,
    /// The gate is unity: guaranteed failure.
    Unity,
}

/// Result of a structural mutation: whether the gate collapsed into a
/// constant state as a side effect.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[must_use]
pub enum AddOutcome {
    Normal,
    BecameConstant,
}

/// An indexed gate.
///
/// Arguments are kept in one ordered signed set plus three per-kind views
/// that must stay in sync (`args` is always the disjoint union of the
/// views). The traversal scratch (`mark`, `min_time`, `max_time`) belongs
/// to whichever algorithm is currently running.
#[derive(Debug, Clone)]
pub struct IGate {
    pub(crate) gate_type: GateType,
    pub(crate) state: GateState,
    pub(crate) vote_number: Option<u32>,
    pub(crate) mark: bool,
    pub(crate) min_time: i32,
    pub(crate) max_time: i32,
    pub(crate) module: bool,
    pub(crate) args: BTreeSet<i32>,
    pub(crate) gate_args: BTreeSet<i32>,
    pub(crate) variable_args: BTreeSet<i32>,
    pub(crate) constant_args: BTreeSet<i32>,
}

impl IGate {
    fn new(gate_type: GateType) -> Self {
        Self {
            gate_type,
            state: GateState::Normal,
            vote_number: None,
            mark: false,
            min_time: 0,
            max_time: 0,
            module: false,
            args: BTreeSet::new(),
            gate_args: BTreeSet::new(),
            variable_args: BTreeSet::new(),
            constant_args: BTreeSet::new(),
        }
    }

    pub fn gate_type(&self) -> GateType {
        self.gate_type
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn vote_number(&self) -> Option<u32> {
        self.vote_number
    }

    pub fn is_module(&self) -> bool {
        self.module
    }

    pub fn args(&self) -> &BTreeSet<i32> {
        &self.args
    }

    pub fn gate_args(&self) -> &BTreeSet<i32> {
        &self.gate_args
    }

    pub fn variable_args(&self) -> &BTreeSet<i32> {
        &self.variable_args
    }

    pub fn constant_args(&self) -> &BTreeSet<i32> {
        &self.constant_args
    }
}

/// A variable together with the basic event it indexes.
#[derive(Debug, Clone)]
pub struct IndexedEvent {
    pub id: String,
    pub probability: f64,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Variable,
    Constant(bool),
    Gate(IGate),
}

#[derive(Debug, Clone)]
struct NodeSlot {
    kind: NodeKind,
    parents: BTreeSet<u32>,
    visits: [i32; 3],
    opti_value: i32,
}

impl NodeSlot {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parents: BTreeSet::new(),
            visits: [0; 3],
            opti_value: 0,
        }
    }
}

/// The Boolean graph: arena of nodes, current root gate, and the feature
/// flags recorded for the analysis driver.
pub struct Pdag {
    nodes: Vec<NodeSlot>,
    root: u32,
    num_variables: u32,
    events: Vec<IndexedEvent>,
    constant_true: Option<u32>,
    coherent: bool,
    normal: bool,
    constants: bool,
}

/// Result of building a reduced `@(k, args)` term.
pub(crate) enum Branch {
    True,
    False,
    Literal(i32),
}

impl Pdag {
    /// Build the indexed graph from a model.
    ///
    /// With `ccf` enabled, every member of a common-cause group is replaced
    /// by `OR(independent, common)` over two synthesized variables.
    pub fn from_model(model: &Model, ccf: bool) -> Result<Self, ValidityError> {
        model.validate()?;

        let mut graph = Pdag {
            nodes: vec![NodeSlot::new(NodeKind::Constant(false))], // index 0 sentry
            root: 0,
            num_variables: 0,
            events: Vec::new(),
            constant_true: None,
            coherent: true,
            normal: true,
            constants: false,
        };

        // First pass: discover basic events in deterministic reference
        // order so variables get dense indices 1..=n before any gate index
        // is handed out.
        let mut event_order: Vec<&str> = Vec::new();
        let mut seen_events: HashSet<&str> = HashSet::new();
        let mut seen_gates: HashSet<&str> = HashSet::new();
        let top = match model.gate(model.top()) {
            Some(gate) => gate,
            None => unreachable!("validated model lost its top gate"),
        };
        collect_events(model, &top.formula, &mut seen_gates, &mut seen_events, &mut event_order);

        let groups: HashMap<&str, &CcfGroup> = if ccf {
            model
                .ccf_groups()
                .iter()
                .flat_map(|g| g.members.iter().map(move |m| (m.as_str(), g)))
                .collect()
        } else {
            HashMap::new()
        };

        let mut event_vars: HashMap<String, u32> = HashMap::new();
        let mut group_vars: HashMap<String, u32> = HashMap::new();
        for id in event_order {
            let event = match model.basic_event(id) {
                Some(event) => event,
                None => unreachable!("validated model lost basic event `{}`", id),
            };
            if let Some(group) = groups.get(id) {
                let index = graph.new_variable(IndexedEvent {
                    id: id.to_string(),
                    probability: (1.0 - group.beta) * event.probability,
                });
                event_vars.insert(id.to_string(), index);
                if !group_vars.contains_key(&group.id) {
                    let common = graph.new_variable(IndexedEvent {
                        id: format!("CCF({})", group.id),
                        probability: group.beta * event.probability,
                    });
                    group_vars.insert(group.id.clone(), common);
                }
            } else {
                let index = graph.new_variable(IndexedEvent {
                    id: id.to_string(),
                    probability: event.probability,
                });
                event_vars.insert(id.to_string(), index);
            }
        }

        let mut builder = Builder {
            model,
            groups,
            event_vars,
            group_vars,
            member_gates: HashMap::new(),
            gate_map: HashMap::new(),
        };
        let root = graph.build_gate(model.top(), &mut builder);
        graph.root = root;
        Ok(graph)
    }

    pub fn root_index(&self) -> u32 {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: u32) {
        self.root = root;
    }

    pub fn num_variables(&self) -> u32 {
        self.num_variables
    }

    /// Indexed basic events; position `i` corresponds to variable `i + 1`.
    pub fn events(&self) -> &[IndexedEvent] {
        &self.events
    }

    /// True if no variable appears complemented after preprocessing.
    pub fn coherent(&self) -> bool {
        self.coherent
    }

    /// True if only AND and OR gates remain.
    pub fn normal(&self) -> bool {
        self.normal
    }

    /// True if constants remain in the graph (they should not).
    pub fn constants(&self) -> bool {
        self.constants
    }

    pub(crate) fn set_flags(&mut self, coherent: bool, normal: bool, constants: bool) {
        self.coherent = coherent;
        self.normal = normal;
        self.constants = constants;
    }

    /// The constant state of the root, if the graph collapsed.
    pub fn root_constant(&self) -> Option<bool> {
        match self.gate(self.root).state {
            GateState::Normal => None,
            GateState::Null => Some(false),
            GateState::Unity => Some(true),
        }
    }
}

// Node accessors.
impl Pdag {
    pub fn is_variable(&self, index: u32) -> bool {
        matches!(self.nodes[index as usize].kind, NodeKind::Variable)
    }

    pub fn is_constant(&self, index: u32) -> bool {
        index != 0 && matches!(self.nodes[index as usize].kind, NodeKind::Constant(_))
    }

    pub fn is_gate(&self, index: u32) -> bool {
        matches!(self.nodes[index as usize].kind, NodeKind::Gate(_))
    }

    pub fn constant_value(&self, index: u32) -> bool {
        match self.nodes[index as usize].kind {
            NodeKind::Constant(value) => value,
            _ => panic!("node {} is not a constant", index),
        }
    }

    pub fn gate(&self, index: u32) -> &IGate {
        match &self.nodes[index as usize].kind {
            NodeKind::Gate(gate) => gate,
            _ => panic!("node {} is not a gate", index),
        }
    }

    pub(crate) fn gate_mut(&mut self, index: u32) -> &mut IGate {
        match &mut self.nodes[index as usize].kind {
            NodeKind::Gate(gate) => gate,
            _ => panic!("node {} is not a gate", index),
        }
    }

    pub fn parents(&self, index: u32) -> &BTreeSet<u32> {
        &self.nodes[index as usize].parents
    }

    pub fn opti_value(&self, index: u32) -> i32 {
        self.nodes[index as usize].opti_value
    }

    pub fn set_opti_value(&mut self, index: u32, value: i32) {
        self.nodes[index as usize].opti_value = value;
    }

    /// The single argument of a NULL or NOT gate.
    pub fn only_arg(&self, gate: u32) -> i32 {
        let gate = self.gate(gate);
        debug_assert_eq!(gate.args.len(), 1);
        match gate.args.iter().next() {
            Some(&arg) => arg,
            None => unreachable!("pass-through gate without an argument"),
        }
    }

    pub(crate) fn vote(&self, gate: u32) -> u32 {
        match self.gate(gate).vote_number {
            Some(k) => k,
            None => unreachable!("atleast gate without a vote number"),
        }
    }
}

// Traversal bookkeeping.
impl Pdag {
    /// Register a visit at `time`.
    ///
    /// The first call records the enter time, the second the exit time;
    /// any later call records the last-visit time and returns true.
    pub fn visit(&mut self, index: u32, time: i32) -> bool {
        debug_assert!(time > 0);
        let visits = &mut self.nodes[index as usize].visits;
        if visits[0] == 0 {
            visits[0] = time;
        } else if visits[1] == 0 {
            visits[1] = time;
        } else {
            visits[2] = time;
            return true;
        }
        false
    }

    pub fn enter_time(&self, index: u32) -> i32 {
        self.nodes[index as usize].visits[0]
    }

    pub fn exit_time(&self, index: u32) -> i32 {
        self.nodes[index as usize].visits[1]
    }

    pub fn last_visit(&self, index: u32) -> i32 {
        let visits = &self.nodes[index as usize].visits;
        if visits[2] != 0 {
            visits[2]
        } else if visits[1] != 0 {
            visits[1]
        } else {
            visits[0]
        }
    }

    pub fn clear_visits(&mut self) {
        for node in &mut self.nodes {
            node.visits = [0; 3];
        }
    }

    pub(crate) fn clear_marks(&mut self) {
        for node in &mut self.nodes {
            if let NodeKind::Gate(gate) = &mut node.kind {
                gate.mark = false;
            }
        }
    }

    /// All gates reachable from the root, in deterministic DFS preorder.
    pub fn gather_gates(&self) -> Vec<u32> {
        let mut gates = Vec::new();
        let mut visited: HashSet<u32> = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            if !visited.insert(index) {
                continue;
            }
            gates.push(index);
            for &arg in self.gate(index).gate_args.iter().rev() {
                stack.push(arg.unsigned_abs());
            }
        }
        gates
    }
}

// Structural mutations.
impl Pdag {
    pub fn new_gate(&mut self, gate_type: GateType) -> u32 {
        let index = self.nodes.len() as u32;
        self.nodes.push(NodeSlot::new(NodeKind::Gate(IGate::new(gate_type))));
        index
    }

    fn new_variable(&mut self, event: IndexedEvent) -> u32 {
        debug_assert_eq!(self.nodes.len() as u32, self.num_variables + 1);
        let index = self.nodes.len() as u32;
        self.nodes.push(NodeSlot::new(NodeKind::Variable));
        self.events.push(event);
        self.num_variables += 1;
        index
    }

    /// The shared Boolean TRUE node; FALSE is its complement.
    pub fn constant(&mut self) -> u32 {
        if let Some(index) = self.constant_true {
            return index;
        }
        let index = self.nodes.len() as u32;
        self.nodes.push(NodeSlot::new(NodeKind::Constant(true)));
        self.constant_true = Some(index);
        self.constants = true;
        index
    }

    /// Insert a signed argument, resolving duplicates and complements
    /// according to the gate logic.
    ///
    /// Complex gates (XOR, ATLEAST) are rewritten in place when a duplicate
    /// or complement forces it; the caller must tolerate type changes.
    pub fn add_arg(&mut self, gate: u32, arg: i32) -> AddOutcome {
        debug_assert_ne!(arg, 0);
        debug_assert!((arg.unsigned_abs() as usize) < self.nodes.len());
        if self.gate(gate).state != GateState::Normal {
            return AddOutcome::BecameConstant;
        }
        if self.gate(gate).args.contains(&arg) {
            return self.process_duplicate_arg(gate, arg);
        }
        if self.gate(gate).args.contains(&-arg) {
            return self.process_complement_arg(gate, arg);
        }

        let index = arg.unsigned_abs();
        let kind_set = match self.nodes[index as usize].kind {
            NodeKind::Variable => 0,
            NodeKind::Constant(_) => 1,
            NodeKind::Gate(_) => 2,
        };
        let entry = self.gate_mut(gate);
        entry.args.insert(arg);
        match kind_set {
            0 => entry.variable_args.insert(arg),
            1 => entry.constant_args.insert(arg),
            _ => entry.gate_args.insert(arg),
        };
        self.nodes[index as usize].parents.insert(gate);
        AddOutcome::Normal
    }

    fn process_duplicate_arg(&mut self, gate: u32, arg: i32) -> AddOutcome {
        match self.gate(gate).gate_type {
            GateType::And | GateType::Or | GateType::Nand | GateType::Nor | GateType::Not | GateType::Null => {
                AddOutcome::Normal
            }
            // x XOR x = 0.
            GateType::Xor => self.nullify(gate),
            // @(k, {x, x} ∪ R) = (x ∧ @(k-2, R)) ∨ @(k, R).
            GateType::Atleast => {
                let k = self.vote(gate);
                let rest: Vec<i32> = self.gate(gate).args.iter().copied().filter(|&a| a != arg).collect();
                self.erase_all_args(gate);
                {
                    let entry = self.gate_mut(gate);
                    entry.gate_type = GateType::Or;
                    entry.vote_number = None;
                }
                match self.atleast_branch(k.saturating_sub(2), &rest) {
                    Branch::True => {
                        let _ = self.add_arg(gate, arg);
                    }
                    Branch::False => {}
                    Branch::Literal(sub) => {
                        let and = self.new_gate(GateType::And);
                        let _ = self.add_arg(and, arg);
                        let _ = self.add_arg(and, sub);
                        let _ = self.add_arg(gate, and as i32);
                    }
                }
                match self.atleast_branch(k, &rest) {
                    Branch::True => return self.make_unity(gate),
                    Branch::False => {}
                    Branch::Literal(sub) => {
                        let _ = self.add_arg(gate, sub);
                    }
                }
                self.reduce_arity(gate)
            }
        }
    }

    fn process_complement_arg(&mut self, gate: u32, arg: i32) -> AddOutcome {
        match self.gate(gate).gate_type {
            // x ∧ ¬x = 0; NOR over a tautology likewise.
            GateType::And | GateType::Nor => self.nullify(gate),
            GateType::Or | GateType::Nand | GateType::Xor => self.make_unity(gate),
            // Exactly one of the pair holds: @(k, {x, ¬x} ∪ R) = @(k-1, R).
            GateType::Atleast => {
                let k = self.vote(gate);
                self.erase_arg(gate, -arg);
                if k == 1 {
                    return self.make_unity(gate);
                }
                self.gate_mut(gate).vote_number = Some(k - 1);
                self.reduce_atleast(gate)
            }
            GateType::Not | GateType::Null => {
                unreachable!("pass-through gate received a second argument")
            }
        }
    }

    /// Build `@(k, args)` as a literal, collapsing the degenerate shapes.
    pub(crate) fn atleast_branch(&mut self, k: u32, args: &[i32]) -> Branch {
        let n = args.len() as u32;
        if k == 0 {
            return Branch::True;
        }
        if k > n {
            return Branch::False;
        }
        if n == 1 {
            return Branch::Literal(args[0]);
        }
        let gate_type = if k == n {
            GateType::And
        } else if k == 1 {
            GateType::Or
        } else {
            GateType::Atleast
        };
        let sub = self.new_gate(gate_type);
        if gate_type == GateType::Atleast {
            self.gate_mut(sub).vote_number = Some(k);
        }
        for &a in args {
            let _ = self.add_arg(sub, a);
        }
        Branch::Literal(sub as i32)
    }

    /// Collapse degenerate ATLEAST shapes after the vote number or the
    /// argument count changed.
    pub(crate) fn reduce_atleast(&mut self, gate: u32) -> AddOutcome {
        let k = self.vote(gate);
        let n = self.gate(gate).args.len() as u32;
        if k == 0 {
            return self.make_unity(gate);
        }
        if n < k {
            return self.nullify(gate);
        }
        if n == 1 {
            let entry = self.gate_mut(gate);
            entry.gate_type = GateType::Null;
            entry.vote_number = None;
        } else if k == n {
            let entry = self.gate_mut(gate);
            entry.gate_type = GateType::And;
            entry.vote_number = None;
        } else if k == 1 {
            let entry = self.gate_mut(gate);
            entry.gate_type = GateType::Or;
            entry.vote_number = None;
        }
        AddOutcome::Normal
    }

    /// Handle empty and single-argument gates after an erasure.
    pub(crate) fn reduce_arity(&mut self, gate: u32) -> AddOutcome {
        let n = self.gate(gate).args.len();
        match self.gate(gate).gate_type {
            GateType::And | GateType::Nor if n == 0 => self.make_unity(gate),
            GateType::Or | GateType::Nand if n == 0 => self.nullify(gate),
            GateType::And | GateType::Or if n == 1 => {
                self.gate_mut(gate).gate_type = GateType::Null;
                AddOutcome::Normal
            }
            GateType::Nand | GateType::Nor if n == 1 => {
                self.gate_mut(gate).gate_type = GateType::Not;
                AddOutcome::Normal
            }
            _ => AddOutcome::Normal,
        }
    }

    /// React to a constant argument: absorb it or collapse the gate.
    pub(crate) fn process_constant_arg(&mut self, gate: u32, arg: i32, value: bool) -> AddOutcome {
        if self.gate(gate).state != GateState::Normal {
            return AddOutcome::BecameConstant;
        }
        debug_assert!(self.gate(gate).args.contains(&arg));
        let effective = if arg < 0 { !value } else { value };
        match self.gate(gate).gate_type {
            GateType::And => {
                if effective {
                    self.erase_arg(gate, arg);
                    self.reduce_arity(gate)
                } else {
                    self.nullify(gate)
                }
            }
            GateType::Or => {
                if effective {
                    self.make_unity(gate)
                } else {
                    self.erase_arg(gate, arg);
                    self.reduce_arity(gate)
                }
            }
            GateType::Nand => {
                if effective {
                    self.erase_arg(gate, arg);
                    self.reduce_arity(gate)
                } else {
                    self.make_unity(gate)
                }
            }
            GateType::Nor => {
                if effective {
                    self.nullify(gate)
                } else {
                    self.erase_arg(gate, arg);
                    self.reduce_arity(gate)
                }
            }
            GateType::Not => {
                if effective {
                    self.nullify(gate)
                } else {
                    self.make_unity(gate)
                }
            }
            GateType::Null => {
                if effective {
                    self.make_unity(gate)
                } else {
                    self.nullify(gate)
                }
            }
            // XOR(1, y) = ¬y and XOR(0, y) = y.
            GateType::Xor => {
                self.erase_arg(gate, arg);
                let entry = self.gate_mut(gate);
                entry.gate_type = if effective { GateType::Not } else { GateType::Null };
                AddOutcome::Normal
            }
            GateType::Atleast => {
                self.erase_arg(gate, arg);
                if effective {
                    let k = self.vote(gate);
                    if k == 1 {
                        return self.make_unity(gate);
                    }
                    self.gate_mut(gate).vote_number = Some(k - 1);
                }
                self.reduce_atleast(gate)
            }
        }
    }

    pub(crate) fn erase_arg(&mut self, gate: u32, arg: i32) {
        let index = arg.unsigned_abs();
        let entry = self.gate_mut(gate);
        let removed = entry.args.remove(&arg);
        debug_assert!(removed, "gate has no argument {}", arg);
        entry.gate_args.remove(&arg);
        entry.variable_args.remove(&arg);
        entry.constant_args.remove(&arg);
        self.nodes[index as usize].parents.remove(&gate);
    }

    pub(crate) fn erase_all_args(&mut self, gate: u32) {
        let args: Vec<i32> = self.gate(gate).args.iter().copied().collect();
        for arg in args {
            self.erase_arg(gate, arg);
        }
    }

    /// Set the gate to the null (guaranteed non-failure) state.
    pub(crate) fn nullify(&mut self, gate: u32) -> AddOutcome {
        debug_assert_eq!(self.gate(gate).state, GateState::Normal);
        self.erase_all_args(gate);
        self.gate_mut(gate).state = GateState::Null;
        AddOutcome::BecameConstant
    }

    /// Set the gate to the unity (guaranteed failure) state.
    pub(crate) fn make_unity(&mut self, gate: u32) -> AddOutcome {
        debug_assert_eq!(self.gate(gate).state, GateState::Normal);
        self.erase_all_args(gate);
        self.gate_mut(gate).state = GateState::Unity;
        AddOutcome::BecameConstant
    }

    /// De Morgan helper: complement every argument.
    pub(crate) fn invert_args(&mut self, gate: u32) {
        let entry = self.gate_mut(gate);
        entry.args = entry.args.iter().map(|a| -a).collect();
        entry.gate_args = entry.gate_args.iter().map(|a| -a).collect();
        entry.variable_args = entry.variable_args.iter().map(|a| -a).collect();
        entry.constant_args = entry.constant_args.iter().map(|a| -a).collect();
    }

    /// De Morgan helper: complement a single existing argument.
    pub(crate) fn invert_arg(&mut self, gate: u32, existing: i32) {
        let entry = self.gate_mut(gate);
        debug_assert!(entry.args.contains(&existing));
        debug_assert!(!entry.args.contains(&-existing));
        entry.args.remove(&existing);
        entry.args.insert(-existing);
        for set in [&mut entry.gate_args, &mut entry.variable_args, &mut entry.constant_args] {
            if set.remove(&existing) {
                set.insert(-existing);
            }
        }
    }

    /// Coalesce a same-logic positive argument gate into this gate.
    ///
    /// Type compatibility is the caller's responsibility.
    pub(crate) fn join_gate(&mut self, gate: u32, child: u32) -> AddOutcome {
        debug_assert!(self.gate(gate).args.contains(&(child as i32)));
        self.erase_arg(gate, child as i32);
        let args: Vec<i32> = self.gate(child).args.iter().copied().collect();
        for arg in args {
            if self.add_arg(gate, arg) == AddOutcome::BecameConstant {
                self.release_if_orphan(child);
                return AddOutcome::BecameConstant;
            }
        }
        self.release_if_orphan(child);
        AddOutcome::Normal
    }

    /// Move an argument to another gate, updating back-references.
    pub fn transfer_arg(&mut self, gate: u32, arg: i32, recipient: u32) -> AddOutcome {
        self.erase_arg(gate, arg);
        self.add_arg(recipient, arg)
    }

    /// Alias an argument into another gate without removing it here.
    pub fn share_arg(&mut self, gate: u32, arg: i32, recipient: u32) -> AddOutcome {
        debug_assert!(self.gate(gate).args.contains(&arg));
        self.add_arg(recipient, arg)
    }

    /// Drop the whole subtree of a gate that lost its last parent.
    pub(crate) fn release_if_orphan(&mut self, index: u32) {
        if index == self.root || !self.is_gate(index) {
            return;
        }
        if !self.nodes[index as usize].parents.is_empty() {
            return;
        }
        let args: Vec<i32> = self.gate(index).args.iter().copied().collect();
        self.erase_all_args(index);
        for arg in args {
            self.release_if_orphan(arg.unsigned_abs());
        }
    }
}

// Invariant checking.
impl Pdag {
    /// Verify the structural invariants over the reachable graph.
    ///
    /// Returns a description of the first violation, for the driver to wrap
    /// into a logic error with pass context.
    pub fn check_consistency(&self) -> Result<(), String> {
        for index in self.gather_gates() {
            let gate = self.gate(index);
            let views = gate.gate_args.len() + gate.variable_args.len() + gate.constant_args.len();
            if views != gate.args.len() {
                return Err(format!("G{}: argument views diverge from the argument set", index));
            }
            if gate.state != GateState::Normal {
                if !gate.args.is_empty() {
                    return Err(format!("G{}: constant gate still has arguments", index));
                }
                continue;
            }
            match gate.gate_type {
                GateType::Not | GateType::Null => {
                    if gate.args.len() != 1 {
                        return Err(format!("G{}: pass-through gate with {} arguments", index, gate.args.len()));
                    }
                }
                GateType::Atleast => {
                    let k = match gate.vote_number {
                        Some(k) => k,
                        None => return Err(format!("G{}: atleast gate without a vote number", index)),
                    };
                    let n = gate.args.len() as u32;
                    if n < 2 || k < 1 || k > n {
                        return Err(format!("G{}: atleast gate with k={} over {} arguments", index, k, n));
                    }
                }
                _ => {}
            }
            for &arg in &gate.args {
                if gate.args.contains(&-arg) {
                    return Err(format!("G{}: complement pair over node {}", index, arg.unsigned_abs()));
                }
                let child = arg.unsigned_abs();
                let in_view = match self.nodes[child as usize].kind {
                    NodeKind::Variable => gate.variable_args.contains(&arg),
                    NodeKind::Constant(_) => gate.constant_args.contains(&arg),
                    NodeKind::Gate(_) => gate.gate_args.contains(&arg),
                };
                if !in_view {
                    return Err(format!("G{}: argument {} is in the wrong kind view", index, arg));
                }
                if !self.nodes[child as usize].parents.contains(&index) {
                    return Err(format!("G{}: node {} lacks the parent back-reference", index, child));
                }
            }
        }
        Ok(())
    }
}

struct Builder<'a> {
    model: &'a Model,
    groups: HashMap<&'a str, &'a CcfGroup>,
    event_vars: HashMap<String, u32>,
    group_vars: HashMap<String, u32>,
    member_gates: HashMap<String, u32>,
    gate_map: HashMap<String, u32>,
}

impl Pdag {
    fn build_gate(&mut self, id: &str, builder: &mut Builder<'_>) -> u32 {
        if let Some(&index) = builder.gate_map.get(id) {
            return index;
        }
        let formula = match builder.model.gate(id) {
            Some(gate) => gate.formula.clone(),
            None => unreachable!("validated model lost gate `{}`", id),
        };
        let index = self.build_formula(&formula, builder);
        builder.gate_map.insert(id.to_string(), index);
        index
    }

    fn build_formula(&mut self, formula: &Formula, builder: &mut Builder<'_>) -> u32 {
        let gate_type = match formula.connective {
            Connective::And => GateType::And,
            Connective::Or => GateType::Or,
            Connective::Atleast => GateType::Atleast,
            Connective::Xor => GateType::Xor,
            Connective::Not => GateType::Not,
            Connective::Nand => GateType::Nand,
            Connective::Nor => GateType::Nor,
            Connective::Null => GateType::Null,
        };
        match formula.connective {
            Connective::And | Connective::Or => {}
            Connective::Atleast => self.normal = false,
            _ => {
                self.normal = false;
                self.coherent = false;
            }
        }
        let index = self.new_gate(gate_type);
        if gate_type == GateType::Atleast {
            self.gate_mut(index).vote_number = formula.min_number;
        }
        for operand in &formula.operands {
            let literal = self.operand_literal(operand, builder);
            let _ = self.add_arg(index, literal);
        }
        index
    }

    fn operand_literal(&mut self, operand: &Operand, builder: &mut Builder<'_>) -> i32 {
        match operand {
            Operand::Event(id) => self.event_literal(id, builder),
            Operand::Gate(id) => self.build_gate(id, builder) as i32,
            Operand::Formula(sub) => self.build_formula(sub, builder) as i32,
            Operand::Constant(value) => {
                let constant = self.constant() as i32;
                if *value {
                    constant
                } else {
                    -constant
                }
            }
        }
    }

    fn event_literal(&mut self, id: &str, builder: &mut Builder<'_>) -> i32 {
        let variable = match builder.event_vars.get(id) {
            Some(&index) => index,
            None => unreachable!("basic event `{}` was not indexed", id),
        };
        let group = match builder.groups.get(id) {
            Some(group) => *group,
            None => return variable as i32,
        };
        if let Some(&gate) = builder.member_gates.get(id) {
            return gate as i32;
        }
        let common = match builder.group_vars.get(&group.id) {
            Some(&index) => index,
            None => unreachable!("CCF group `{}` was not indexed", group.id),
        };
        let gate = self.new_gate(GateType::Or);
        let _ = self.add_arg(gate, variable as i32);
        let _ = self.add_arg(gate, common as i32);
        builder.member_gates.insert(id.to_string(), gate);
        gate as i32
    }
}

fn collect_events<'a>(
    model: &'a Model,
    formula: &'a Formula,
    seen_gates: &mut HashSet<&'a str>,
    seen_events: &mut HashSet<&'a str>,
    order: &mut Vec<&'a str>,
) {
    for operand in &formula.operands {
        match operand {
            Operand::Event(id) => {
                if seen_events.insert(id.as_str()) {
                    order.push(id.as_str());
                }
            }
            Operand::Gate(id) => {
                if seen_gates.insert(id.as_str()) {
                    if let Some(gate) = model.gate(id) {
                        collect_events(model, &gate.formula, seen_gates, seen_events, order);
                    }
                }
            }
            Operand::Formula(sub) => collect_events(model, sub, seen_gates, seen_events, order),
            Operand::Constant(_) => {}
        }
    }
}

/// Print the graph in the shorthand format, one gate per line.
///
/// Modules are prefixed `GM`, gates collapsed to a constant `GC`.
pub fn format_pdag(graph: &Pdag, out: &mut impl Write) -> std::fmt::Result {
    writeln!(out, "top: G{}", graph.root_index())?;
    for index in graph.gather_gates() {
        let gate = graph.gate(index);
        let prefix = match gate.state {
            GateState::Normal if gate.module => "GM",
            GateState::Normal => "G",
            _ => "GC",
        };
        write!(out, "{}{} := ", prefix, index)?;
        match gate.state {
            GateState::Null => {
                writeln!(out, "0")?;
                continue;
            }
            GateState::Unity => {
                writeln!(out, "1")?;
                continue;
            }
            GateState::Normal => {}
        }
        let name = match gate.gate_type {
            GateType::And => "and",
            GateType::Or => "or",
            GateType::Atleast => "atleast",
            GateType::Xor => "xor",
            GateType::Not => "not",
            GateType::Nand => "nand",
            GateType::Nor => "nor",
            GateType::Null => "null",
        };
        write!(out, "{}(", name)?;
        if let Some(k) = gate.vote_number {
            write!(out, "{}, ", k)?;
        }
        let mut first = true;
        for &arg in &gate.args {
            if !first {
                write!(out, ", ")?;
            }
            first = false;
            let index = arg.unsigned_abs();
            let sign = if arg < 0 { "~" } else { "" };
            if graph.is_variable(index) {
                write!(out, "{}x{}", sign, index)?;
            } else if graph.is_constant(index) {
                let value = graph.constant_value(index) != (arg < 0);
                write!(out, "{}", if value { "1" } else { "0" })?;
            } else {
                write!(out, "{}G{}", sign, index)?;
            }
        }
        writeln!(out, ")")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Formula, Model, Operand};

    fn simple_graph(formula: Formula) -> Pdag {
        let mut model = Model::new("top");
        model
            .add_basic_event("a", 0.1)
            .add_basic_event("b", 0.2)
            .add_basic_event("c", 0.3)
            .add_gate("top", formula);
        Pdag::from_model(&model, false).unwrap()
    }

    #[test]
    fn test_dense_variable_indices() {
        let graph = simple_graph(Formula::and(vec![
            Operand::event("a"),
            Operand::event("b"),
            Operand::event("c"),
        ]));
        assert_eq!(graph.num_variables(), 3);
        assert_eq!(graph.events()[0].id, "a");
        assert_eq!(graph.events()[2].id, "c");
        let root = graph.root_index();
        assert_eq!(graph.gate(root).args().len(), 3);
        assert!(graph.check_consistency().is_ok());
    }

    #[test]
    fn test_duplicate_is_idempotent_for_and() {
        let mut graph = simple_graph(Formula::and(vec![Operand::event("a"), Operand::event("b")]));
        let root = graph.root_index();
        assert_eq!(graph.add_arg(root, 1), AddOutcome::Normal);
        assert_eq!(graph.gate(root).args().len(), 2);
    }

    #[test]
    fn test_complement_collapses_and() {
        let mut graph = simple_graph(Formula::and(vec![Operand::event("a"), Operand::event("b")]));
        let root = graph.root_index();
        assert_eq!(graph.add_arg(root, -1), AddOutcome::BecameConstant);
        assert_eq!(graph.gate(root).state(), GateState::Null);
        assert!(graph.gate(root).args().is_empty());
    }

    #[test]
    fn test_complement_collapses_or_to_unity() {
        let mut graph = simple_graph(Formula::or(vec![Operand::event("a"), Operand::event("b")]));
        let root = graph.root_index();
        assert_eq!(graph.add_arg(root, -2), AddOutcome::BecameConstant);
        assert_eq!(graph.gate(root).state(), GateState::Unity);
    }

    #[test]
    fn test_atleast_complement_decrements_vote() {
        // @(2, {a, b, c}) plus ¬b collapses to @(1, {a, c}) = or(a, c).
        let mut graph = simple_graph(Formula::atleast(
            2,
            vec![Operand::event("a"), Operand::event("b"), Operand::event("c")],
        ));
        let root = graph.root_index();
        assert_eq!(graph.add_arg(root, -2), AddOutcome::Normal);
        assert_eq!(graph.gate(root).gate_type(), GateType::Or);
        assert_eq!(graph.gate(root).args().len(), 2);
        assert!(graph.check_consistency().is_ok());
    }

    #[test]
    fn test_xor_duplicate_nullifies() {
        let mut graph = simple_graph(Formula::xor(Operand::event("a"), Operand::event("b")));
        let root = graph.root_index();
        assert_eq!(graph.add_arg(root, 1), AddOutcome::BecameConstant);
        assert_eq!(graph.gate(root).state(), GateState::Null);
    }

    #[test]
    fn test_visit_protocol() {
        let mut graph = simple_graph(Formula::and(vec![Operand::event("a"), Operand::event("b")]));
        assert!(!graph.visit(1, 3));
        assert!(!graph.visit(1, 5));
        assert!(graph.visit(1, 8));
        assert_eq!(graph.enter_time(1), 3);
        assert_eq!(graph.exit_time(1), 5);
        assert_eq!(graph.last_visit(1), 8);
    }

    #[test]
    fn test_transfer_and_share() {
        let mut graph = simple_graph(Formula::and(vec![Operand::event("a"), Operand::event("b")]));
        let root = graph.root_index();
        let other = graph.new_gate(GateType::Or);
        assert_eq!(graph.share_arg(root, 1, other), AddOutcome::Normal);
        assert!(graph.gate(root).args().contains(&1));
        assert!(graph.gate(other).args().contains(&1));
        assert_eq!(graph.transfer_arg(root, 2, other), AddOutcome::Normal);
        assert!(!graph.gate(root).args().contains(&2));
        assert!(graph.gate(other).args().contains(&2));
        assert_eq!(*graph.parents(2).iter().next().unwrap(), other);
    }

    #[test]
    fn test_format_shorthand() {
        let graph = simple_graph(Formula::and(vec![Operand::event("a"), Operand::event("b")]));
        let mut out = String::new();
        format_pdag(&graph, &mut out).unwrap();
        assert!(out.starts_with("top: G"));
        assert!(out.contains("and(x1, x2)"));
    }

    #[test]
    fn test_ccf_expansion() {
        let mut model = Model::new("top");
        model
            .add_basic_event("a", 0.1)
            .add_basic_event("b", 0.1)
            .add_gate("top", Formula::and(vec![Operand::event("a"), Operand::event("b")]))
            .add_ccf_group(CcfGroup {
                id: "pumps".to_string(),
                members: vec!["a".to_string(), "b".to_string()],
                beta: 0.2,
            });
        let graph = Pdag::from_model(&model, true).unwrap();
        // a-independent, CCF(pumps), b-independent.
        assert_eq!(graph.num_variables(), 3);
        assert_eq!(graph.events()[1].id, "CCF(pumps)");
        assert!((graph.events()[0].probability - 0.08).abs() < 1e-12);
        assert!((graph.events()[1].probability - 0.02).abs() < 1e-12);
        let root = graph.root_index();
        assert_eq!(graph.gate(root).gate_args().len(), 2);
        assert!(graph.check_consistency().is_ok());
    }
}
