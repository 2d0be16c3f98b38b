//! Zero-suppressed BDD engine and the MOCUS cut-set container.
//!
//! A ZBDD node `(var, high, low)` encodes the family of sets
//! `{ {var} ∪ s : s ∈ family(high) } ∪ family(low)`. The zero-suppression
//! rule (`high == ⊥` nodes are never built) together with the unique table
//! makes the representation canonical: equal families share one node.
//!
//! The [`CutSetContainer`] specializes the engine for cut-set generation.
//! Its "variables" are ordering keys over signed PDAG literals: non-module
//! gates order first, then module gates, then basic-event literals in
//! index order with the complement right below the positive phase. With
//! that ordering the next expandable gate, if any remains, is always the
//! root of the diagram.

use std::cell::{Cell, RefCell};

use hashbrown::{HashMap, HashSet};
use log::debug;

use crate::cache::Cache;
use crate::error::Error;
use crate::node::Node;
use crate::pdag::{GateType, Pdag};
use crate::reference::Ref;
use crate::storage::Storage;
use crate::utils::{pairing2, pairing3, MyHash};

/// Hard cap on live nodes in one container.
const NODE_CAP: usize = 1 << 24;
/// Live-node count above which a garbage sweep is worth running.
const GC_THRESHOLD: usize = 1 << 16;

/// Memoization key for one engine operation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum OpKey {
    Union(Ref, Ref),
    Intersect(Ref, Ref),
    Difference(Ref, Ref),
    Product(Ref, Ref),
    Subsume(Ref, Ref),
    Minimize(Ref),
    Truncate(Ref, u32),
    Subset0(Ref, u32),
    Subset1(Ref, u32),
    Consistent(Ref),
}

impl MyHash for OpKey {
    fn hash(&self) -> u64 {
        match *self {
            OpKey::Union(a, b) => pairing3(1, a.unsigned() as u64, b.unsigned() as u64),
            OpKey::Intersect(a, b) => pairing3(2, a.unsigned() as u64, b.unsigned() as u64),
            OpKey::Difference(a, b) => pairing3(3, a.unsigned() as u64, b.unsigned() as u64),
            OpKey::Product(a, b) => pairing3(4, a.unsigned() as u64, b.unsigned() as u64),
            OpKey::Subsume(a, b) => pairing3(5, a.unsigned() as u64, b.unsigned() as u64),
            OpKey::Minimize(a) => pairing2(6, a.unsigned() as u64),
            OpKey::Truncate(a, k) => pairing3(7, a.unsigned() as u64, k as u64),
            OpKey::Subset0(a, v) => pairing3(8, a.unsigned() as u64, v as u64),
            OpKey::Subset1(a, v) => pairing3(9, a.unsigned() as u64, v as u64),
            OpKey::Consistent(a) => pairing2(10, a.unsigned() as u64),
        }
    }
}

/// A ZBDD over signed fault-tree literals, seeded and expanded by the
/// MOCUS driver.
pub struct CutSetContainer {
    storage: RefCell<Storage<Node>>,
    cache: RefCell<Cache<OpKey, Ref>>,
    count_cache: RefCell<HashMap<Ref, u64>>,
    zero: Ref,
    one: Ref,
    root: Cell<Ref>,
    /// literal -> ordering key.
    order: HashMap<i32, u32>,
    /// ordering key -> literal; position 0 is the sentry.
    literals: Vec<i32>,
    /// Keys `1..=gate_bound` are non-module gates.
    gate_bound: u32,
    /// Keys `gate_bound+1..=module_bound` are module gates.
    module_bound: u32,
}

impl CutSetContainer {
    /// Create an empty container with the literal ordering derived from
    /// the preprocessed graph.
    pub fn new(graph: &Pdag) -> Self {
        let mut storage = Storage::new(16);
        let stub = Node::new(u32::MAX, Ref::positive(1), Ref::positive(1));
        let zero = Ref::positive(storage.add(stub));
        let one = Ref::positive(storage.add(stub));

        let gates = graph.gather_gates();
        let mut non_modules: Vec<u32> = gates
            .iter()
            .copied()
            .filter(|&g| !graph.gate(g).is_module())
            .collect();
        non_modules.sort_unstable();
        let mut modules: Vec<u32> = gates
            .iter()
            .copied()
            .filter(|&g| graph.gate(g).is_module())
            .collect();
        modules.sort_unstable();

        let mut order = HashMap::new();
        let mut literals = vec![0];
        for &gate in &non_modules {
            order.insert(gate as i32, literals.len() as u32);
            literals.push(gate as i32);
        }
        let gate_bound = literals.len() as u32 - 1;
        for &gate in &modules {
            order.insert(gate as i32, literals.len() as u32);
            literals.push(gate as i32);
        }
        let module_bound = literals.len() as u32 - 1;
        for variable in 1..=graph.num_variables() as i32 {
            order.insert(variable, literals.len() as u32);
            literals.push(variable);
            order.insert(-variable, literals.len() as u32);
            literals.push(-variable);
        }

        Self {
            storage: RefCell::new(storage),
            cache: RefCell::new(Cache::new(18)),
            count_cache: RefCell::new(HashMap::new()),
            zero,
            one,
            root: Cell::new(zero),
            order,
            literals,
            gate_bound,
            module_bound,
        }
    }

    pub fn zero(&self) -> Ref {
        self.zero
    }

    pub fn one(&self) -> Ref {
        self.one
    }

    pub fn root(&self) -> Ref {
        self.root.get()
    }

    pub fn is_zero(&self, f: Ref) -> bool {
        f == self.zero
    }

    pub fn is_one(&self, f: Ref) -> bool {
        f == self.one
    }

    pub fn is_terminal(&self, f: Ref) -> bool {
        self.is_zero(f) || self.is_one(f)
    }

    fn node(&self, f: Ref) -> Node {
        debug_assert!(!f.is_complement());
        self.storage.borrow().value(f.index())
    }

    fn var_of(&self, f: Ref) -> u32 {
        if self.is_terminal(f) {
            u32::MAX
        } else {
            self.node(f).var
        }
    }

    fn key_of(&self, literal: i32) -> u32 {
        match self.order.get(&literal) {
            Some(&key) => key,
            None => unreachable!("literal {} is not in the container ordering", literal),
        }
    }

    /// The literal that splits the family, i.e. the root variable.
    pub fn choose_literal(&self, f: Ref) -> Option<i32> {
        if self.is_terminal(f) {
            None
        } else {
            Some(self.literals[self.node(f).var as usize])
        }
    }

    fn cached(&self, key: &OpKey) -> Option<Ref> {
        self.cache.borrow().get(key).copied()
    }

    fn memoize(&self, key: OpKey, value: Ref) -> Ref {
        self.cache.borrow_mut().insert(key, value);
        value
    }

    fn mk_node(&self, var: u32, high: Ref, low: Ref) -> Ref {
        debug_assert_ne!(var, 0, "Key 0 is the ordering sentry");
        // Zero-suppression: a node whose high edge is ⊥ is redundant.
        if self.is_zero(high) {
            return low;
        }
        debug_assert!(var < self.var_of(high), "ordering violated on the high edge");
        debug_assert!(var < self.var_of(low), "ordering violated on the low edge");
        let index = self.storage.borrow_mut().put(Node::new(var, high, low));
        Ref::positive(index)
    }

    /// The single set over the given literals.
    fn unit_set(&self, literals: &[i32]) -> Ref {
        let mut keys: Vec<u32> = literals.iter().map(|&l| self.key_of(l)).collect();
        keys.sort_unstable();
        let mut current = self.one;
        for &key in keys.iter().rev() {
            current = self.mk_node(key, current, self.zero);
        }
        current
    }

    /// True if the family contains the empty set.
    fn contains_empty_set(&self, mut f: Ref) -> bool {
        loop {
            if self.is_one(f) {
                return true;
            }
            if self.is_zero(f) {
                return false;
            }
            f = self.node(f).low;
        }
    }
}

// Primitive family operations.
impl CutSetContainer {
    pub fn union(&self, f: Ref, g: Ref) -> Ref {
        if f == g || self.is_zero(g) {
            return f;
        }
        if self.is_zero(f) {
            return g;
        }
        if self.is_one(f) {
            // Insert the empty set into g.
            let n = self.node(g);
            let low = self.union(self.one, n.low);
            return self.mk_node(n.var, n.high, low);
        }
        if self.is_one(g) {
            return self.union(g, f);
        }

        let key = OpKey::Union(f, g);
        if let Some(res) = self.cached(&key) {
            return res;
        }

        let nf = self.node(f);
        let ng = self.node(g);
        let res = if nf.var < ng.var {
            let low = self.union(nf.low, g);
            self.mk_node(nf.var, nf.high, low)
        } else if ng.var < nf.var {
            let low = self.union(f, ng.low);
            self.mk_node(ng.var, ng.high, low)
        } else {
            let high = self.union(nf.high, ng.high);
            let low = self.union(nf.low, ng.low);
            self.mk_node(nf.var, high, low)
        };
        self.memoize(key, res)
    }

    pub fn intersect(&self, f: Ref, g: Ref) -> Ref {
        if self.is_zero(f) || self.is_zero(g) {
            return self.zero;
        }
        if f == g {
            return f;
        }
        if self.is_one(f) {
            return if self.contains_empty_set(g) { self.one } else { self.zero };
        }
        if self.is_one(g) {
            return if self.contains_empty_set(f) { self.one } else { self.zero };
        }

        let key = OpKey::Intersect(f, g);
        if let Some(res) = self.cached(&key) {
            return res;
        }

        let nf = self.node(f);
        let ng = self.node(g);
        let res = if nf.var < ng.var {
            self.intersect(nf.low, g)
        } else if ng.var < nf.var {
            self.intersect(f, ng.low)
        } else {
            let high = self.intersect(nf.high, ng.high);
            let low = self.intersect(nf.low, ng.low);
            self.mk_node(nf.var, high, low)
        };
        self.memoize(key, res)
    }

    pub fn difference(&self, f: Ref, g: Ref) -> Ref {
        if self.is_zero(f) || f == g {
            return self.zero;
        }
        if self.is_zero(g) {
            return f;
        }
        if self.is_one(f) {
            return if self.contains_empty_set(g) { self.zero } else { self.one };
        }
        if self.is_one(g) {
            // Strip the empty set out of f.
            let nf = self.node(f);
            let low = self.difference(nf.low, g);
            return self.mk_node(nf.var, nf.high, low);
        }

        let key = OpKey::Difference(f, g);
        if let Some(res) = self.cached(&key) {
            return res;
        }

        let nf = self.node(f);
        let ng = self.node(g);
        let res = if nf.var < ng.var {
            let low = self.difference(nf.low, g);
            self.mk_node(nf.var, nf.high, low)
        } else if ng.var < nf.var {
            self.difference(f, ng.low)
        } else {
            let high = self.difference(nf.high, ng.high);
            let low = self.difference(nf.low, ng.low);
            self.mk_node(nf.var, high, low)
        };
        self.memoize(key, res)
    }

    /// Pairwise unions of the two families (the cross-product join used by
    /// gate expansion).
    pub fn product(&self, f: Ref, g: Ref) -> Ref {
        if self.is_zero(f) || self.is_zero(g) {
            return self.zero;
        }
        if self.is_one(f) {
            return g;
        }
        if self.is_one(g) {
            return f;
        }

        let key = OpKey::Product(f, g);
        if let Some(res) = self.cached(&key) {
            return res;
        }
        debug!("product({}, {})", f, g);

        let nf = self.node(f);
        let ng = self.node(g);
        let res = if nf.var < ng.var {
            let high = self.product(nf.high, g);
            let low = self.product(nf.low, g);
            self.mk_node(nf.var, high, low)
        } else if ng.var < nf.var {
            let high = self.product(f, ng.high);
            let low = self.product(f, ng.low);
            self.mk_node(ng.var, high, low)
        } else {
            let hh = self.product(nf.high, ng.high);
            let hl = self.product(nf.high, ng.low);
            let lh = self.product(nf.low, ng.high);
            let high = self.union(self.union(hh, hl), lh);
            let low = self.product(nf.low, ng.low);
            self.mk_node(nf.var, high, low)
        };
        self.memoize(key, res)
    }

    /// Remove from `f` every set that is a superset of some set in `g`.
    pub fn subsume(&self, f: Ref, g: Ref) -> Ref {
        if self.is_zero(f) || self.is_zero(g) {
            return f;
        }
        if self.contains_empty_set(g) {
            // Everything is a superset of the empty set.
            return self.zero;
        }
        if self.is_one(f) {
            return f;
        }

        let key = OpKey::Subsume(f, g);
        if let Some(res) = self.cached(&key) {
            return res;
        }

        let nf = self.node(f);
        let ng = self.node(g);
        let res = if ng.var < nf.var {
            // Sets in g holding ng.var cannot subsume anything in f.
            self.subsume(f, ng.low)
        } else if nf.var < ng.var {
            let high = self.subsume(nf.high, g);
            let low = self.subsume(nf.low, g);
            self.mk_node(nf.var, high, low)
        } else {
            let high = self.subsume(nf.high, ng.high);
            let high = self.subsume(high, ng.low);
            let low = self.subsume(nf.low, ng.low);
            self.mk_node(nf.var, high, low)
        };
        self.memoize(key, res)
    }

    /// Remove non-minimal sets (self-subsumption).
    pub fn minimal(&self, f: Ref) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        let key = OpKey::Minimize(f);
        if let Some(res) = self.cached(&key) {
            return res;
        }
        let n = self.node(f);
        let low = self.minimal(n.low);
        let high = self.minimal(n.high);
        let high = self.subsume(high, low);
        let res = self.mk_node(n.var, high, low);
        self.memoize(key, res)
    }

    /// Drop sets with more than `limit` literals.
    fn truncate(&self, f: Ref, limit: u32) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        if limit == 0 {
            return if self.contains_empty_set(f) { self.one } else { self.zero };
        }
        let key = OpKey::Truncate(f, limit);
        if let Some(res) = self.cached(&key) {
            return res;
        }
        let n = self.node(f);
        let high = self.truncate(n.high, limit - 1);
        let low = self.truncate(n.low, limit);
        let res = self.mk_node(n.var, high, low);
        self.memoize(key, res)
    }

    /// Sets that do not contain the key.
    fn subset0(&self, f: Ref, var: u32) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        let n = self.node(f);
        if n.var == var {
            return n.low;
        }
        if n.var > var {
            return f;
        }
        let key = OpKey::Subset0(f, var);
        if let Some(res) = self.cached(&key) {
            return res;
        }
        let high = self.subset0(n.high, var);
        let low = self.subset0(n.low, var);
        let res = self.mk_node(n.var, high, low);
        self.memoize(key, res)
    }

    /// Sets that contain the key, with the key removed.
    fn subset1(&self, f: Ref, var: u32) -> Ref {
        if self.is_terminal(f) {
            return self.zero;
        }
        let n = self.node(f);
        if n.var == var {
            return n.high;
        }
        if n.var > var {
            return self.zero;
        }
        let key = OpKey::Subset1(f, var);
        if let Some(res) = self.cached(&key) {
            return res;
        }
        let high = self.subset1(n.high, var);
        let low = self.subset1(n.low, var);
        let res = self.mk_node(n.var, high, low);
        self.memoize(key, res)
    }

    /// Drop sets holding both phases of a variable.
    fn consistent(&self, f: Ref) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        let key = OpKey::Consistent(f);
        if let Some(res) = self.cached(&key) {
            return res;
        }
        let n = self.node(f);
        let literal = self.literals[n.var as usize];
        let mut high = self.consistent(n.high);
        if literal > 0 {
            if let Some(&complement) = self.order.get(&-literal) {
                high = self.subset0(high, complement);
            }
        }
        let low = self.consistent(n.low);
        let res = self.mk_node(n.var, high, low);
        self.memoize(key, res)
    }

    /// Number of sets in the family.
    pub fn count(&self, f: Ref) -> u64 {
        if self.is_zero(f) {
            return 0;
        }
        if self.is_one(f) {
            return 1;
        }
        let cached = self.count_cache.borrow().get(&f).copied();
        if let Some(count) = cached {
            return count;
        }
        let n = self.node(f);
        let count = self.count(n.low) + self.count(n.high);
        self.count_cache.borrow_mut().insert(f, count);
        count
    }
}

// The MOCUS-facing container surface.
impl CutSetContainer {
    /// The local ZBDD of a gate over its direct arguments: a single set
    /// for AND, one singleton per argument for OR.
    pub fn convert_gate(&self, graph: &Pdag, gate: u32) -> Ref {
        let entry = graph.gate(gate);
        match entry.gate_type() {
            GateType::And => {
                let literals: Vec<i32> = entry.args().iter().copied().collect();
                self.unit_set(&literals)
            }
            GateType::Or => {
                let mut acc = self.zero;
                for &arg in entry.args() {
                    let single = self.unit_set(&[arg]);
                    acc = self.union(acc, single);
                }
                acc
            }
            GateType::Null => self.unit_set(&[graph.only_arg(gate)]),
            kind => unreachable!("gate G{} of type {:?} survived preprocessing", gate, kind),
        }
    }

    /// Union a family into the container root.
    pub fn merge(&self, f: Ref) -> Result<(), Error> {
        let root = self.union(self.root.get(), f);
        self.root.set(root);
        self.check_limit()
    }

    /// The next non-module gate awaiting expansion, if any.
    ///
    /// Non-module gates order above everything else, so it suffices to
    /// look at the root literal.
    pub fn next_gate(&self) -> Option<u32> {
        let root = self.root.get();
        if self.is_terminal(root) {
            return None;
        }
        let var = self.node(root).var;
        if var <= self.gate_bound {
            Some(self.literals[var as usize] as u32)
        } else {
            None
        }
    }

    /// Split off the cut sets containing `gate`, with the gate literal
    /// removed; the remainder stays in the container.
    pub fn extract_intermediate_cut_sets(&self, gate: u32) -> Ref {
        let root = self.root.get();
        debug_assert!(!self.is_terminal(root));
        let n = self.node(root);
        debug_assert_eq!(n.var, self.key_of(gate as i32));
        self.root.set(n.low);
        n.high
    }

    /// Substitute a converted gate into its extracted occurrences.
    pub fn expand_gate(&self, converted: Ref, intermediate: Ref) -> Ref {
        self.product(converted, intermediate)
    }

    /// Minimize the container, truncating above `limit_order` if set.
    pub fn minimize(&self, limit_order: Option<usize>) -> Result<(), Error> {
        let mut root = self.minimal(self.root.get());
        if let Some(limit) = limit_order {
            root = self.truncate(root, limit.min(u32::MAX as usize) as u32);
        }
        self.root.set(root);
        self.check_limit()
    }

    /// Remove contradictory cut sets (both phases of one variable).
    /// Complement literals themselves stay and are reported as negative
    /// indices.
    pub fn eliminate_complements(&self) {
        let root = self.consistent(self.root.get());
        self.root.set(root);
    }

    /// Module placeholder literals still present in the container.
    pub fn gather_modules(&self) -> Vec<u32> {
        let mut modules = Vec::new();
        let mut visited: HashSet<u32> = HashSet::new();
        let mut stack = vec![self.root.get()];
        while let Some(f) = stack.pop() {
            if self.is_terminal(f) || !visited.insert(f.index()) {
                continue;
            }
            let n = self.node(f);
            if n.var > self.gate_bound && n.var <= self.module_bound {
                let literal = self.literals[n.var as usize] as u32;
                if !modules.contains(&literal) {
                    modules.push(literal);
                }
            }
            stack.push(n.high);
            stack.push(n.low);
        }
        modules.sort_unstable();
        modules
    }

    /// Substitute a module's minimal cut sets for its placeholder.
    ///
    /// A module that collapsed to ⊥ erases its host sets; one that
    /// collapsed to {∅} simply drops the placeholder.
    pub fn join_module(&self, gate: u32, module: &CutSetContainer) -> Result<(), Error> {
        let mut memo = HashMap::new();
        let family = self.import(module, module.root.get(), &mut memo);
        let key = self.key_of(gate as i32);
        let root = self.root.get();
        let with = self.subset1(root, key);
        let without = self.subset0(root, key);
        let joined = self.product(with, family);
        self.root.set(self.union(joined, without));
        self.check_limit()
    }

    /// Copy a family from another container's pool into this one. Both
    /// containers are built over the same graph, hence the same ordering.
    fn import(&self, other: &CutSetContainer, f: Ref, memo: &mut HashMap<Ref, Ref>) -> Ref {
        if other.is_zero(f) {
            return self.zero;
        }
        if other.is_one(f) {
            return self.one;
        }
        if let Some(&copied) = memo.get(&f) {
            return copied;
        }
        let n = other.node(f);
        let high = self.import(other, n.high, memo);
        let low = self.import(other, n.low, memo);
        let copied = self.mk_node(n.var, high, low);
        memo.insert(f, copied);
        copied
    }

    /// All cut sets as signed basic-event indices.
    pub fn products(&self) -> Vec<Vec<i32>> {
        let mut products = Vec::new();
        let mut stack = vec![(self.root.get(), Vec::new())];
        while let Some((f, set)) = stack.pop() {
            if self.is_zero(f) {
                continue;
            }
            if self.is_one(f) {
                products.push(set);
                continue;
            }
            let n = self.node(f);
            stack.push((n.low, set.clone()));
            let mut with = set;
            with.push(self.literals[n.var as usize]);
            stack.push((n.high, with));
        }
        products
    }

    fn check_limit(&self) -> Result<(), Error> {
        let live = self.storage.borrow().live();
        if live > NODE_CAP {
            return Err(Error::Limit(format!(
                "cut-set diagram grew to {} nodes (cap {})",
                live, NODE_CAP
            )));
        }
        Ok(())
    }

    /// Sweep nodes unreachable from the container root.
    ///
    /// Runs only between operations; the compute and count caches are
    /// dropped because they may reference released nodes.
    pub fn collect_garbage(&self) {
        if self.storage.borrow().live() < GC_THRESHOLD {
            return;
        }
        let mut reachable: HashSet<u32> = HashSet::new();
        reachable.insert(self.zero.index());
        reachable.insert(self.one.index());
        let mut stack = vec![self.root.get()];
        while let Some(f) = stack.pop() {
            if !reachable.insert(f.index()) {
                continue;
            }
            if self.is_terminal(f) {
                continue;
            }
            let n = self.node(f);
            stack.push(n.high);
            stack.push(n.low);
        }
        let before = self.storage.borrow().live();
        self.storage.borrow_mut().sweep(|index| reachable.contains(&index));
        self.cache.borrow_mut().clear();
        self.count_cache.borrow_mut().clear();
        debug!("swept {} dead nodes", before - self.storage.borrow().live());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Formula, Model, Operand};
    use crate::preprocessor::Preprocessor;

    use test_log::test;

    /// A preprocessed graph over `n` variables, shaped `and(x1, ..., xn)`,
    /// just to seed the container ordering for family-algebra tests.
    fn variables(n: usize) -> Pdag {
        let mut model = Model::new("top");
        let ids: Vec<String> = (0..n).map(|i| format!("e{}", i)).collect();
        for id in &ids {
            model.add_basic_event(id.clone(), 0.1);
        }
        model.add_gate(
            "top",
            Formula::and(ids.iter().map(|id| Operand::event(id.clone())).collect()),
        );
        let mut graph = Pdag::from_model(&model, false).unwrap();
        Preprocessor::new(&mut graph, None).run().unwrap();
        graph
    }

    fn sorted(mut products: Vec<Vec<i32>>) -> Vec<Vec<i32>> {
        for product in &mut products {
            product.sort_unstable();
        }
        products.sort();
        products
    }

    #[test]
    fn test_unit_set_and_count() {
        let graph = variables(3);
        let zbdd = CutSetContainer::new(&graph);
        let f = zbdd.unit_set(&[1, 3]);
        assert_eq!(zbdd.count(f), 1);
        let g = zbdd.unit_set(&[2]);
        let u = zbdd.union(f, g);
        assert_eq!(zbdd.count(u), 2);
    }

    #[test]
    fn test_union_is_idempotent() {
        let graph = variables(3);
        let zbdd = CutSetContainer::new(&graph);
        let f = zbdd.union(zbdd.unit_set(&[1]), zbdd.unit_set(&[2, 3]));
        assert_eq!(zbdd.union(f, f), f);
    }

    #[test]
    fn test_intersect_and_difference() {
        let graph = variables(3);
        let zbdd = CutSetContainer::new(&graph);
        let a = zbdd.union(zbdd.unit_set(&[1]), zbdd.unit_set(&[2]));
        let b = zbdd.union(zbdd.unit_set(&[2]), zbdd.unit_set(&[3]));
        let both = zbdd.intersect(a, b);
        assert_eq!(both, zbdd.unit_set(&[2]));
        let only_a = zbdd.difference(a, b);
        assert_eq!(only_a, zbdd.unit_set(&[1]));
    }

    #[test]
    fn test_product_distributes() {
        let graph = variables(3);
        let zbdd = CutSetContainer::new(&graph);
        let a = zbdd.union(zbdd.unit_set(&[1]), zbdd.unit_set(&[2]));
        let b = zbdd.unit_set(&[3]);
        let p = zbdd.product(a, b);
        let expected = zbdd.union(zbdd.unit_set(&[1, 3]), zbdd.unit_set(&[2, 3]));
        assert_eq!(p, expected);
    }

    #[test]
    fn test_subsume_removes_supersets() {
        let graph = variables(3);
        let zbdd = CutSetContainer::new(&graph);
        let family = zbdd.union(zbdd.unit_set(&[1, 2]), zbdd.unit_set(&[2, 3]));
        let bound = zbdd.unit_set(&[1]);
        let res = zbdd.subsume(family, bound);
        assert_eq!(res, zbdd.unit_set(&[2, 3]));
    }

    #[test]
    fn test_minimal_absorbs() {
        let graph = variables(3);
        let zbdd = CutSetContainer::new(&graph);
        let family = zbdd.union(zbdd.unit_set(&[1]), zbdd.unit_set(&[1, 2]));
        let minimal = zbdd.minimal(family);
        assert_eq!(minimal, zbdd.unit_set(&[1]));
        // Idempotence.
        assert_eq!(zbdd.minimal(minimal), minimal);
    }

    #[test]
    fn test_canonical_invariant() {
        let graph = variables(4);
        let zbdd = CutSetContainer::new(&graph);
        // Equal families built along different routes share a node.
        let left = zbdd.union(zbdd.unit_set(&[1, 2]), zbdd.unit_set(&[3]));
        let right = zbdd.union(zbdd.unit_set(&[3]), zbdd.unit_set(&[1, 2]));
        assert_eq!(left, right);
    }

    #[test]
    fn test_truncate_by_order() {
        let graph = variables(3);
        let zbdd = CutSetContainer::new(&graph);
        let family = zbdd.union(zbdd.unit_set(&[1, 2, 3]), zbdd.unit_set(&[2]));
        assert_eq!(zbdd.truncate(family, 2), zbdd.unit_set(&[2]));
        assert_eq!(zbdd.truncate(family, 3), family);
    }

    #[test]
    fn test_consistent_drops_contradictions() {
        let graph = variables(2);
        let zbdd = CutSetContainer::new(&graph);
        let bad = zbdd.unit_set(&[1, -1]);
        let good = zbdd.unit_set(&[1, -2]);
        let family = zbdd.union(bad, good);
        assert_eq!(zbdd.consistent(family), good);
    }

    #[test]
    fn test_products_roundtrip() {
        let graph = variables(3);
        let zbdd = CutSetContainer::new(&graph);
        let family = zbdd.union(zbdd.unit_set(&[1, 2]), zbdd.unit_set(&[3]));
        zbdd.merge(family).unwrap();
        assert_eq!(sorted(zbdd.products()), vec![vec![1, 2], vec![3]]);
    }
}
