//! Binary decision diagram for exact probability.
//!
//! The BDD shares the ZBDD's variable ordering (basic-event index order)
//! and uses complement edges: the terminal is ⊤ at index 1 and ⊥ is its
//! complement. Canonicity is maintained by keeping the high edge regular
//! in [`Bdd::mk_node`] and interning nodes in the unique table.
//!
//! Probability evaluates the Shannon expansion bottom-up:
//! `P(v) = p_x · P(high) + (1 − p_x) · P(low)` with `P(¬f) = 1 − P(f)`,
//! memoized per analysis over the regular node index.

use std::cell::RefCell;

use hashbrown::HashMap;
use log::debug;

use crate::cache::Cache;
use crate::node::Node;
use crate::pdag::{GateState, GateType, Pdag};
use crate::reference::Ref;
use crate::storage::Storage;

pub struct Bdd {
    storage: RefCell<Storage<Node>>,
    ite_cache: RefCell<Cache<(Ref, Ref, Ref), Ref>>,
    prob_cache: RefCell<HashMap<u32, f64>>,
    pub zero: Ref,
    pub one: Ref,
}

impl Default for Bdd {
    fn default() -> Self {
        Self::new()
    }
}

impl Bdd {
    pub fn new() -> Self {
        let mut storage = Storage::new(16);
        let stub = Node::new(u32::MAX, Ref::positive(1), Ref::positive(1));
        let terminal = storage.add(stub);
        debug_assert_eq!(terminal, 1);
        let one = Ref::positive(terminal);
        Self {
            storage: RefCell::new(storage),
            ite_cache: RefCell::new(Cache::new(18)),
            prob_cache: RefCell::new(HashMap::new()),
            zero: -one,
            one,
        }
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

    fn node(&self, index: u32) -> Node {
        self.storage.borrow().value(index)
    }

    pub fn variable(&self, f: Ref) -> u32 {
        if self.is_terminal(f) {
            u32::MAX
        } else {
            self.node(f.index()).var
        }
    }

    pub fn mk_node(&self, var: u32, high: Ref, low: Ref) -> Ref {
        debug_assert_ne!(var, 0, "Variable index should not be zero");
        // Canonicity: the high edge stays regular.
        if high.is_complement() {
            return -self.mk_node(var, -high, -low);
        }
        // Redundant decision.
        if high == low {
            return high;
        }
        debug_assert!(var < self.variable(high));
        debug_assert!(var < self.variable(low));
        let index = self.storage.borrow_mut().put(Node::new(var, high, low));
        Ref::positive(index)
    }

    pub fn mk_var(&self, var: u32) -> Ref {
        self.mk_node(var, self.one, self.zero)
    }

    /// Cofactors of `f` with respect to variable `v` at or above its root.
    fn top_cofactors(&self, f: Ref, var: u32) -> (Ref, Ref) {
        if self.is_terminal(f) || var < self.variable(f) {
            return (f, f);
        }
        debug_assert_eq!(var, self.variable(f));
        let n = self.node(f.index());
        if f.is_complement() {
            (-n.high, -n.low)
        } else {
            (n.high, n.low)
        }
    }

    /// `ITE(f, g, h) = (f ∧ g) ∨ (¬f ∧ h)`.
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        // Terminal cases.
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // Standard triples.
        let (g, h) = (
            if g == f { self.one } else if g == -f { self.zero } else { g },
            if h == f { self.zero } else if h == -f { self.one } else { h },
        );

        // Normalize: the first argument and the "then" branch regular.
        let (mut f, mut g, mut h) = (f, g, h);
        if f.is_complement() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }
        let mut complement = false;
        if g.is_complement() {
            complement = true;
            g = -g;
            h = -h;
        }

        if self.is_one(g) && self.is_zero(h) {
            return if complement { -f } else { f };
        }

        let key = (f, g, h);
        let cached = self.ite_cache.borrow().get(&key).copied();
        if let Some(res) = cached {
            debug!("cache: ite({}, {}, {}) -> {}", f, g, h, res);
            return if complement { -res } else { res };
        }

        let mut var = self.variable(f);
        var = var.min(self.variable(g));
        var = var.min(self.variable(h));
        debug_assert_ne!(var, u32::MAX);

        let (f1, f0) = self.top_cofactors(f, var);
        let (g1, g0) = self.top_cofactors(g, var);
        let (h1, h0) = self.top_cofactors(h, var);

        let high = self.apply_ite(f1, g1, h1);
        let low = self.apply_ite(f0, g0, h0);
        let res = self.mk_node(var, high, low);

        self.ite_cache.borrow_mut().insert(key, res);
        if complement {
            -res
        } else {
            res
        }
    }

    pub fn apply_and(&self, f: Ref, g: Ref) -> Ref {
        self.apply_ite(f, g, self.zero)
    }

    pub fn apply_or(&self, f: Ref, g: Ref) -> Ref {
        self.apply_ite(f, self.one, g)
    }

    /// Build the BDD of a preprocessed graph bottom-up.
    ///
    /// Returns the manager together with the root function.
    pub fn from_pdag(graph: &Pdag) -> (Bdd, Ref) {
        let bdd = Bdd::new();
        let mut memo: HashMap<u32, Ref> = HashMap::new();
        let root = bdd.convert_gate(graph, graph.root_index(), &mut memo);
        (bdd, root)
    }

    fn convert_gate(&self, graph: &Pdag, gate: u32, memo: &mut HashMap<u32, Ref>) -> Ref {
        if let Some(&f) = memo.get(&gate) {
            return f;
        }
        let entry = graph.gate(gate);
        let f = match entry.state() {
            GateState::Unity => self.one,
            GateState::Null => self.zero,
            GateState::Normal => {
                let mut acc = match entry.gate_type() {
                    GateType::And => self.one,
                    GateType::Or => self.zero,
                    GateType::Null => {
                        let arg = graph.only_arg(gate);
                        let f = self.convert_arg(graph, arg, memo);
                        memo.insert(gate, f);
                        return f;
                    }
                    kind => unreachable!("gate G{} of type {:?} survived preprocessing", gate, kind),
                };
                let args: Vec<i32> = entry.args().iter().copied().collect();
                for arg in args {
                    let g = self.convert_arg(graph, arg, memo);
                    acc = match graph.gate(gate).gate_type() {
                        GateType::And => self.apply_and(acc, g),
                        _ => self.apply_or(acc, g),
                    };
                }
                acc
            }
        };
        memo.insert(gate, f);
        f
    }

    fn convert_arg(&self, graph: &Pdag, arg: i32, memo: &mut HashMap<u32, Ref>) -> Ref {
        let index = arg.unsigned_abs();
        let f = if graph.is_variable(index) {
            self.mk_var(index)
        } else {
            self.convert_gate(graph, index, memo)
        };
        if arg < 0 {
            -f
        } else {
            f
        }
    }

    /// Exact probability of the function under independent variables.
    ///
    /// `probabilities[i]` belongs to variable `i + 1`. The per-node memo is
    /// refreshed on every call, so one manager serves repeated analyses.
    pub fn probability(&self, f: Ref, probabilities: &[f64]) -> f64 {
        self.prob_cache.borrow_mut().clear();
        self.prob(f, probabilities)
    }

    fn prob(&self, f: Ref, probabilities: &[f64]) -> f64 {
        if self.is_one(f) {
            return 1.0;
        }
        if self.is_zero(f) {
            return 0.0;
        }
        let index = f.index();
        let cached = self.prob_cache.borrow().get(&index).copied();
        let regular = match cached {
            Some(p) => p,
            None => {
                let n = self.node(index);
                let p_var = probabilities[(n.var - 1) as usize];
                let p = p_var * self.prob(n.high, probabilities)
                    + (1.0 - p_var) * self.prob(n.low, probabilities);
                self.prob_cache.borrow_mut().insert(index, p);
                p
            }
        };
        if f.is_complement() {
            1.0 - regular
        } else {
            regular
        }
    }

    /// Conditional probability with one variable fixed to a value.
    pub fn probability_restricted(
        &self,
        f: Ref,
        var: u32,
        value: bool,
        probabilities: &[f64],
    ) -> f64 {
        let mut memo = HashMap::new();
        self.prob_restricted(f, var, value, probabilities, &mut memo)
    }

    fn prob_restricted(
        &self,
        f: Ref,
        var: u32,
        value: bool,
        probabilities: &[f64],
        memo: &mut HashMap<u32, f64>,
    ) -> f64 {
        if self.is_one(f) {
            return 1.0;
        }
        if self.is_zero(f) {
            return 0.0;
        }
        let index = f.index();
        let regular = match memo.get(&index).copied() {
            Some(p) => p,
            None => {
                let n = self.node(index);
                let p = if n.var == var {
                    let branch = if value { n.high } else { n.low };
                    self.prob_restricted(branch, var, value, probabilities, memo)
                } else {
                    let p_var = probabilities[(n.var - 1) as usize];
                    p_var * self.prob_restricted(n.high, var, value, probabilities, memo)
                        + (1.0 - p_var) * self.prob_restricted(n.low, var, value, probabilities, memo)
                };
                memo.insert(index, p);
                p
            }
        };
        if f.is_complement() {
            1.0 - regular
        } else {
            regular
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn test_ite_terminal_cases() {
        let bdd = Bdd::new();
        let g = bdd.mk_var(2);
        let h = bdd.mk_var(3);
        assert_eq!(bdd.apply_ite(bdd.one, g, h), g);
        assert_eq!(bdd.apply_ite(bdd.zero, g, h), h);
        assert_eq!(bdd.apply_ite(g, h, h), h);
        assert_eq!(bdd.apply_ite(g, bdd.one, bdd.zero), g);
        assert_eq!(bdd.apply_ite(g, bdd.zero, bdd.one), -g);
    }

    #[test]
    fn test_and_or_complement() {
        let bdd = Bdd::new();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let and = bdd.apply_and(x, y);
        let or = bdd.apply_or(x, y);
        // De Morgan through complement edges.
        assert_eq!(-bdd.apply_or(-x, -y), and);
        assert_eq!(-bdd.apply_and(-x, -y), or);
    }

    #[test]
    fn test_probability_and() {
        let bdd = Bdd::new();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let f = bdd.apply_and(x, y);
        let p = bdd.probability(f, &[0.1, 0.2]);
        assert!((p - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_probability_or_exact() {
        let bdd = Bdd::new();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let f = bdd.apply_or(x, y);
        let p = bdd.probability(f, &[0.1, 0.2]);
        assert!((p - 0.28).abs() < 1e-12);
    }

    #[test]
    fn test_probability_noncoherent() {
        let bdd = Bdd::new();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let f = bdd.apply_and(x, -y);
        let p = bdd.probability(f, &[0.5, 0.3]);
        assert!((p - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_restricted_probability() {
        let bdd = Bdd::new();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let f = bdd.apply_or(x, y);
        let probabilities = [0.1, 0.2];
        let p1 = bdd.probability_restricted(f, 1, true, &probabilities);
        let p0 = bdd.probability_restricted(f, 1, false, &probabilities);
        assert!((p1 - 1.0).abs() < 1e-12);
        assert!((p0 - 0.2).abs() < 1e-12);
    }
}
