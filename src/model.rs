//! Input model: named basic events, gates with Boolean formulas, and
//! common-cause failure groups.
//!
//! The model is the read-only contract between the fault-tree description
//! and the analysis core. It knows nothing about indices or graphs; the
//! [`Pdag`][crate::pdag::Pdag] constructor translates a validated model
//! into the indexed form.

use hashbrown::HashMap;

use crate::error::ValidityError;

/// A leaf failure with its probability.
#[derive(Debug, Clone)]
pub struct BasicEvent {
    pub id: String,
    pub probability: f64,
}

/// Boolean connective of a formula.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Connective {
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

impl Connective {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Connective::And => "and",
            Connective::Or => "or",
            Connective::Atleast => "atleast",
            Connective::Xor => "xor",
            Connective::Not => "not",
            Connective::Nand => "nand",
            Connective::Nor => "nor",
            Connective::Null => "null",
        }
    }
}

/// One argument of a formula.
#[derive(Debug, Clone)]
pub enum Operand {
    Event(String),
    Gate(String),
    Formula(Box<Formula>),
    Constant(bool),
}

impl Operand {
    pub fn event(id: impl Into<String>) -> Self {
        Operand::Event(id.into())
    }

    pub fn gate(id: impl Into<String>) -> Self {
        Operand::Gate(id.into())
    }

    pub fn formula(formula: Formula) -> Self {
        Operand::Formula(Box::new(formula))
    }
}

/// A Boolean formula: a connective over operands, with a vote number for
/// `atleast`.
#[derive(Debug, Clone)]
pub struct Formula {
    pub connective: Connective,
    pub operands: Vec<Operand>,
    pub min_number: Option<u32>,
}

impl Formula {
    pub fn new(connective: Connective, operands: Vec<Operand>) -> Self {
        Self { connective, operands, min_number: None }
    }

    pub fn and(operands: Vec<Operand>) -> Self {
        Self::new(Connective::And, operands)
    }

    pub fn or(operands: Vec<Operand>) -> Self {
        Self::new(Connective::Or, operands)
    }

    pub fn xor(a: Operand, b: Operand) -> Self {
        Self::new(Connective::Xor, vec![a, b])
    }

    pub fn not(operand: Operand) -> Self {
        Self::new(Connective::Not, vec![operand])
    }

    pub fn atleast(min_number: u32, operands: Vec<Operand>) -> Self {
        Self {
            connective: Connective::Atleast,
            operands,
            min_number: Some(min_number),
        }
    }
}

/// A named gate holding one formula.
#[derive(Debug, Clone)]
pub struct Gate {
    pub id: String,
    pub formula: Formula,
}

/// A common-cause failure group with a beta factor.
///
/// All members must carry the same total probability `p`; expansion splits
/// it into an independent part `(1 - beta) * p` and a shared common part
/// `beta * p`.
#[derive(Debug, Clone)]
pub struct CcfGroup {
    pub id: String,
    pub members: Vec<String>,
    pub beta: f64,
}

/// The complete input to one analysis.
#[derive(Debug, Clone)]
pub struct Model {
    top: String,
    basic_events: Vec<BasicEvent>,
    gates: Vec<Gate>,
    ccf_groups: Vec<CcfGroup>,
}

impl Model {
    /// Create an empty model whose top event is the gate named `top`.
    pub fn new(top: impl Into<String>) -> Self {
        Self {
            top: top.into(),
            basic_events: Vec::new(),
            gates: Vec::new(),
            ccf_groups: Vec::new(),
        }
    }

    pub fn top(&self) -> &str {
        &self.top
    }

    pub fn basic_events(&self) -> &[BasicEvent] {
        &self.basic_events
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    pub fn ccf_groups(&self) -> &[CcfGroup] {
        &self.ccf_groups
    }

    pub fn add_basic_event(&mut self, id: impl Into<String>, probability: f64) -> &mut Self {
        self.basic_events.push(BasicEvent { id: id.into(), probability });
        self
    }

    pub fn add_gate(&mut self, id: impl Into<String>, formula: Formula) -> &mut Self {
        self.gates.push(Gate { id: id.into(), formula });
        self
    }

    pub fn add_ccf_group(&mut self, group: CcfGroup) -> &mut Self {
        self.ccf_groups.push(group);
        self
    }

    pub fn basic_event(&self, id: &str) -> Option<&BasicEvent> {
        self.basic_events.iter().find(|e| e.id == id)
    }

    pub fn gate(&self, id: &str) -> Option<&Gate> {
        self.gates.iter().find(|g| g.id == id)
    }

    /// Check all model preconditions: unique ids, probability ranges,
    /// formula arities, resolvable references, acyclicity, and well-formed
    /// CCF groups.
    pub fn validate(&self) -> Result<(), ValidityError> {
        let mut ids: HashMap<&str, ()> = HashMap::new();
        for event in &self.basic_events {
            if ids.insert(&event.id, ()).is_some() {
                return Err(ValidityError::Duplicate(event.id.clone()));
            }
            if !(0.0..=1.0).contains(&event.probability) {
                return Err(ValidityError::EventProbability {
                    id: event.id.clone(),
                    value: event.probability,
                });
            }
        }
        for gate in &self.gates {
            if ids.insert(&gate.id, ()).is_some() {
                return Err(ValidityError::Duplicate(gate.id.clone()));
            }
        }

        if self.gate(&self.top).is_none() {
            return Err(ValidityError::Undefined(self.top.clone()));
        }

        for gate in &self.gates {
            self.check_formula(&gate.id, &gate.formula)?;
        }

        self.check_cycles()?;
        self.check_ccf_groups()
    }

    fn check_formula(&self, id: &str, formula: &Formula) -> Result<(), ValidityError> {
        let n = formula.operands.len();
        let arity_error = |expected: &'static str| ValidityError::Arity {
            id: id.to_string(),
            connective: formula.connective.name(),
            expected,
            actual: n,
        };
        match formula.connective {
            Connective::And | Connective::Or | Connective::Nand | Connective::Nor => {
                if n == 0 {
                    return Err(arity_error("at least one"));
                }
            }
            Connective::Xor => {
                if n != 2 {
                    return Err(arity_error("exactly two"));
                }
            }
            Connective::Not | Connective::Null => {
                if n != 1 {
                    return Err(arity_error("exactly one"));
                }
            }
            Connective::Atleast => {
                let k = match formula.min_number {
                    Some(k) => k,
                    None => 0,
                };
                if n < 2 {
                    return Err(arity_error("at least two"));
                }
                if k == 0 || k as usize > n {
                    return Err(ValidityError::VoteNumber { id: id.to_string(), k, n });
                }
            }
        }
        for operand in &formula.operands {
            match operand {
                Operand::Event(event) => {
                    if self.basic_event(event).is_none() {
                        return Err(ValidityError::Undefined(event.clone()));
                    }
                }
                Operand::Gate(gate) => {
                    if self.gate(gate).is_none() {
                        return Err(ValidityError::Undefined(gate.clone()));
                    }
                }
                Operand::Formula(sub) => self.check_formula(id, sub)?,
                Operand::Constant(_) => {}
            }
        }
        Ok(())
    }

    fn check_cycles(&self) -> Result<(), ValidityError> {
        #[derive(Copy, Clone, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }

        fn visit<'a>(
            model: &'a Model,
            id: &'a str,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), ValidityError> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::InProgress) => return Err(ValidityError::Cycle(id.to_string())),
                None => {}
            }
            marks.insert(id, Mark::InProgress);
            if let Some(gate) = model.gate(id) {
                descend(model, &gate.formula, marks)?;
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        fn descend<'a>(
            model: &'a Model,
            formula: &'a Formula,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), ValidityError> {
            for operand in &formula.operands {
                match operand {
                    Operand::Gate(gate) => visit(model, gate, marks)?,
                    Operand::Formula(sub) => descend(model, sub, marks)?,
                    Operand::Event(_) | Operand::Constant(_) => {}
                }
            }
            Ok(())
        }

        let mut marks = HashMap::new();
        visit(self, &self.top, &mut marks)
    }

    fn check_ccf_groups(&self) -> Result<(), ValidityError> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for group in &self.ccf_groups {
            let fail = |reason: String| ValidityError::CcfGroup { id: group.id.clone(), reason };
            if !(0.0..=1.0).contains(&group.beta) {
                return Err(fail(format!("beta factor {} outside [0, 1]", group.beta)));
            }
            if group.members.len() < 2 {
                return Err(fail("fewer than two members".to_string()));
            }
            let mut probability = None;
            for member in &group.members {
                let event = self
                    .basic_event(member)
                    .ok_or_else(|| ValidityError::Undefined(member.clone()))?;
                if let Some(other) = seen.insert(member.as_str(), group.id.as_str()) {
                    return Err(fail(format!("member `{}` already in group `{}`", member, other)));
                }
                match probability {
                    None => probability = Some(event.probability),
                    Some(p) if p == event.probability => {}
                    Some(p) => {
                        return Err(fail(format!(
                            "beta-factor members must share one probability ({} vs {})",
                            p, event.probability
                        )))
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_event_model(formula: Formula) -> Model {
        let mut model = Model::new("top");
        model
            .add_basic_event("a", 0.1)
            .add_basic_event("b", 0.2)
            .add_gate("top", formula);
        model
    }

    #[test]
    fn test_valid_model() {
        let model = two_event_model(Formula::and(vec![Operand::event("a"), Operand::event("b")]));
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_probability_range() {
        let mut model = Model::new("top");
        model
            .add_basic_event("a", 1.5)
            .add_gate("top", Formula::or(vec![Operand::event("a")]));
        assert!(matches!(
            model.validate(),
            Err(ValidityError::EventProbability { .. })
        ));
    }

    #[test]
    fn test_vote_number() {
        let model = two_event_model(Formula::atleast(
            3,
            vec![Operand::event("a"), Operand::event("b")],
        ));
        assert!(matches!(model.validate(), Err(ValidityError::VoteNumber { k: 3, n: 2, .. })));
    }

    #[test]
    fn test_undefined_reference() {
        let model = two_event_model(Formula::and(vec![Operand::event("zz")]));
        assert!(matches!(model.validate(), Err(ValidityError::Undefined(_))));
    }

    #[test]
    fn test_cycle() {
        let mut model = Model::new("top");
        model
            .add_basic_event("a", 0.1)
            .add_gate("top", Formula::or(vec![Operand::gate("g"), Operand::event("a")]))
            .add_gate("g", Formula::and(vec![Operand::gate("top"), Operand::event("a")]));
        assert!(matches!(model.validate(), Err(ValidityError::Cycle(_))));
    }

    #[test]
    fn test_ccf_membership() {
        let mut model = two_event_model(Formula::and(vec![Operand::event("a"), Operand::event("b")]));
        model.add_ccf_group(CcfGroup {
            id: "pumps".to_string(),
            members: vec!["a".to_string()],
            beta: 0.1,
        });
        assert!(matches!(model.validate(), Err(ValidityError::CcfGroup { .. })));
    }
}
