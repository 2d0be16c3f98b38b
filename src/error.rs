//! Error taxonomy of the analysis core.
//!
//! Three kinds of failures leave the engine: model precondition violations
//! ([`ValidityError`]), broken internal invariants ([`Error::Logic`], fatal),
//! and exceeded resource caps ([`Error::Limit`]). Recoverable conditions,
//! such as a graph that reduces to a constant, are reported as warnings in
//! the analysis report instead.

use thiserror::Error;

/// The input model or the settings violate a precondition.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidityError {
    #[error("basic event `{id}` has probability {value} outside [0, 1]")]
    EventProbability { id: String, value: f64 },

    #[error("cut-off probability {0} must be within [0, 1)")]
    CutOff(f64),

    #[error("duplicate definition of `{0}`")]
    Duplicate(String),

    #[error("undefined reference to `{0}`")]
    Undefined(String),

    #[error("cycle detected through gate `{0}`")]
    Cycle(String),

    #[error("`{id}`: {connective} formula takes {expected} arguments, got {actual}")]
    Arity {
        id: String,
        connective: &'static str,
        expected: &'static str,
        actual: usize,
    },

    #[error("`{id}`: atleast formula requires {k} out of {n} arguments")]
    VoteNumber { id: String, k: u32, n: usize },

    #[error("CCF group `{id}`: {reason}")]
    CcfGroup { id: String, reason: String },
}

/// Any failure surfaced by an analysis run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validity(#[from] ValidityError),

    /// An internal invariant does not hold. The context names the
    /// preprocessing pass or engine stage that detected the breach.
    #[error("logic error in {context}: {reason}")]
    Logic { context: String, reason: String },

    /// A resource cap was exceeded (cut-set diagram growth).
    #[error("limit exceeded: {0}")]
    Limit(String),

    /// The cooperative abort flag was raised; no results were produced.
    #[error("analysis interrupted")]
    Interrupted,
}
