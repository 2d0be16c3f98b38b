//! # fta-rs: fault-tree analysis in Rust
//!
//! **`fta-rs`** is the analysis core of a probabilistic safety assessment
//! engine. Given a Boolean fault tree whose leaves are basic events with
//! failure probabilities, it computes the **minimal cut sets**, the
//! **total probability** of the top event, and per-event **importance
//! factors**.
//!
//! ## How it works
//!
//! The model is translated into an indexed propositional DAG
//! ([`pdag`]), normalized and simplified in place by the [`preprocessor`]
//! (constant propagation, negation normal form, coalescing, absorption,
//! module detection), and handed to the [`mocus`] driver, which expands
//! gates into a zero-suppressed BDD of cut sets ([`zbdd`]) and minimizes
//! them. Exact probabilities come from a [`bdd`] over the same variable
//! ordering; rare-event and MCUB approximations work directly off the cut
//! sets ([`probability`]).
//!
//! ## Basic Usage
//!
//! ```rust
//! use fta_rs::analysis::FaultTreeAnalysis;
//! use fta_rs::model::{Formula, Model, Operand};
//! use fta_rs::settings::Settings;
//!
//! // top = pump AND valve
//! let mut model = Model::new("top");
//! model
//!     .add_basic_event("pump", 0.1)
//!     .add_basic_event("valve", 0.2)
//!     .add_gate(
//!         "top",
//!         Formula::and(vec![Operand::event("pump"), Operand::event("valve")]),
//!     );
//!
//! let report = FaultTreeAnalysis::new(Settings::default())
//!     .analyze(&model)
//!     .unwrap();
//!
//! // One minimal cut set: {pump, valve}.
//! assert_eq!(report.products, vec![vec![1, 2]]);
//! assert!((report.p_total - 0.02).abs() < 1e-9);
//! ```
//!
//! ## Core Components
//!
//! - **[`model`]**: named events, gates, formulas, and CCF groups.
//! - **[`pdag`]**: the indexed mutable Boolean graph.
//! - **[`preprocessor`]**: the normalization pipeline.
//! - **[`zbdd`]** / **[`mocus`]**: cut-set generation and minimization.
//! - **[`bdd`]** / **[`probability`]**: exact and approximate quantification.
//! - **[`analysis`]**: the driver tying everything together.

pub mod analysis;
pub mod bdd;
pub mod cache;
pub mod dot;
pub mod error;
pub mod mocus;
pub mod model;
pub mod node;
pub mod pdag;
pub mod preprocessor;
pub mod probability;
pub mod reference;
pub mod settings;
pub mod storage;
pub mod utils;
pub mod zbdd;
