//! The analysis driver: model in, report out.
//!
//! One [`FaultTreeAnalysis`] run owns its graph and diagram pools; nothing
//! is shared across runs, so analyses may execute on separate threads with
//! disjoint state. The run is synchronous CPU-bound work; the only
//! cooperative hook is the abort flag, polled at pass boundaries and at
//! every MOCUS expansion step.

use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use crate::bdd::Bdd;
use crate::error::Error;
use crate::mocus::Mocus;
use crate::model::Model;
use crate::pdag::{GateType, IndexedEvent, Pdag};
use crate::preprocessor::Preprocessor;
use crate::probability::{prob_mcub, prob_rare_event, ImportanceFactors};
use crate::reference::Ref;
use crate::settings::{Approximation, Settings};

/// Results of one analysis run.
#[derive(Debug)]
pub struct Report {
    /// Minimal cut sets as signed basic-event indices (negative means
    /// complement).
    pub products: Vec<Vec<i32>>,
    /// Index-to-event mapping; position `i` is variable `i + 1`.
    pub basic_events: Vec<IndexedEvent>,
    /// Total probability of the top event.
    pub p_total: f64,
    /// Importance factors per basic event appearing in the cut sets.
    pub importance: Vec<(String, ImportanceFactors)>,
    /// Non-fatal findings, e.g. a trivial top event.
    pub warnings: Vec<String>,
    pub product_time: Duration,
    pub probability_time: Duration,
    pub importance_time: Duration,
}

/// Fault-tree analysis facade over the whole pipeline.
pub struct FaultTreeAnalysis {
    settings: Settings,
    abort: Option<Arc<AtomicBool>>,
}

impl FaultTreeAnalysis {
    pub fn new(settings: Settings) -> Self {
        Self { settings, abort: None }
    }

    /// Install a cooperative abort flag. Raising it makes the run fail
    /// with [`Error::Interrupted`] at the next poll point.
    pub fn with_abort(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn analyze(&self, model: &Model) -> Result<Report, Error> {
        let mut warnings = Vec::new();

        let mut graph = Pdag::from_model(model, self.settings.ccf_analysis())?;
        debug!(
            "graph built: {} variables, top G{}",
            graph.num_variables(),
            graph.root_index()
        );
        Preprocessor::new(&mut graph, self.abort.as_deref()).run()?;

        let product_start = Instant::now();
        let products = self.generate_products(&graph, &mut warnings)?;
        let product_time = product_start.elapsed();

        let probabilities: Vec<f64> = graph.events().iter().map(|e| e.probability).collect();

        let probability_start = Instant::now();
        let mut bdd_root: Option<(Bdd, Ref)> = None;
        let p_total = match self.settings.approximation() {
            Approximation::None => {
                let (bdd, root) = Bdd::from_pdag(&graph);
                let p = bdd.probability(root, &probabilities);
                bdd_root = Some((bdd, root));
                p
            }
            Approximation::RareEvent => {
                let p = prob_rare_event(&products, &probabilities);
                if p > 1.0 {
                    warnings.push(format!(
                        "rare-event approximation yielded {:.6}; clamped to 1",
                        p
                    ));
                    1.0
                } else {
                    p
                }
            }
            Approximation::Mcub => prob_mcub(&products, &probabilities),
        };
        let probability_time = probability_start.elapsed();

        let importance_start = Instant::now();
        let importance = if self.settings.importance_analysis() {
            self.importance(&graph, &products, &probabilities, p_total, &bdd_root, &mut warnings)
        } else {
            Vec::new()
        };
        let importance_time = importance_start.elapsed();

        Ok(Report {
            products,
            basic_events: graph.events().to_vec(),
            p_total,
            importance,
            warnings,
            product_time,
            probability_time,
            importance_time,
        })
    }

    fn generate_products(
        &self,
        graph: &Pdag,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<Vec<i32>>, Error> {
        if let Some(value) = graph.root_constant() {
            return Ok(if value {
                warnings.push("the top event is guaranteed to occur".to_string());
                vec![Vec::new()]
            } else {
                warnings.push("the top event cannot occur".to_string());
                Vec::new()
            });
        }
        let root = graph.root_index();
        if graph.gate(root).gate_type() == GateType::Null {
            // The graph reduced to a single literal.
            return Ok(vec![vec![graph.only_arg(root)]]);
        }
        Mocus::new(graph, &self.settings, self.abort.as_deref()).analyze()
    }

    fn importance(
        &self,
        graph: &Pdag,
        products: &[Vec<i32>],
        probabilities: &[f64],
        p_total: f64,
        bdd_root: &Option<(Bdd, Ref)>,
        warnings: &mut Vec<String>,
    ) -> Vec<(String, ImportanceFactors)> {
        if p_total <= 0.0 {
            if !products.is_empty() {
                warnings.push("importance analysis skipped: total probability is zero".to_string());
            }
            return Vec::new();
        }
        let members: BTreeSet<u32> = products
            .iter()
            .flat_map(|product| product.iter().map(|l| l.unsigned_abs()))
            .collect();

        let mut importance = Vec::with_capacity(members.len());
        for variable in members {
            let p_var = probabilities[(variable - 1) as usize];
            let (p1, p0) = match bdd_root {
                Some((bdd, root)) => (
                    bdd.probability_restricted(*root, variable, true, probabilities),
                    bdd.probability_restricted(*root, variable, false, probabilities),
                ),
                None => self.conditional_approx(products, probabilities, variable),
            };
            let mif = p1 - p0;
            let factors = ImportanceFactors {
                dif: p_var * p1 / p_total,
                mif,
                cif: mif * p_var / p_total,
                rrw: p_total / p0,
                raw: p1 / p_total,
            };
            importance.push((graph.events()[(variable - 1) as usize].id.clone(), factors));
        }
        importance
    }

    /// Conditional probabilities from the cut sets with one variable
    /// forced, using the configured approximation.
    fn conditional_approx(
        &self,
        products: &[Vec<i32>],
        probabilities: &[f64],
        variable: u32,
    ) -> (f64, f64) {
        let mut high = probabilities.to_vec();
        high[(variable - 1) as usize] = 1.0;
        let mut low = probabilities.to_vec();
        low[(variable - 1) as usize] = 0.0;
        match self.settings.approximation() {
            Approximation::RareEvent => (
                prob_rare_event(products, &high).min(1.0),
                prob_rare_event(products, &low).min(1.0),
            ),
            Approximation::Mcub => (prob_mcub(products, &high), prob_mcub(products, &low)),
            Approximation::None => unreachable!("exact analysis keeps its BDD"),
        }
    }
}

/// Convenience wrapper: analyze with default settings.
pub fn analyze(model: &Model) -> Result<Report, Error> {
    FaultTreeAnalysis::new(Settings::default()).analyze(model)
}
