//! MOCUS cut-set generation over the preprocessed graph.
//!
//! The driver works module by module. For each module gate it seeds a
//! [`CutSetContainer`] with the gate's local family, then repeatedly pops
//! the next gate literal and substitutes that gate's own family into its
//! occurrences until only basic events and module placeholders remain.
//! Modules are analyzed recursively and their minimal cut sets are joined
//! back into the host container.
//!
//! Termination follows from the acyclicity of the graph: every expansion
//! replaces a gate literal with literals that order strictly below it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::debug;

use crate::error::Error;
use crate::pdag::Pdag;
use crate::probability::prob_and;
use crate::settings::Settings;
use crate::zbdd::CutSetContainer;

pub struct Mocus<'a> {
    graph: &'a Pdag,
    settings: &'a Settings,
    abort: Option<&'a AtomicBool>,
}

impl<'a> Mocus<'a> {
    pub fn new(graph: &'a Pdag, settings: &'a Settings, abort: Option<&'a AtomicBool>) -> Self {
        Self { graph, settings, abort }
    }

    /// Generate the minimal cut sets of the whole graph.
    pub fn analyze(&self) -> Result<Vec<Vec<i32>>, Error> {
        let start = Instant::now();
        debug!("start minimal cut set generation");
        let container = self.analyze_module(self.graph.root_index())?;
        let mut products = container.products();
        if self.settings.cut_off() > 0.0 {
            let probabilities: Vec<f64> = self.graph.events().iter().map(|e| e.probability).collect();
            let floor = self.settings.cut_off();
            products.retain(|product| prob_and(product, &probabilities) >= floor);
        }
        debug!(
            "{} minimal cut sets found in {:?}",
            products.len(),
            start.elapsed()
        );
        Ok(products)
    }

    fn check_abort(&self) -> Result<(), Error> {
        if let Some(flag) = self.abort {
            if flag.load(Ordering::Relaxed) {
                return Err(Error::Interrupted);
            }
        }
        Ok(())
    }

    fn analyze_module(&self, gate: u32) -> Result<CutSetContainer, Error> {
        debug_assert!(self.graph.gate(gate).is_module(), "expected a module gate");
        let start = Instant::now();
        debug!("finding cut sets from module G{}", gate);

        let container = CutSetContainer::new(self.graph);
        container.merge(container.convert_gate(self.graph, gate))?;
        while let Some(next) = container.next_gate() {
            self.check_abort()?;
            debug!("expanding gate G{}", next);
            let converted = container.convert_gate(self.graph, next);
            let intermediate = container.extract_intermediate_cut_sets(next);
            let expanded = container.expand_gate(converted, intermediate);
            container.merge(expanded)?;
        }
        container.minimize(self.settings.limit_order())?;
        if !self.graph.coherent() {
            container.eliminate_complements();
            container.minimize(self.settings.limit_order())?;
        }
        for module in container.gather_modules() {
            self.check_abort()?;
            let sub = self.analyze_module(module)?;
            container.join_module(module, &sub)?;
        }
        container.minimize(self.settings.limit_order())?;
        container.collect_garbage();
        debug!("G{} cut set generation took {:?}", gate, start.elapsed());
        Ok(container)
    }
}
