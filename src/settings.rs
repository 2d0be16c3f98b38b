//! Analysis tunables.

use crate::error::ValidityError;

/// Probability calculation method.
///
/// `None` builds a BDD and computes the exact value; the other two derive
/// the total from the minimal cut sets.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Approximation {
    #[default]
    None,
    RareEvent,
    Mcub,
}

/// Settings for one fault-tree analysis.
///
/// Setters validate their input and can be chained:
///
/// ```
/// use fta_rs::settings::{Approximation, Settings};
///
/// let mut settings = Settings::default();
/// settings
///     .set_approximation(Approximation::RareEvent)
///     .set_limit_order(6)
///     .set_importance_analysis(true);
/// assert_eq!(settings.limit_order(), Some(6));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Settings {
    approximation: Approximation,
    limit_order: Option<usize>,
    cut_off: f64,
    ccf_analysis: bool,
    importance_analysis: bool,
}

impl Settings {
    pub fn approximation(&self) -> Approximation {
        self.approximation
    }

    pub fn set_approximation(&mut self, approximation: Approximation) -> &mut Self {
        self.approximation = approximation;
        self
    }

    /// Maximum size of reported cut sets. `None` keeps all orders.
    pub fn limit_order(&self) -> Option<usize> {
        self.limit_order
    }

    pub fn set_limit_order(&mut self, order: usize) -> &mut Self {
        self.limit_order = Some(order);
        self
    }

    /// Probability floor below which cut sets are pruned. Zero keeps all.
    pub fn cut_off(&self) -> f64 {
        self.cut_off
    }

    pub fn set_cut_off(&mut self, probability: f64) -> Result<&mut Self, ValidityError> {
        if !(0.0..1.0).contains(&probability) {
            return Err(ValidityError::CutOff(probability));
        }
        self.cut_off = probability;
        Ok(self)
    }

    /// Whether common-cause groups are expanded during graph construction.
    pub fn ccf_analysis(&self) -> bool {
        self.ccf_analysis
    }

    pub fn set_ccf_analysis(&mut self, flag: bool) -> &mut Self {
        self.ccf_analysis = flag;
        self
    }

    pub fn importance_analysis(&self) -> bool {
        self.importance_analysis
    }

    pub fn set_importance_analysis(&mut self, flag: bool) -> &mut Self {
        self.importance_analysis = flag;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.approximation(), Approximation::None);
        assert_eq!(settings.limit_order(), None);
        assert_eq!(settings.cut_off(), 0.0);
        assert!(!settings.ccf_analysis());
        assert!(!settings.importance_analysis());
    }

    #[test]
    fn test_cut_off_range() {
        let mut settings = Settings::default();
        assert!(settings.set_cut_off(0.5).is_ok());
        assert!(settings.set_cut_off(1.0).is_err());
        assert!(settings.set_cut_off(-0.1).is_err());
        assert_eq!(settings.cut_off(), 0.5);
    }
}
