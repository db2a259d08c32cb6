//! Validated configuration record for tree, boost, and forest parameters.
//!
//! Follows the chained, self-consuming builder idiom used throughout
//! `mbillingr-forests` (`ExtraTreesRegressor::n_estimators(self, n) -> Self`),
//! generalized so each setter validates eagerly and returns `Result<Self>`.

use crate::error::{Error, Result};

/// Validated options controlling one tree fit, one boosted ensemble, and the
/// forest wrapper around either.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    // Forest
    forest_size: usize,

    // Tree shape
    max_tree_depth: usize,

    // Sample subsampling
    min_abs_sample_weight: f64,
    min_rel_sample_weight: f64,
    used_sample_ratio: f64,
    stratified_samples: bool,

    // Feature subsampling
    top_variable_count: usize,
    used_variable_ratio: f64,
    select_variables_by_level: bool,

    // Node constraints
    min_node_size: usize,
    min_node_weight: f64,
    min_node_gain: f64,

    // Post-processing
    prune_factor: f64,

    // Boost
    gamma: f64,
    iteration_count: usize,
    eta: f64,
    fast_exp: bool,

    // Ada circular-buffer retirement rate. 0.0 disables retirement. See
    // DESIGN.md "Open Question decisions".
    cycle: f64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            forest_size: 1,
            max_tree_depth: 1,
            min_abs_sample_weight: 0.0,
            min_rel_sample_weight: 0.0,
            used_sample_ratio: 1.0,
            stratified_samples: false,
            top_variable_count: usize::MAX,
            used_variable_ratio: 1.0,
            select_variables_by_level: false,
            min_node_size: 1,
            min_node_weight: 0.0,
            min_node_gain: 0.0,
            prune_factor: 0.0,
            gamma: 1.0,
            iteration_count: 0,
            eta: 0.3,
            fast_exp: false,
            cycle: 0.0,
        }
    }
}

fn check_range(field: &'static str, v: f64, lo: f64, hi: f64) -> Result<()> {
    // Writing the check as a negated conjunction traps NaN: any comparison
    // with NaN is false, so `!(v >= lo && v <= hi)` is true for NaN.
    if !(v >= lo && v <= hi) {
        return Err(Error::invalid_argument(
            field,
            format!("must be in [{lo}, {hi}], got {v}"),
        ));
    }
    Ok(())
}

impl Options {
    pub fn builder() -> Self {
        Options::default()
    }

    pub fn forest_size(mut self, n: usize) -> Result<Self> {
        if n < 1 {
            return Err(Error::invalid_argument("forest_size", "must be >= 1"));
        }
        self.forest_size = n;
        Ok(self)
    }

    pub fn max_tree_depth(mut self, d: usize) -> Result<Self> {
        if d < 1 {
            return Err(Error::invalid_argument("max_tree_depth", "must be >= 1"));
        }
        self.max_tree_depth = d;
        Ok(self)
    }

    pub fn min_abs_sample_weight(mut self, w: f64) -> Result<Self> {
        if !(w >= 0.0) {
            return Err(Error::invalid_argument("min_abs_sample_weight", "must be >= 0"));
        }
        self.min_abs_sample_weight = w;
        Ok(self)
    }

    pub fn min_rel_sample_weight(mut self, w: f64) -> Result<Self> {
        check_range("min_rel_sample_weight", w, 0.0, 1.0)?;
        self.min_rel_sample_weight = w;
        Ok(self)
    }

    pub fn used_sample_ratio(mut self, r: f64) -> Result<Self> {
        if !(r > 0.0 && r <= 1.0) {
            return Err(Error::invalid_argument("used_sample_ratio", "must be in (0, 1]"));
        }
        self.used_sample_ratio = r;
        Ok(self)
    }

    pub fn stratified_samples(mut self, b: bool) -> Self {
        self.stratified_samples = b;
        self
    }

    pub fn top_variable_count(mut self, n: usize) -> Result<Self> {
        if n < 1 {
            return Err(Error::invalid_argument("top_variable_count", "must be >= 1"));
        }
        self.top_variable_count = n;
        Ok(self)
    }

    pub fn used_variable_ratio(mut self, r: f64) -> Result<Self> {
        check_range("used_variable_ratio", r, 0.0, 1.0)?;
        self.used_variable_ratio = r;
        Ok(self)
    }

    pub fn select_variables_by_level(mut self, b: bool) -> Self {
        self.select_variables_by_level = b;
        self
    }

    pub fn min_node_size(mut self, n: usize) -> Result<Self> {
        if n < 1 {
            return Err(Error::invalid_argument("min_node_size", "must be >= 1"));
        }
        self.min_node_size = n;
        Ok(self)
    }

    pub fn min_node_weight(mut self, w: f64) -> Result<Self> {
        if !(w >= 0.0) {
            return Err(Error::invalid_argument("min_node_weight", "must be >= 0"));
        }
        self.min_node_weight = w;
        Ok(self)
    }

    pub fn min_node_gain(mut self, g: f64) -> Result<Self> {
        if !(g >= 0.0) {
            return Err(Error::invalid_argument("min_node_gain", "must be >= 0"));
        }
        self.min_node_gain = g;
        Ok(self)
    }

    pub fn prune_factor(mut self, p: f64) -> Result<Self> {
        check_range("prune_factor", p, 0.0, 1.0)?;
        self.prune_factor = p;
        Ok(self)
    }

    pub fn gamma(mut self, g: f64) -> Result<Self> {
        check_range("gamma", g, 0.0, 1.0)?;
        self.gamma = g;
        Ok(self)
    }

    pub fn iteration_count(mut self, n: usize) -> Self {
        self.iteration_count = n;
        self
    }

    pub fn eta(mut self, e: f64) -> Result<Self> {
        if !(e > 0.0) {
            return Err(Error::invalid_argument("eta", "must be > 0"));
        }
        self.eta = e;
        Ok(self)
    }

    pub fn fast_exp(mut self, b: bool) -> Self {
        self.fast_exp = b;
        self
    }

    pub fn cycle(mut self, c: f64) -> Result<Self> {
        check_range("cycle", c, 0.0, 1.0)?;
        self.cycle = c;
        Ok(self)
    }

    // --- accessors -------------------------------------------------------

    pub fn get_forest_size(&self) -> usize {
        self.forest_size
    }
    pub fn get_max_tree_depth(&self) -> usize {
        self.max_tree_depth
    }
    pub fn get_min_abs_sample_weight(&self) -> f64 {
        self.min_abs_sample_weight
    }
    pub fn get_min_rel_sample_weight(&self) -> f64 {
        self.min_rel_sample_weight
    }
    pub fn get_used_sample_ratio(&self) -> f64 {
        self.used_sample_ratio
    }
    pub fn get_stratified_samples(&self) -> bool {
        self.stratified_samples
    }
    pub fn get_top_variable_count(&self) -> usize {
        self.top_variable_count
    }
    pub fn get_used_variable_ratio(&self) -> f64 {
        self.used_variable_ratio
    }
    pub fn get_select_variables_by_level(&self) -> bool {
        self.select_variables_by_level
    }
    pub fn get_min_node_size(&self) -> usize {
        self.min_node_size
    }
    pub fn get_min_node_weight(&self) -> f64 {
        self.min_node_weight
    }
    pub fn get_min_node_gain(&self) -> f64 {
        self.min_node_gain
    }
    pub fn get_prune_factor(&self) -> f64 {
        self.prune_factor
    }
    pub fn get_gamma(&self) -> f64 {
        self.gamma
    }
    pub fn get_iteration_count(&self) -> usize {
        self.iteration_count
    }
    pub fn get_eta(&self) -> f64 {
        self.eta
    }
    pub fn get_fast_exp(&self) -> bool {
        self.fast_exp
    }
    pub fn get_cycle(&self) -> f64 {
        self.cycle
    }

    /// Scheduling cost used by the orchestrator for descending-cost ordering.
    pub fn cost(&self) -> f64 {
        self.used_variable_ratio
            * self.top_variable_count as f64
            * self.used_sample_ratio
            * self.max_tree_depth as f64
            * self.iteration_count as f64
            / self.eta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let opt = Options::builder();
        assert_eq!(opt.get_forest_size(), 1);
        assert_eq!(opt.get_cycle(), 0.0);
    }

    #[test]
    fn setter_rejects_out_of_range() {
        assert!(Options::builder().used_variable_ratio(1.5).is_err());
        assert!(Options::builder().used_variable_ratio(f64::NAN).is_err());
        assert!(Options::builder().eta(0.0).is_err());
        assert!(Options::builder().forest_size(0).is_err());
    }

    #[test]
    fn chained_setters_compose() {
        let opt = Options::builder()
            .max_tree_depth(3)
            .unwrap()
            .eta(0.1)
            .unwrap()
            .gamma(0.5)
            .unwrap()
            .iteration_count(10);
        assert_eq!(opt.get_max_tree_depth(), 3);
        assert_eq!(opt.get_iteration_count(), 10);
    }

    #[test]
    fn cost_formula_matches_spec() {
        let opt = Options::builder()
            .used_variable_ratio(0.5)
            .unwrap()
            .top_variable_count(10)
            .unwrap()
            .used_sample_ratio(0.8)
            .unwrap()
            .max_tree_depth(4)
            .unwrap()
            .eta(0.2)
            .unwrap()
            .iteration_count(100);
        let expected = 0.5 * 10.0 * 0.8 * 4.0 * 100.0 / 0.2;
        assert!((opt.cost() - expected).abs() < 1e-9);
    }
}
