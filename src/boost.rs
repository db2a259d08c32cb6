//! `BoostTrainer`: fits a sequence of base predictors and combines them into
//! one `BoostedPredictor` via `sigmoid(c0 + c1 * sum_k base_k(x))`.
//!
//! Three update rules, chosen by `gamma` (`BoostTrainer.cpp`'s
//! `trainAda_`/`trainLogit_`/`trainRegularizedLogit_`):
//! - `gamma == 1.0`: AdaBoost. Exponential loss, with an optional `cycle`
//!   circular-buffer retirement of old base predictors.
//! - `gamma == 0.0`: LogitBoost.
//! - `0.0 < gamma < 1.0`: the regularized-logit family interpolating between
//!   the two.
//!
//! All three share one outer loop shape: form an adjusted target/weight pair
//! from the current margin `F`, fit a tree on it, fold the tree into `F`
//! with coefficient `eta` (scaled per family), and bail out with
//! `Error::Overflow` the moment the adjusted-weight accumulator stops being
//! finite.

use crate::error::{Error, Result};
use crate::fast_exp::exp;
use crate::matrix::Matrix;
use crate::options::Options;
use crate::predictor::BoostedPredictor;
use crate::rng;
use crate::tree::trainer::TreeTrainer;

/// Trains one boosted ensemble against a fixed `(x, labels)` data set.
/// `weights` and `strata` are optional; strata defaults to the labels
/// themselves (the usual choice for `stratified_samples`).
pub struct BoostTrainer<'a> {
    x: &'a Matrix,
    out_data: Vec<f64>, // labels remapped to {-1, +1}
    weights: Option<Vec<f64>>,
    global_log_odds: f64,
    tree_trainer: TreeTrainer<'a>,
}

impl<'a> BoostTrainer<'a> {
    pub fn new(x: &'a Matrix, labels: &[u8], weights: Option<Vec<f64>>, strata: Option<Vec<u8>>) -> Result<Self> {
        let n = x.n_rows();
        if n == 0 {
            return Err(Error::invalid_input("training set has no samples"));
        }
        if x.n_cols() == 0 {
            return Err(Error::invalid_input("training set has no variables"));
        }
        if labels.len() != n {
            return Err(Error::invalid_input("label count does not match sample count"));
        }
        if labels.iter().any(|&y| y > 1) {
            return Err(Error::invalid_input("labels must be 0 or 1"));
        }
        if let Some(w) = &weights {
            if w.len() != n {
                return Err(Error::invalid_input("weight count does not match sample count"));
            }
            if !w.iter().all(|&v| v.is_finite() && v > 0.0) {
                return Err(Error::invalid_input("weights must be finite and positive"));
            }
        }

        let out_data: Vec<f64> = labels.iter().map(|&y| 2.0 * y as f64 - 1.0).collect();
        let strata = strata.unwrap_or_else(|| labels.to_vec());
        if strata.len() != n {
            return Err(Error::invalid_input("strata count does not match sample count"));
        }

        let global_log_odds = Self::global_log_odds_ratio(&out_data, weights.as_deref())?;
        let tree_trainer = TreeTrainer::new(x, strata)?;

        Ok(BoostTrainer {
            x,
            out_data,
            weights,
            global_log_odds,
            tree_trainer,
        })
    }

    fn global_log_odds_ratio(out_data: &[f64], weights: Option<&[f64]>) -> Result<f64> {
        let mut sum_w0 = 0.0_f64;
        let mut sum_w1 = 0.0_f64;
        for (i, &y) in out_data.iter().enumerate() {
            let w = weights.map_or(1.0, |w| w[i]);
            sum_w0 += w * (1.0 - y) / 2.0;
            sum_w1 += w * (1.0 + y) / 2.0;
        }
        if sum_w0 == 0.0 || sum_w1 == 0.0 {
            return Err(Error::invalid_input(
                "training set must contain samples of both classes (with positive weight)",
            ));
        }
        Ok(sum_w1.ln() - sum_w0.ln())
    }

    fn overflow_advice(gamma: f64) -> &'static str {
        if gamma == 1.0 {
            "decrease eta"
        } else {
            "decrease eta or increase gamma"
        }
    }

    pub fn train(&self, options: &Options) -> Result<BoostedPredictor> {
        log::info!(
            "boost fit: {} iterations, gamma={}, eta={}",
            options.get_iteration_count(),
            options.get_gamma(),
            options.get_eta()
        );
        let result = if options.get_gamma() == 1.0 {
            self.train_ada(options)
        } else if options.get_gamma() == 0.0 {
            self.train_logit(options)
        } else {
            self.train_regularized_logit(options)
        };
        if let Ok(p) = &result {
            log::info!("boost fit done: {} base predictors", p.bases.len());
        }
        result
    }

    fn train_ada(&self, options: &Options) -> Result<BoostedPredictor> {
        let n = self.out_data.len();
        let eta = options.get_eta();
        let use_fast = options.get_fast_exp();
        let cycle = options.get_cycle();

        let mut f = vec![self.global_log_odds / 2.0; n];
        let mut bases = Vec::with_capacity(options.get_iteration_count());
        let mut a = if cycle > 0.0 {
            rng::with_thread_rng(|r| r.next_f64())
        } else {
            0.0
        };
        let mut retired = 0usize;

        for iter in 0..options.get_iteration_count() {
            let mut adj_weights = vec![0.0_f64; n];
            let mut adj_weight_sum = 0.0_f64;
            for i in 0..n {
                let mut w = exp(-f[i] * self.out_data[i], use_fast);
                if let Some(weights) = &self.weights {
                    w *= weights[i];
                }
                adj_weights[i] = w;
                adj_weight_sum += w;
            }
            if !adj_weight_sum.is_finite() {
                return Err(Error::Overflow { advice: Self::overflow_advice(1.0) });
            }
            log::debug!("ada iter {iter}: adjusted weight sum = {adj_weight_sum}");

            let base = self.tree_trainer.train(&self.out_data, &adj_weights, options)?;
            let preds = base.predict(self.x);
            for i in 0..n {
                f[i] += eta * preds[i] as f64;
            }
            bases.push(base);

            if cycle > 0.0 {
                a += cycle;
                while a >= 1.0 && retired < bases.len() {
                    let retired_preds = bases[retired].predict(self.x);
                    for i in 0..n {
                        f[i] -= eta * retired_preds[i] as f64;
                    }
                    retired += 1;
                    a -= 1.0;
                }
            }
        }

        let bases = bases.split_off(retired);
        Ok(BoostedPredictor {
            c0: self.global_log_odds as f32,
            c1: (2.0 * eta) as f32,
            bases,
        })
    }

    fn train_logit(&self, options: &Options) -> Result<BoostedPredictor> {
        let n = self.out_data.len();
        let eta = options.get_eta();
        let use_fast = options.get_fast_exp();

        let mut f = vec![self.global_log_odds; n];
        let mut bases = Vec::with_capacity(options.get_iteration_count());

        for iter in 0..options.get_iteration_count() {
            let mut z = vec![0.0_f64; n];
            let mut u = vec![0.0_f64; n];
            let mut abs_adj_out_data_sum = 0.0_f64;

            for i in 0..n {
                let y = self.out_data[i];
                let x = exp(-f[i] * y, use_fast);
                let zi = y * (x + 1.0);
                let mut ui = x / ((x + 1.0) * (x + 1.0));
                if let Some(weights) = &self.weights {
                    ui *= weights[i];
                }
                z[i] = zi;
                u[i] = ui;
                abs_adj_out_data_sum += zi.abs();
            }
            if !abs_adj_out_data_sum.is_finite() {
                return Err(Error::Overflow { advice: Self::overflow_advice(0.0) });
            }
            log::debug!("logit iter {iter}: absolute adjusted target sum = {abs_adj_out_data_sum}");

            let base = self.tree_trainer.train(&z, &u, options)?;
            let preds = base.predict(self.x);
            for i in 0..n {
                f[i] += eta * preds[i] as f64;
            }
            bases.push(base);
        }

        Ok(BoostedPredictor {
            c0: self.global_log_odds as f32,
            c1: eta as f32,
            bases,
        })
    }

    fn train_regularized_logit(&self, options: &Options) -> Result<BoostedPredictor> {
        let n = self.out_data.len();
        let eta = options.get_eta();
        let gamma = options.get_gamma();
        let use_fast = options.get_fast_exp();

        let mut f = vec![self.global_log_odds / (gamma + 1.0); n];
        let mut bases = Vec::with_capacity(options.get_iteration_count());

        for iter in 0..options.get_iteration_count() {
            let mut z = vec![0.0_f64; n];
            let mut u = vec![0.0_f64; n];
            let mut adj_weight_sum = 0.0_f64;

            for i in 0..n {
                let y = self.out_data[i];
                let x = exp(-f[i] * y, use_fast);
                let zi = y * (x + 1.0) / (gamma * x + 1.0);
                let mut ui = x * (gamma * x + 1.0) * (x + 1.0).powf(gamma - 2.0);
                if let Some(weights) = &self.weights {
                    ui *= weights[i];
                }
                z[i] = zi;
                u[i] = ui;
                adj_weight_sum += ui;
            }
            if !adj_weight_sum.is_finite() {
                return Err(Error::Overflow { advice: Self::overflow_advice(gamma) });
            }
            log::debug!("regularized-logit iter {iter}: adjusted weight sum = {adj_weight_sum}");

            let base = self.tree_trainer.train(&z, &u, options)?;
            let preds = base.predict(self.x);
            for i in 0..n {
                f[i] += eta * preds[i] as f64;
            }
            bases.push(base);
        }

        Ok(BoostedPredictor {
            c0: self.global_log_odds as f32,
            c1: ((1.0 + gamma) * eta) as f32,
            bases,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_matrix() -> Matrix {
        Matrix::from_column_major(vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0], 6, 1).unwrap()
    }

    #[test]
    fn rejects_single_class_labels() {
        let x = toy_matrix();
        let labels = [0u8, 0, 0, 0, 0, 0];
        let err = BoostTrainer::new(&x, &labels, None, None).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn rejects_mismatched_label_count() {
        let x = toy_matrix();
        let labels = [0u8, 1];
        let err = BoostTrainer::new(&x, &labels, None, None).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn ada_fit_produces_probabilities_in_range() {
        let x = toy_matrix();
        let labels = [0u8, 0, 0, 1, 1, 1];
        let trainer = BoostTrainer::new(&x, &labels, None, None).unwrap();
        let options = Options::builder()
            .iteration_count(5)
            .eta(0.3)
            .unwrap()
            .max_tree_depth(1)
            .unwrap();
        let predictor = trainer.train(&options).unwrap();
        let preds = predictor.predict(&x);
        assert_eq!(preds.len(), 6);
        for p in preds {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn logit_fit_produces_probabilities_in_range() {
        let x = toy_matrix();
        let labels = [0u8, 0, 0, 1, 1, 1];
        let trainer = BoostTrainer::new(&x, &labels, None, None).unwrap();
        let options = Options::builder()
            .iteration_count(5)
            .eta(0.3)
            .unwrap()
            .gamma(0.0)
            .unwrap()
            .max_tree_depth(1)
            .unwrap();
        let predictor = trainer.train(&options).unwrap();
        for p in predictor.predict(&x) {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn huge_eta_triggers_overflow() {
        let x = toy_matrix();
        let labels = [0u8, 0, 0, 1, 1, 1];
        let trainer = BoostTrainer::new(&x, &labels, None, None).unwrap();
        let options = Options::builder()
            .iteration_count(100)
            .eta(1.0e6)
            .unwrap()
            .max_tree_depth(1)
            .unwrap();
        let err = trainer.train(&options).unwrap_err();
        match err {
            Error::Overflow { advice } => assert_eq!(advice, "decrease eta"),
            other => panic!("expected Overflow, got {other:?}"),
        }
    }

    #[test]
    fn cycle_retirement_keeps_base_count_bounded() {
        let x = toy_matrix();
        let labels = [0u8, 0, 0, 1, 1, 1];
        let trainer = BoostTrainer::new(&x, &labels, None, None).unwrap();
        let options = Options::builder()
            .iteration_count(10)
            .eta(0.1)
            .unwrap()
            .max_tree_depth(1)
            .unwrap()
            .cycle(0.5)
            .unwrap();
        let predictor = trainer.train(&options).unwrap();
        assert!(predictor.bases.len() < 10);
    }
}
