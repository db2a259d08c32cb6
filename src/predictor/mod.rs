//! Polymorphic base predictor and the composite predictor tree: a flat enum
//! dispatched by `match` rather than a deep virtual hierarchy, per the
//! spec's own design note. Forest/Ensemble/Union are recursive variants; the
//! persisted-format tags (`'Z' 'C' 'S' 'T' 'F'` / `'B' 'E' 'U'`) live next to
//! the code that emits them in `format.rs`.

pub mod format;

use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::tree::node::Tree;

/// One summand of a boosted ensemble, specialized to the shallowest
/// representation that fits the tree the trainer actually produced.
#[derive(Debug, Clone, PartialEq)]
pub enum BasePredictor {
    Zero,
    Constant(f32),
    Stump {
        j: usize,
        x: f32,
        left_y: f32,
        right_y: f32,
        gain: f32,
    },
    Tree(Tree),
    Forest(Vec<BasePredictor>),
}

impl BasePredictor {
    pub fn predict_one(&self, row: &[f32]) -> f32 {
        match self {
            BasePredictor::Zero => 0.0,
            BasePredictor::Constant(y) => *y,
            BasePredictor::Stump {
                j,
                x,
                left_y,
                right_y,
                ..
            } => {
                if row[*j] < *x {
                    *left_y
                } else {
                    *right_y
                }
            }
            BasePredictor::Tree(tree) => tree.predict_one(row),
            BasePredictor::Forest(members) => {
                members.iter().map(|m| m.predict_one(row)).sum::<f32>() / members.len() as f32
            }
        }
    }

    pub fn predict(&self, x: &Matrix) -> Vec<f32> {
        (0..x.n_rows()).map(|i| self.predict_one(&x.row(i))).collect()
    }

    pub fn variable_count(&self) -> usize {
        match self {
            BasePredictor::Zero | BasePredictor::Constant(_) => 0,
            BasePredictor::Stump { j, .. } => j + 1,
            BasePredictor::Tree(tree) => tree.max_variable_index().map_or(0, |j| j + 1),
            BasePredictor::Forest(members) => {
                members.iter().map(|m| m.variable_count()).max().unwrap_or(0)
            }
        }
    }

    pub fn accumulate_variable_weights(&self, weights: &mut Vec<f32>, scale: f32) {
        match self {
            BasePredictor::Zero | BasePredictor::Constant(_) => {}
            BasePredictor::Stump { j, gain, .. } => {
                if *j >= weights.len() {
                    weights.resize(j + 1, 0.0);
                }
                weights[*j] += scale * gain;
            }
            BasePredictor::Tree(tree) => tree.accumulate_variable_weights(weights, scale),
            BasePredictor::Forest(members) => {
                let c = scale / members.len() as f32;
                for m in members {
                    m.accumulate_variable_weights(weights, c);
                }
            }
        }
    }

    pub fn reindexed(&self, perm: &[usize]) -> BasePredictor {
        match self {
            BasePredictor::Zero => BasePredictor::Zero,
            BasePredictor::Constant(y) => BasePredictor::Constant(*y),
            BasePredictor::Stump {
                j,
                x,
                left_y,
                right_y,
                gain,
            } => BasePredictor::Stump {
                j: perm[*j],
                x: *x,
                left_y: *left_y,
                right_y: *right_y,
                gain: *gain,
            },
            BasePredictor::Tree(tree) => BasePredictor::Tree(tree.reindexed(perm)),
            BasePredictor::Forest(members) => {
                BasePredictor::Forest(members.iter().map(|m| m.reindexed(perm)).collect())
            }
        }
    }
}

/// `(c0, c1, bases)`: inference computes `sigmoid(c0 + c1 * sum_k base_k(x))`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoostedPredictor {
    pub c0: f32,
    pub c1: f32,
    pub bases: Vec<BasePredictor>,
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl BoostedPredictor {
    pub fn predict_one(&self, row: &[f32]) -> f64 {
        let sum: f32 = self.bases.iter().map(|b| b.predict_one(row)).sum();
        sigmoid(self.c0 as f64 + self.c1 as f64 * sum as f64)
    }

    pub fn predict(&self, x: &Matrix) -> Vec<f64> {
        (0..x.n_rows()).map(|i| self.predict_one(&x.row(i))).collect()
    }

    pub fn variable_count(&self) -> usize {
        self.bases.iter().map(|b| b.variable_count()).max().unwrap_or(0)
    }

    pub fn variable_weights(&self) -> Vec<f32> {
        let mut weights = Vec::new();
        for b in &self.bases {
            b.accumulate_variable_weights(&mut weights, 1.0);
        }
        weights
    }

    pub fn reindexed(&self, perm: &[usize]) -> BoostedPredictor {
        BoostedPredictor {
            c0: self.c0,
            c1: self.c1,
            bases: self.bases.iter().map(|b| b.reindexed(perm)).collect(),
        }
    }
}

/// The top-level predictor: a boosted ensemble, or a composition of several
/// predictors (bagging-style ensemble average, or probabilistic union).
#[derive(Debug, Clone, PartialEq)]
pub enum Predictor {
    Boosted(BoostedPredictor),
    Ensemble(Vec<Predictor>),
    Union(Vec<Predictor>),
}

impl Predictor {
    pub fn predict_one(&self, row: &[f32]) -> f64 {
        match self {
            Predictor::Boosted(b) => b.predict_one(row),
            Predictor::Ensemble(members) => {
                members.iter().map(|m| m.predict_one(row)).sum::<f64>() / members.len() as f64
            }
            Predictor::Union(members) => {
                1.0 - members.iter().map(|m| 1.0 - m.predict_one(row)).product::<f64>()
            }
        }
    }

    pub fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        let needed = self.variable_count();
        if x.n_cols() < needed {
            return Err(Error::invalid_input(format!(
                "predictor needs {needed} columns, matrix has {}",
                x.n_cols()
            )));
        }
        Ok((0..x.n_rows()).map(|i| self.predict_one(&x.row(i))).collect())
    }

    pub fn variable_count(&self) -> usize {
        match self {
            Predictor::Boosted(b) => b.variable_count(),
            Predictor::Ensemble(members) | Predictor::Union(members) => {
                members.iter().map(|m| m.variable_count()).max().unwrap_or(0)
            }
        }
    }

    pub fn variable_weights(&self) -> Vec<f32> {
        match self {
            Predictor::Boosted(b) => b.variable_weights(),
            Predictor::Ensemble(members) | Predictor::Union(members) => {
                let mut weights = Vec::new();
                let scale = 1.0 / members.len() as f32;
                for m in members {
                    let sub = m.variable_weights();
                    if sub.len() > weights.len() {
                        weights.resize(sub.len(), 0.0);
                    }
                    for (w, s) in weights.iter_mut().zip(sub.iter()) {
                        *w += scale * s;
                    }
                }
                weights
            }
        }
    }

    pub fn reindex_variables(&self, perm: &[usize]) -> Predictor {
        match self {
            Predictor::Boosted(b) => Predictor::Boosted(b.reindexed(perm)),
            Predictor::Ensemble(members) => {
                Predictor::Ensemble(members.iter().map(|m| m.reindex_variables(perm)).collect())
            }
            Predictor::Union(members) => {
                Predictor::Union(members.iter().map(|m| m.reindex_variables(perm)).collect())
            }
        }
    }
}
