//! Gradient-boosted decision trees for binary classification over dense,
//! in-memory tabular data.
//!
//! The public surface is small and layered the way the original C++ library
//! is layered: a validated [`Options`] record, a [`BoostTrainer`] that binds
//! one fixed data set, and a [`predictor::Predictor`] tree produced by
//! training and reusable for inference or persistence. [`orchestrator`]
//! fits many `Options` against one trainer in parallel, for hyperparameter
//! sweeps and cross-validation.

pub mod boost;
pub mod error;
pub mod fast_exp;
pub mod matrix;
pub mod narrow;
pub mod options;
pub mod orchestrator;
pub mod predictor;
pub mod presort;
pub mod rng;
pub mod tree;

pub use boost::BoostTrainer;
pub use error::{Error, Result};
pub use matrix::Matrix;
pub use options::Options;
pub use orchestrator::{
    parallel_train, parallel_train_and_eval, parallel_train_and_predict, InterruptHandle, NullInterrupt,
};
pub use predictor::{format as predictor_format, BasePredictor, BoostedPredictor, Predictor};
pub use presort::PresortIndex;
