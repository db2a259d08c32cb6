//! Fits many `Options` against one `BoostTrainer` in parallel, balancing
//! threads the way `ParallelTrain.cpp` does: sort the option list
//! descending by `Options::cost()`, run an outer pool sized by
//! `outer_thread_count_`, and give each outer slot an inner pool whose size
//! is that thread's fair share of the remaining cores (`threadCount *
//! (idx+1) / outerCount - threadCount * idx / outerCount`, the same
//! integer-division balancing trick as the original).
//!
//! Interior abort-checking (stopping a tree fit mid-flight) is out of scope
//! here: `Options` boundaries are the only cancellation points, which is
//! cheap to check and matches how `ParallelTrain.cpp`'s own OpenMP loop is
//! actually granular (one `BoostTrainer::train` call per work item).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::boost::BoostTrainer;
use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::options::Options;
use crate::predictor::BoostedPredictor;

/// Lets a caller cancel an in-flight `parallel_train*` call between option
/// fits. `NullInterrupt` never cancels.
pub trait InterruptHandle: Sync {
    fn is_interrupted(&self) -> bool;
}

pub struct NullInterrupt;

impl InterruptHandle for NullInterrupt {
    fn is_interrupted(&self) -> bool {
        false
    }
}

fn outer_thread_count(thread_count: usize) -> usize {
    if thread_count <= 8 {
        thread_count
    } else {
        (8.0 * thread_count as f64).sqrt().round() as usize
    }
}

fn inner_thread_count(thread_count: usize, outer_thread_count: usize, outer_thread_index: usize) -> usize {
    (thread_count * (outer_thread_index + 1)) / outer_thread_count - (thread_count * outer_thread_index) / outer_thread_count
}

fn cost_sorted_indices(opts: &[Options]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..opts.len()).collect();
    order.sort_by(|&a, &b| {
        opts[b]
            .cost()
            .partial_cmp(&opts[a].cost())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

/// Shared scheduling loop: claims cost-sorted work items from `next_index`
/// one at a time, training each through a freshly sized inner pool, until
/// exhausted, interrupted, or one item errors (in which case every other
/// outer thread stops claiming new work and the first real error wins).
fn run_scheduled<T: Send, F>(
    opts: &[Options],
    interrupt: &dyn InterruptHandle,
    fit: F,
) -> Result<Vec<T>>
where
    F: Fn(&Options, usize) -> Result<T> + Sync,
{
    let opt_count = opts.len();
    let order = cost_sorted_indices(opts);
    let thread_count = num_cpus::get().max(1);
    let outer_count = opt_count.min(outer_thread_count(thread_count)).max(1);

    log::info!("orchestrator: {opt_count} option sets, {outer_count} outer threads, {thread_count} total threads");

    let outer_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(outer_count)
        .build()
        .map_err(|e| Error::invalid_input(format!("failed to build outer thread pool: {e}")))?;

    let next_index = AtomicUsize::new(0);
    let abort = AtomicBool::new(false);
    let first_error: Mutex<Option<Error>> = Mutex::new(None);
    let results: Mutex<Vec<Option<T>>> = Mutex::new((0..opt_count).map(|_| None).collect());

    outer_pool.scope(|scope| {
        for outer_thread_index in 0..outer_count {
            let n_inner = inner_thread_count(thread_count, outer_count, outer_thread_index).max(1);
            let order = &order;
            let fit = &fit;
            let next_index = &next_index;
            let abort = &abort;
            let first_error = &first_error;
            let results = &results;
            scope.spawn(move |_| {
                let inner_pool = match rayon::ThreadPoolBuilder::new().num_threads(n_inner).build() {
                    Ok(p) => p,
                    Err(e) => {
                        abort.store(true, Ordering::SeqCst);
                        let mut fe = first_error.lock().unwrap();
                        if fe.is_none() {
                            *fe = Some(Error::invalid_input(format!("failed to build inner thread pool: {e}")));
                        }
                        return;
                    }
                };
                loop {
                    if abort.load(Ordering::SeqCst) {
                        return;
                    }
                    let sorted_idx = next_index.fetch_add(1, Ordering::SeqCst);
                    if sorted_idx >= order.len() {
                        return;
                    }
                    if interrupt.is_interrupted() {
                        abort.store(true, Ordering::SeqCst);
                        let mut fe = first_error.lock().unwrap();
                        if fe.is_none() {
                            *fe = Some(Error::Interrupted);
                        }
                        return;
                    }
                    let opt_index = order[sorted_idx];
                    let outcome = inner_pool.install(|| fit(&opts[opt_index], n_inner));
                    match outcome {
                        Ok(value) => {
                            results.lock().unwrap()[opt_index] = Some(value);
                        }
                        Err(e) => {
                            abort.store(true, Ordering::SeqCst);
                            let mut fe = first_error.lock().unwrap();
                            if fe.is_none() {
                                *fe = Some(e);
                            }
                            return;
                        }
                    }
                }
            });
        }
    });

    if let Some(e) = first_error.into_inner().unwrap() {
        return Err(e);
    }
    Ok(results
        .into_inner()
        .unwrap()
        .into_iter()
        .map(|r| r.expect("every option index is claimed and filled exactly once, or an error was returned"))
        .collect())
}

/// Fit `opts.len()` independent boosted predictors against one trainer.
pub fn parallel_train(trainer: &BoostTrainer, opts: &[Options]) -> Result<Vec<BoostedPredictor>> {
    parallel_train_with_interrupt(trainer, opts, &NullInterrupt)
}

pub fn parallel_train_with_interrupt(
    trainer: &BoostTrainer,
    opts: &[Options],
    interrupt: &dyn InterruptHandle,
) -> Result<Vec<BoostedPredictor>> {
    run_scheduled(opts, interrupt, |opt, _inner_threads| trainer.train(opt))
}

/// Fit each option set and predict on `test_x`, returning one prediction
/// column per option (row-major: `result[i][row]`).
pub fn parallel_train_and_predict(
    trainer: &BoostTrainer,
    opts: &[Options],
    test_x: &Matrix,
) -> Result<Vec<Vec<f64>>> {
    parallel_train_and_predict_with_interrupt(trainer, opts, test_x, &NullInterrupt)
}

pub fn parallel_train_and_predict_with_interrupt(
    trainer: &BoostTrainer,
    opts: &[Options],
    test_x: &Matrix,
    interrupt: &dyn InterruptHandle,
) -> Result<Vec<Vec<f64>>> {
    if test_x.n_rows() == 0 {
        return Err(Error::invalid_input("test data has no samples"));
    }
    run_scheduled(opts, interrupt, |opt, _inner_threads| {
        let pred = trainer.train(opt)?;
        Ok(pred.predict(test_x))
    })
}

/// Fit each option set and score it against held-out data with `loss_fn`,
/// returning one score per option. `weights`, if given, is passed through to
/// `loss_fn` as per-sample weights for the held-out set.
pub fn parallel_train_and_eval(
    trainer: &BoostTrainer,
    opts: &[Options],
    test_x: &Matrix,
    test_labels: &[u8],
    weights: Option<&[f64]>,
    loss_fn: impl Fn(&[u8], &[f64], Option<&[f64]>) -> f64 + Sync,
) -> Result<Vec<f64>> {
    parallel_train_and_eval_with_interrupt(trainer, opts, test_x, test_labels, weights, loss_fn, &NullInterrupt)
}

pub fn parallel_train_and_eval_with_interrupt(
    trainer: &BoostTrainer,
    opts: &[Options],
    test_x: &Matrix,
    test_labels: &[u8],
    weights: Option<&[f64]>,
    loss_fn: impl Fn(&[u8], &[f64], Option<&[f64]>) -> f64 + Sync,
    interrupt: &dyn InterruptHandle,
) -> Result<Vec<f64>> {
    if test_x.n_rows() != test_labels.len() {
        return Err(Error::invalid_input("test label count does not match test sample count"));
    }
    if let Some(w) = weights {
        if w.len() != test_labels.len() {
            return Err(Error::invalid_input("test weight count does not match test sample count"));
        }
    }
    run_scheduled(opts, interrupt, |opt, _inner_threads| {
        let pred = trainer.train(opt)?;
        let scores = pred.predict(test_x);
        Ok(loss_fn(test_labels, &scores, weights))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outer_thread_count_matches_formula() {
        assert_eq!(outer_thread_count(4), 4);
        assert_eq!(outer_thread_count(8), 8);
        assert_eq!(outer_thread_count(32), (8.0_f64 * 32.0).sqrt().round() as usize);
    }

    #[test]
    fn inner_thread_count_sums_to_total() {
        let total = 10;
        let outer = 3;
        let sum: usize = (0..outer).map(|i| inner_thread_count(total, outer, i)).sum();
        assert_eq!(sum, total);
    }

    #[test]
    fn cost_sorted_indices_is_descending() {
        let opts = vec![
            Options::builder().iteration_count(1),
            Options::builder().iteration_count(100),
            Options::builder().iteration_count(50),
        ];
        let order = cost_sorted_indices(&opts);
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn parallel_train_matches_sequential_results() {
        let x = Matrix::from_column_major(vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0], 6, 1).unwrap();
        let labels = [0u8, 0, 0, 1, 1, 1];
        let trainer = BoostTrainer::new(&x, &labels, None, None).unwrap();
        let opts = vec![
            Options::builder().iteration_count(3).max_tree_depth(1).unwrap(),
            Options::builder().iteration_count(5).max_tree_depth(1).unwrap(),
        ];
        let preds = parallel_train(&trainer, &opts).unwrap();
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[0].bases.len(), 3);
        assert_eq!(preds[1].bases.len(), 5);
    }

    #[test]
    fn parallel_train_and_predict_returns_one_column_per_option() {
        let x = Matrix::from_column_major(vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0], 6, 1).unwrap();
        let labels = [0u8, 0, 0, 1, 1, 1];
        let trainer = BoostTrainer::new(&x, &labels, None, None).unwrap();
        let opts = vec![Options::builder().iteration_count(2).max_tree_depth(1).unwrap()];
        let preds = parallel_train_and_predict(&trainer, &opts, &x).unwrap();
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].len(), 6);
    }

    struct AlwaysInterrupt;
    impl InterruptHandle for AlwaysInterrupt {
        fn is_interrupted(&self) -> bool {
            true
        }
    }

    #[test]
    fn interrupt_aborts_before_any_fit() {
        let x = Matrix::from_column_major(vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0], 6, 1).unwrap();
        let labels = [0u8, 0, 0, 1, 1, 1];
        let trainer = BoostTrainer::new(&x, &labels, None, None).unwrap();
        let opts = vec![Options::builder().iteration_count(2).max_tree_depth(1).unwrap()];
        let err = parallel_train_with_interrupt(&trainer, &opts, &AlwaysInterrupt).unwrap_err();
        assert!(matches!(err, Error::Interrupted));
    }
}
