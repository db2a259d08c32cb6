//! End-to-end scenarios: training through `BoostTrainer`/`TreeTrainer`,
//! persisting through `predictor::format`, and the orchestrator's parallel
//! scheduling, exercised as a user of the crate would use them.

use grovetrain::boost::BoostTrainer;
use grovetrain::matrix::Matrix;
use grovetrain::options::Options;
use grovetrain::orchestrator;
use grovetrain::predictor::{format, BasePredictor, BoostedPredictor, Predictor};

fn separable_data() -> (Matrix, [u8; 6]) {
    let x = Matrix::from_column_major(vec![0.0, 0.1, 0.2, 0.8, 0.9, 1.0], 6, 1).unwrap();
    let labels = [0u8, 0, 0, 1, 1, 1];
    (x, labels)
}

#[test]
fn diagonal_two_class_data_converges_to_a_confident_classifier() {
    let (x, labels) = separable_data();
    let trainer = BoostTrainer::new(&x, &labels, None, None).unwrap();
    let options = Options::builder()
        .iteration_count(20)
        .eta(0.5)
        .unwrap()
        .max_tree_depth(1)
        .unwrap();
    let boosted = trainer.train(&options).unwrap();
    let predictor = Predictor::Boosted(boosted);
    let preds = predictor.predict(&x).unwrap();
    assert!(preds[0] < 0.3, "expected a low probability for a negative sample, got {}", preds[0]);
    assert!(preds[5] > 0.7, "expected a high probability for a positive sample, got {}", preds[5]);
}

#[test]
fn degenerate_feature_with_no_signal_yields_constant_baseline() {
    let x = Matrix::from_column_major(vec![0.25; 4], 4, 1).unwrap();
    let labels = [0u8, 1, 0, 1];
    let trainer = BoostTrainer::new(&x, &labels, None, None).unwrap();
    let options = Options::builder().iteration_count(3).max_tree_depth(2).unwrap();
    let boosted = trainer.train(&options).unwrap();
    for base in &boosted.bases {
        assert!(matches!(base, BasePredictor::Constant(_) | BasePredictor::Zero));
    }
}

#[test]
fn huge_eta_reports_overflow_with_tuning_advice() {
    let (x, labels) = separable_data();
    let trainer = BoostTrainer::new(&x, &labels, None, None).unwrap();
    let options = Options::builder()
        .iteration_count(100)
        .eta(1.0e6)
        .unwrap()
        .gamma(1.0)
        .unwrap();
    let err = trainer.train(&options).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("decrease eta"), "message was: {message}");
}

#[test]
fn save_and_load_round_trips_bytes_and_predictions() {
    let (x, labels) = separable_data();
    let trainer = BoostTrainer::new(&x, &labels, None, None).unwrap();
    let options = Options::builder().iteration_count(4).max_tree_depth(2).unwrap();
    let boosted = trainer.train(&options).unwrap();
    let predictor = Predictor::Boosted(boosted);

    let mut bytes = Vec::new();
    format::save(&predictor, &mut bytes).unwrap();

    let mut bytes2 = Vec::new();
    format::save(&predictor, &mut bytes2).unwrap();
    assert_eq!(bytes, bytes2, "saving the same predictor twice must be byte-identical");

    let loaded = format::load(&mut bytes.as_slice()).unwrap();
    let original_preds = predictor.predict(&x).unwrap();
    let loaded_preds = loaded.predict(&x).unwrap();
    assert_eq!(original_preds, loaded_preds);
}

#[test]
fn full_prune_collapses_deep_trees() {
    let x = Matrix::from_column_major(vec![0.0, 0.25, 0.5, 0.75, 1.0, 0.1, 0.9, 0.4], 8, 1).unwrap();
    let labels = [0u8, 0, 0, 0, 1, 0, 1, 0];
    let trainer = BoostTrainer::new(&x, &labels, None, None).unwrap();
    let options = Options::builder()
        .iteration_count(2)
        .max_tree_depth(4)
        .unwrap()
        .prune_factor(1.0)
        .unwrap();
    let boosted: BoostedPredictor = trainer.train(&options).unwrap();
    for base in &boosted.bases {
        match base {
            BasePredictor::Tree(tree) => assert!(tree.len() <= 3, "expected a heavily pruned tree, got {} nodes", tree.len()),
            BasePredictor::Stump { .. } | BasePredictor::Constant(_) | BasePredictor::Zero => {}
            BasePredictor::Forest(_) => panic!("forest_size is 1, no Forest expected"),
        }
    }
}

#[test]
fn predict_output_length_and_range_hold_for_every_option() {
    let (x, labels) = separable_data();
    let trainer = BoostTrainer::new(&x, &labels, None, None).unwrap();
    let opts = vec![
        Options::builder().iteration_count(3).gamma(1.0).unwrap(),
        Options::builder().iteration_count(3).gamma(0.0).unwrap(),
        Options::builder().iteration_count(3).gamma(0.5).unwrap(),
    ];
    for opt in &opts {
        let boosted = trainer.train(opt).unwrap();
        let preds = Predictor::Boosted(boosted).predict(&x).unwrap();
        assert_eq!(preds.len(), x.n_rows());
        for p in preds {
            assert!((0.0..=1.0).contains(&p));
        }
    }
}

#[test]
fn parallel_train_matches_sequential_training_one_thread_at_a_time() {
    let (x, labels) = separable_data();
    let trainer = BoostTrainer::new(&x, &labels, None, None).unwrap();
    let opts = vec![
        Options::builder().iteration_count(4).max_tree_depth(1).unwrap(),
        Options::builder().iteration_count(6).max_tree_depth(1).unwrap(),
        Options::builder().iteration_count(2).max_tree_depth(1).unwrap(),
    ];

    let sequential: Vec<BoostedPredictor> = opts.iter().map(|o| trainer.train(o).unwrap()).collect();
    let parallel = orchestrator::parallel_train(&trainer, &opts).unwrap();

    assert_eq!(sequential.len(), parallel.len());
    for (s, p) in sequential.iter().zip(parallel.iter()) {
        assert_eq!(s.bases.len(), p.bases.len());
    }
}
