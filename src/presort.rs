//! For each feature, the permutation of sample indices sorting that feature
//! ascending, built once at `TreeTrainer` construction and immutable
//! thereafter. Construction is parallelized across features with a thread
//! count capped at `min(max_threads, n_features)`, mirroring
//! `original_source`'s `SortedIndices.h` used by `TreeTrainerImplD`.

use rayon::prelude::*;

use crate::matrix::Matrix;
use crate::narrow::NarrowColumn;

/// The presorted sample-index permutation for every feature in a training
/// matrix.
pub struct PresortIndex {
    columns: Vec<NarrowColumn>,
}

impl PresortIndex {
    /// Build the presort index for `x`, one column per feature, in parallel.
    pub fn build(x: &Matrix) -> Self {
        let n_rows = x.n_rows();
        let columns: Vec<NarrowColumn> = (0..x.n_cols())
            .into_par_iter()
            .map(|j| Self::sort_feature(x.column(j), n_rows))
            .collect();
        PresortIndex { columns }
    }

    fn sort_feature(column: &[f32], n_rows: usize) -> NarrowColumn {
        let mut pairs: Vec<(f32, usize)> = column.iter().copied().zip(0..n_rows).collect();
        pairs.sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).expect("finite feature values"));
        NarrowColumn::from_usize_iter(pairs.into_iter().map(|(_, i)| i))
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    /// Sample indices for feature `j`, ascending by that feature's value.
    pub fn feature(&self, j: usize) -> &NarrowColumn {
        &self.columns[j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presort_is_ascending_per_feature() {
        let x = Matrix::from_column_major(vec![3.0, 1.0, 2.0, 0.0, -5.0, 5.0, 9.0, 1.0], 4, 2)
            .unwrap();
        let presort = PresortIndex::build(&x);
        for j in 0..x.n_cols() {
            let col = presort.feature(j);
            for i in 0..col.len() - 1 {
                let a = x.get(col.get(i), j);
                let b = x.get(col.get(i + 1), j);
                assert!(a <= b, "feature {j} not ascending at {i}: {a} > {b}");
            }
        }
    }

    #[test]
    fn presort_is_a_permutation() {
        let x = Matrix::from_column_major(vec![3.0, 1.0, 2.0, 0.0], 4, 1).unwrap();
        let presort = PresortIndex::build(&x);
        let mut seen: Vec<usize> = presort.feature(0).iter().collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
