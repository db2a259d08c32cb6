//! Dense, column-major training/inference matrix of 32-bit reals.
//!
//! Column-major storage matches what the split-scan and presort index want
//! (contiguous access to one feature across all samples); `row` gathers a
//! single sample's features on demand for inference and is not on any hot
//! path.

use crate::error::{Error, Result};

/// Immutable, column-major matrix of `f32`, shape `n_rows x n_cols`.
#[derive(Debug, Clone)]
pub struct Matrix {
    data: Vec<f32>,
    n_rows: usize,
    n_cols: usize,
}

impl Matrix {
    /// Build a matrix from column-major data, validating finiteness.
    pub fn from_column_major(data: Vec<f32>, n_rows: usize, n_cols: usize) -> Result<Self> {
        if n_rows == 0 {
            return Err(Error::invalid_input("matrix has 0 samples"));
        }
        if n_cols == 0 {
            return Err(Error::invalid_input("matrix has 0 variables"));
        }
        if data.len() != n_rows * n_cols {
            return Err(Error::invalid_input(format!(
                "matrix data length {} does not match {} rows x {} cols",
                data.len(),
                n_rows,
                n_cols
            )));
        }
        if !data.iter().all(|v| v.is_finite()) {
            return Err(Error::invalid_input(
                "matrix has values that are infinite or NaN",
            ));
        }
        Ok(Matrix { data, n_rows, n_cols })
    }

    /// Build a matrix from row-major input (the natural shape for most host
    /// bindings), transposing into the column-major storage this crate uses
    /// internally.
    pub fn from_row_major(data: &[f32], n_rows: usize, n_cols: usize) -> Result<Self> {
        if data.len() != n_rows * n_cols {
            return Err(Error::invalid_input(format!(
                "matrix data length {} does not match {} rows x {} cols",
                data.len(),
                n_rows,
                n_cols
            )));
        }
        let mut col_major = vec![0.0f32; data.len()];
        for r in 0..n_rows {
            for c in 0..n_cols {
                col_major[c * n_rows + r] = data[r * n_cols + c];
            }
        }
        Matrix::from_column_major(col_major, n_rows, n_cols)
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// The full column `j`, contiguous in memory.
    #[inline]
    pub fn column(&self, j: usize) -> &[f32] {
        let start = j * self.n_rows;
        &self.data[start..start + self.n_rows]
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[col * self.n_rows + row]
    }

    /// Gather sample `row` into a freshly allocated vector. Not on any hot
    /// path; used for single-row inference and for statistical-test
    /// collaborators that want a row-major view.
    pub fn row(&self, row: usize) -> Vec<f32> {
        (0..self.n_cols).map(|c| self.get(row, c)).collect()
    }
}
