//! Per-parameter gradient accumulators
//!
//! Accumulate-then-flush: `update` adds one sample's contribution to a plain
//! running sum, `apply` folds the sum into the target parameter scaled by the
//! learning rate and clears it. Nothing survives a flush, so there is no
//! optimizer state across batches.

use crate::matrix::Matrix;

/// Default step size used by [`Gradients::apply`] through the network.
pub const DEFAULT_LEARNING_RATE: f32 = 0.01;

/// Gradient sums with the same shape and layout as the target [`Matrix`].
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    rows: u32,
    cols: u32,
    /// Column-major, same offsets as the target matrix.
    sums: Vec<f32>,
}

impl Gradients {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            sums: vec![0.0; rows as usize * cols as usize],
        }
    }

    /// Accumulators shaped like `target`.
    pub fn like(target: &Matrix) -> Self {
        Self::new(target.rows(), target.cols())
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.rows
    }

    #[inline]
    fn offset(&self, row: u32, col: u32) -> usize {
        debug_assert!(row < self.rows && col < self.cols);
        col as usize * self.rows as usize + row as usize
    }

    /// Current running sum at `(row, col)`.
    #[inline]
    pub fn get(&self, row: u32, col: u32) -> f32 {
        self.sums[self.offset(row, col)]
    }

    /// Accumulate one contribution at `(row, col)`.
    #[inline]
    pub fn update(&mut self, row: u32, col: u32, value: f32) {
        let idx = self.offset(row, col);
        self.sums[idx] += value;
    }

    /// Accumulate `values[row]` into every row of column `col`.
    #[inline]
    pub fn update_column(&mut self, col: u32, values: &[f32]) {
        assert!(col < self.cols, "column {col} out of range {}", self.cols);
        debug_assert_eq!(values.len(), self.rows as usize);
        let start = col as usize * self.rows as usize;
        let column = &mut self.sums[start..start + self.rows as usize];
        for (sum, &v) in column.iter_mut().zip(values) {
            *sum += v;
        }
    }

    /// Fold the sums into `target` (`target -= learning_rate * sum`) and clear them.
    pub fn apply(&mut self, target: &mut Matrix, learning_rate: f32) {
        assert_eq!(
            (self.rows, self.cols),
            (target.rows(), target.cols()),
            "gradient shape does not match target matrix"
        );
        for (param, sum) in target.as_mut_slice().iter_mut().zip(self.sums.iter_mut()) {
            if *sum != 0.0 {
                *param -= learning_rate * *sum;
                *sum = 0.0;
            }
        }
    }

    /// Drop accumulated sums without applying them.
    #[inline]
    pub fn reset(&mut self) {
        self.sums.fill(0.0);
    }

    /// Whether every accumulator is back at its neutral value.
    pub fn is_clear(&self) -> bool {
        self.sums.iter().all(|&s| s == 0.0)
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.sums
    }
}
