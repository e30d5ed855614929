//! Dense `f32` matrix used for weights, biases, activations and errors
//!
//! Storage is column-major: element `(row, col)` lives at `col * rows + row`.
//! A column therefore holds every output neuron's weight for one input
//! feature, which is the slice the sparse first layer reads per active index.
//! The BZ file format uses the same order, so the codec copies storage as is.

use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: u32,
    cols: u32,
    data: Vec<f32>,
}

impl Matrix {
    /// Zero-filled matrix of shape `rows x cols`.
    pub fn new(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows as usize * cols as usize],
        }
    }

    /// Zero-filled column vector.
    #[inline]
    pub fn vector(len: u32) -> Self {
        Self::new(len, 1)
    }

    /// Wrap existing column-major storage.
    ///
    /// Panics if `data.len() != rows * cols`.
    pub fn from_data(rows: u32, cols: u32, data: Vec<f32>) -> Self {
        assert_eq!(
            data.len(),
            rows as usize * cols as usize,
            "matrix data len {} does not match shape {rows}x{cols}",
            data.len()
        );
        Self { rows, cols, data }
    }

    /// Uniform random entries in `[-bound, bound]`.
    pub fn random<R: Rng + ?Sized>(rows: u32, cols: u32, bound: f32, rng: &mut R) -> Self {
        let mut m = Self::new(rows, cols);
        if bound > 0.0 {
            for v in &mut m.data {
                *v = rng.random_range(-bound..=bound);
            }
        }
        m
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Element count for vectors, row count for matrices.
    ///
    /// Both are `rows`: a vector is stored as `rows x 1`.
    #[inline]
    pub fn size(&self) -> u32 {
        self.rows
    }

    /// Total element count.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn offset(&self, row: u32, col: u32) -> usize {
        debug_assert!(
            row < self.rows && col < self.cols,
            "({row}, {col}) out of bounds for {}x{} matrix",
            self.rows,
            self.cols
        );
        col as usize * self.rows as usize + row as usize
    }

    #[inline]
    pub fn get(&self, row: u32, col: u32) -> f32 {
        self.data[self.offset(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: u32, col: u32, value: f32) {
        let idx = self.offset(row, col);
        self.data[idx] = value;
    }

    /// Zero all entries in place.
    #[inline]
    pub fn reset(&mut self) {
        self.data.fill(0.0);
    }

    #[inline]
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// Contiguous column `col` (length `rows`).
    #[inline]
    pub fn column(&self, col: u32) -> &[f32] {
        assert!(col < self.cols, "column {col} out of range {}", self.cols);
        let start = col as usize * self.rows as usize;
        &self.data[start..start + self.rows as usize]
    }

    #[inline]
    pub fn column_mut(&mut self, col: u32) -> &mut [f32] {
        assert!(col < self.cols, "column {col} out of range {}", self.cols);
        let start = col as usize * self.rows as usize;
        &mut self.data[start..start + self.rows as usize]
    }

    /// Raw storage in column-major order.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_column_major_offsets() {
        let m = Matrix::from_data(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(1, 0), 2.0);
        assert_eq!(m.get(0, 1), 3.0);
        assert_eq!(m.get(1, 2), 6.0);
        assert_eq!(m.column(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_set_and_reset() {
        let mut m = Matrix::new(3, 2);
        m.set(2, 1, 7.5);
        assert_eq!(m.get(2, 1), 7.5);
        assert_eq!(m.as_slice()[5], 7.5);

        let ptr = m.as_slice().as_ptr();
        m.reset();
        assert!(m.as_slice().iter().all(|&v| v == 0.0));
        // 再確保していないこと
        assert_eq!(ptr, m.as_slice().as_ptr());
    }

    #[test]
    fn test_size() {
        assert_eq!(Matrix::vector(5).size(), 5);
        assert_eq!(Matrix::new(4, 9).size(), 4);
        assert_eq!(Matrix::new(4, 9).len(), 36);
    }

    #[test]
    fn test_random_within_bound() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let m = Matrix::random(16, 16, 0.25, &mut rng);
        assert!(m.as_slice().iter().all(|v| v.abs() <= 0.25));
        assert!(m.as_slice().iter().any(|&v| v != 0.0));
    }

    #[test]
    #[should_panic]
    fn test_get_out_of_bounds_panics() {
        let m = Matrix::new(2, 2);
        m.get(0, 2);
    }

    #[test]
    #[should_panic]
    fn test_from_data_shape_mismatch_panics() {
        Matrix::from_data(2, 2, vec![0.0; 3]);
    }
}
