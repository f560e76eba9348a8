//! Incremental Cholesky factorization of the active-set Gram matrix.
//!
//! The path algorithm adds and removes one predictor per iteration, so the
//! factor of `X_A' X_A` is maintained by rank-1 update and downdate rather
//! than refactorized from scratch. Entries are indexed by active-set
//! *position*, not by design-matrix column: removal shrinks the arena in
//! place and later positions shift down by one, mirroring the caller's
//! active-set vector.

use ndarray::{Array1, Array2, ArrayView1, s};
use thiserror::Error;

/// A candidate column whose rank-1 update would break positive definiteness.
///
/// Recoverable: the caller skips the column as an entry candidate for the
/// current step and asks for the next one.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "Candidate column is numerically dependent on the active set: new pivot {pivot:.3e} is below the tolerance floor {floor:.3e}."
)]
pub struct SingularUpdateError {
    pub pivot: f64,
    pub floor: f64,
}

/// Lower-triangular Cholesky factor of the active sub-Gram matrix.
#[derive(Debug)]
pub struct ActiveSetFactor {
    /// Backing arena; only the top-left `len` by `len` block is meaningful.
    l: Array2<f64>,
    len: usize,
    tolerance: f64,
}

impl ActiveSetFactor {
    pub fn new(capacity: usize, tolerance: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            l: Array2::zeros((capacity, capacity)),
            len: 0,
            tolerance,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Extends the factor by one active position.
    ///
    /// `gram_cross` holds the entering column's inner products with the
    /// current active columns in active-set order; `gram_diag` is its squared
    /// norm. Fails without mutating anything when the new pivot is not
    /// positive within tolerance (near-duplicate or collinear candidate).
    pub fn add(
        &mut self,
        gram_cross: ArrayView1<f64>,
        gram_diag: f64,
    ) -> Result<(), SingularUpdateError> {
        debug_assert_eq!(gram_cross.len(), self.len);
        let k = self.len;
        // Forward-solve L w = gram_cross for the new off-diagonal row.
        let mut row = Array1::zeros(k + 1);
        for i in 0..k {
            let mut sum = gram_cross[i];
            for j in 0..i {
                sum -= self.l[(i, j)] * row[j];
            }
            row[i] = sum / self.l[(i, i)];
        }
        let mut squared = gram_diag;
        for j in 0..k {
            squared -= row[j] * row[j];
        }
        // The pivot floor is relative to the column's own scale so that a
        // uniformly rescaled design makes identical accept/reject decisions.
        let floor = self.tolerance * gram_diag.max(1.0);
        if !(squared > floor) {
            return Err(SingularUpdateError {
                pivot: squared,
                floor,
            });
        }
        row[k] = squared.sqrt();
        self.reserve(k + 1);
        for j in 0..=k {
            self.l[(k, j)] = row[j];
        }
        self.len = k + 1;
        Ok(())
    }

    /// Removes one active position and restores triangularity with Givens
    /// rotations applied to the trailing block. A downdate, never a
    /// refactorization.
    pub fn remove(&mut self, position: usize) {
        assert!(position < self.len, "remove position out of range");
        let old_len = self.len;
        // Drop the removed row; rows below shift up keeping every column.
        for r in position..old_len - 1 {
            for c in 0..=r + 1 {
                self.l[(r, c)] = self.l[(r + 1, c)];
            }
        }
        self.len = old_len - 1;
        // Each shifted row carries one entry past its diagonal; rotate each
        // one away, updating the rows underneath.
        for i in position..self.len {
            let a = self.l[(i, i)];
            let b = self.l[(i, i + 1)];
            let r = a.hypot(b);
            if r == 0.0 {
                continue;
            }
            let (cos, sin) = (a / r, b / r);
            self.l[(i, i)] = r;
            self.l[(i, i + 1)] = 0.0;
            for j in i + 1..self.len {
                let t0 = self.l[(j, i)];
                let t1 = self.l[(j, i + 1)];
                self.l[(j, i)] = cos * t0 + sin * t1;
                self.l[(j, i + 1)] = cos * t1 - sin * t0;
            }
        }
    }

    /// Solves `(L L') x = rhs` over the current active positions by forward
    /// and back substitution.
    pub fn solve(&self, rhs: ArrayView1<f64>) -> Array1<f64> {
        debug_assert_eq!(rhs.len(), self.len);
        let n = self.len;
        let mut z = Array1::zeros(n);
        for i in 0..n {
            let mut sum = rhs[i];
            for j in 0..i {
                sum -= self.l[(i, j)] * z[j];
            }
            z[i] = sum / self.l[(i, i)];
        }
        let mut x = Array1::zeros(n);
        for i in (0..n).rev() {
            let mut sum = z[i];
            for j in i + 1..n {
                sum -= self.l[(j, i)] * x[j];
            }
            x[i] = sum / self.l[(i, i)];
        }
        x
    }

    fn reserve(&mut self, needed: usize) {
        let capacity = self.l.nrows();
        if needed <= capacity {
            return;
        }
        let grown_capacity = (capacity * 2).max(needed);
        let mut grown = Array2::zeros((grown_capacity, grown_capacity));
        grown
            .slice_mut(s![..self.len, ..self.len])
            .assign(&self.l.slice(s![..self.len, ..self.len]));
        self.l = grown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    /// Reconstructs the Gram matrix the factor currently represents.
    fn reconstruct(factor: &ActiveSetFactor) -> Array2<f64> {
        let n = factor.len();
        let mut gram = Array2::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                let mut sum = 0.0;
                for k in 0..n {
                    sum += factor.l[(i, k)] * factor.l[(j, k)];
                }
                gram[(i, j)] = sum;
            }
        }
        gram
    }

    fn spd_example() -> Array2<f64> {
        // Gram matrix of three well-separated columns.
        array![[4.0, 2.0, 0.6], [2.0, 5.0, 1.0], [0.6, 1.0, 3.0]]
    }

    fn build_factor(gram: &Array2<f64>) -> ActiveSetFactor {
        let mut factor = ActiveSetFactor::new(2, 1e-12);
        for k in 0..gram.nrows() {
            let cross = gram.slice(s![k, ..k]).to_owned();
            factor.add(cross.view(), gram[(k, k)]).unwrap();
        }
        factor
    }

    #[test]
    fn add_reproduces_dense_cholesky() {
        let gram = spd_example();
        let factor = build_factor(&gram);
        assert_eq!(factor.len(), 3);
        let rebuilt = reconstruct(&factor);
        for i in 0..3 {
            for j in 0..3 {
                assert_abs_diff_eq!(rebuilt[(i, j)], gram[(i, j)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn solve_matches_hand_checked_system() {
        let gram = spd_example();
        let factor = build_factor(&gram);
        let rhs = array![1.0, -2.0, 0.5];
        let solution = factor.solve(rhs.view());
        let check = gram.dot(&solution);
        for i in 0..3 {
            assert_abs_diff_eq!(check[i], rhs[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn remove_middle_position_matches_fresh_factorization() {
        let gram = spd_example();
        let mut factor = build_factor(&gram);
        factor.remove(1);
        assert_eq!(factor.len(), 2);
        let rebuilt = reconstruct(&factor);
        // Expected: the Gram matrix with row/column 1 deleted.
        let expected = array![[4.0, 0.6], [0.6, 3.0]];
        for i in 0..2 {
            for j in 0..2 {
                assert_abs_diff_eq!(rebuilt[(i, j)], expected[(i, j)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn remove_then_add_keeps_the_factor_usable() {
        let gram = spd_example();
        let mut factor = build_factor(&gram);
        factor.remove(0);
        // Re-extend with a column correlated to the two survivors.
        let cross = array![1.0, 0.5];
        factor.add(cross.view(), 2.0).unwrap();
        assert_eq!(factor.len(), 3);
        let rebuilt = reconstruct(&factor);
        let expected = array![[5.0, 1.0, 1.0], [1.0, 3.0, 0.5], [1.0, 0.5, 2.0]];
        for i in 0..3 {
            for j in 0..3 {
                assert_abs_diff_eq!(rebuilt[(i, j)], expected[(i, j)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn duplicate_column_is_rejected_without_mutation() {
        let mut factor = ActiveSetFactor::new(2, 1e-12);
        factor.add(Array1::zeros(0).view(), 1.0).unwrap();
        // A second copy of the same unit column: cross product 1, norm 1.
        let err = factor.add(array![1.0].view(), 1.0).unwrap_err();
        assert!(err.pivot <= err.floor);
        assert_eq!(factor.len(), 1);
        // The factor is still extendable with an independent column.
        factor.add(array![0.0].view(), 1.0).unwrap();
        assert_eq!(factor.len(), 2);
    }

    #[test]
    fn capacity_growth_preserves_entries() {
        let mut factor = ActiveSetFactor::new(1, 1e-12);
        let gram = spd_example();
        for k in 0..3 {
            let cross = gram.slice(s![k, ..k]).to_owned();
            factor.add(cross.view(), gram[(k, k)]).unwrap();
        }
        let rebuilt = reconstruct(&factor);
        assert_abs_diff_eq!(rebuilt[(2, 0)], gram[(2, 0)], epsilon = 1e-12);
    }
}
