//! Incremental determinant and inverse of a growing Gram matrix.
//!
//! Appending a point to a selection turns the Gram matrix `A` into the
//! block matrix `[[A, b], [b^T, c]]`. Both its determinant and its inverse
//! follow from `det(A)`, `A^-1` and the Schur complement `c - b^T A^-1 b`,
//! in `O(k^2)` instead of the `O(k^3)` of a fresh factorization.

use crate::error::{Result, SelectionError};
use crate::kernel::Kernel;
use crate::perf_counters;
use nalgebra::{DMatrix, DVector};

/// Schur complements at or below this fraction of the diagonal term are
/// treated as zero.
pub const SINGULAR_TOLERANCE: f64 = 1e-12;

pub fn schur_complement(inv_a: &DMatrix<f64>, b: &DVector<f64>, c: f64) -> f64 {
    c - b.dot(&(inv_a * b))
}

#[inline]
pub fn is_singular(schur: f64, c: f64) -> bool {
    !schur.is_finite() || schur <= SINGULAR_TOLERANCE * c.abs()
}

/// Determinant of `[[A, b], [b^T, c]]` given `det(A)` and `A^-1`.
///
/// The result is not checked: a non-positive value means the appended
/// matrix is not positive definite.
pub fn det_inc(det_a: f64, inv_a: &DMatrix<f64>, b: &DVector<f64>, c: f64) -> f64 {
    det_a * schur_complement(inv_a, b, c)
}

/// Inverse of `[[A, b], [b^T, c]]` given the inverse of the symmetric matrix `A`.
///
/// Fails with `SingularUpdate` when the Schur complement vanishes, `step`
/// being the order of `A`.
pub fn inv_inc(inv_a: &DMatrix<f64>, b: &DVector<f64>, c: f64) -> Result<DMatrix<f64>> {
    extend(inv_a, b, c).map(|(inverse, _)| inverse)
}

/// The inverse of the bordered matrix along with its Schur complement.
fn extend(inv_a: &DMatrix<f64>, b: &DVector<f64>, c: f64) -> Result<(DMatrix<f64>, f64)> {
    let n = inv_a.nrows();
    let ab = inv_a * b;
    let k = c - b.dot(&ab);
    if is_singular(k, c) {
        return Err(SelectionError::SingularUpdate {
            step: n,
            candidates: 1,
        });
    }
    perf_counters::inc_update_count();
    let inverse = DMatrix::from_fn(n + 1, n + 1, |i, j| match (i < n, j < n) {
        (true, true) => inv_a[(i, j)] + ab[i] * ab[j] / k,
        (true, false) => -ab[i] / k,
        (false, true) => -ab[j] / k,
        (false, false) => 1.0 / k,
    });
    Ok((inverse, k))
}

/// Determinant and inverse of the Gram matrix of a growing selection.
#[derive(Debug, Clone)]
pub struct IncrementalGram {
    determinant: f64,
    inverse: DMatrix<f64>,
}

impl IncrementalGram {
    /// The Gram matrix of a single point, whose only entry is `diagonal`.
    pub fn new(diagonal: f64) -> Self {
        Self {
            determinant: diagonal,
            inverse: DMatrix::from_element(1, 1, 1.0 / diagonal),
        }
    }

    pub fn len(&self) -> usize {
        self.inverse.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn determinant(&self) -> f64 {
        self.determinant
    }

    pub fn inverse(&self) -> &DMatrix<f64> {
        &self.inverse
    }

    /// The determinant the matrix would have after appending `(b, c)`.
    pub fn appended_determinant(&self, b: &DVector<f64>, c: f64) -> f64 {
        det_inc(self.determinant, &self.inverse, b, c)
    }

    /// Schur complement of appending `(b, c)`, the factor by which the
    /// determinant would grow.
    pub fn schur_complement(&self, b: &DVector<f64>, c: f64) -> f64 {
        schur_complement(&self.inverse, b, c)
    }

    /// Appends `(b, c)`. A failed push leaves the matrix untouched.
    pub fn push(&mut self, b: &DVector<f64>, c: f64) -> Result<()> {
        let (inverse, schur) = extend(&self.inverse, b, c)?;
        self.determinant *= schur;
        self.inverse = inverse;
        Ok(())
    }
}

/// The Gram matrix of `points` with `diagonal(i)` in place of the
/// self-similarity of the i-th point.
pub fn gram_matrix<T, K: Kernel<T>, F: Fn(usize) -> f64>(
    kernel: &K,
    points: &[&T],
    diagonal: F,
) -> DMatrix<f64> {
    let n = points.len();
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            diagonal(i)
        } else {
            kernel.similarity(points[i], points[j])
        }
    })
}

/// Natural logarithm of the determinant of a symmetric positive definite
/// matrix, or `None` if the matrix is not positive definite.
pub fn log_determinant(matrix: &DMatrix<f64>) -> Option<f64> {
    let chol = matrix.clone().cholesky()?;
    Some(
        chol.l()
            .diagonal()
            .iter()
            .map(|x| 2.0 * x.ln())
            .sum::<f64>(),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kernel::{Hyperparameters, SquaredExponential};
    use crate::types::Vector;
    use rand::prelude::*;
    use rand_xorshift::XorShiftRng;

    fn relative_error(a: f64, b: f64) -> f64 {
        (a - b).abs() / b.abs().max(f64::MIN_POSITIVE)
    }

    fn random_points(rng: &mut XorShiftRng, n: usize, dim: usize) -> Vec<Vector> {
        (0..n)
            .map(|_| Vector::new((0..dim).map(|_| rng.gen_range(-3.0..3.0)).collect()))
            .collect()
    }

    #[test]
    fn base_case() {
        let gram = IncrementalGram::new(1.5);
        assert_eq!(gram.len(), 1);
        assert_eq!(gram.determinant(), 1.5);
        assert_eq!(gram.inverse()[(0, 0)], 1.0 / 1.5);
    }

    #[test]
    fn two_by_two() {
        // [[2, 1], [1, 3]] has determinant 5 and inverse [[3, -1], [-1, 2]] / 5
        let mut gram = IncrementalGram::new(2.0);
        let b = DVector::from_vec(vec![1.0]);
        assert!((gram.appended_determinant(&b, 3.0) - 5.0).abs() < 1e-12);
        gram.push(&b, 3.0).unwrap();
        let expected = DMatrix::from_row_slice(2, 2, &[0.6, -0.2, -0.2, 0.4]);
        assert!((gram.inverse() - expected).abs().max() < 1e-12);
        assert!((gram.determinant() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn singular_update_is_rejected() {
        let mut gram = IncrementalGram::new(1.0);
        let b = DVector::from_vec(vec![1.0]);
        assert!(gram.appended_determinant(&b, 1.0).abs() < 1e-15);
        assert_eq!(
            gram.push(&b, 1.0),
            Err(SelectionError::SingularUpdate {
                step: 1,
                candidates: 1
            })
        );
        // A failed push leaves the state untouched
        assert_eq!(gram.len(), 1);
        assert_eq!(gram.determinant(), 1.0);
    }

    #[test]
    fn push_agrees_with_inv_inc() {
        let mut gram = IncrementalGram::new(2.0);
        gram.push(&DVector::from_vec(vec![0.5]), 1.5).unwrap();
        let b = DVector::from_vec(vec![0.25, -0.5]);
        let schur = gram.schur_complement(&b, 3.0);
        let inverse = inv_inc(gram.inverse(), &b, 3.0).unwrap();
        let before = gram.determinant();
        gram.push(&b, 3.0).unwrap();
        assert_eq!(gram.inverse(), &inverse);
        assert!((gram.determinant() - before * schur).abs() < 1e-12);

        let duplicate = DVector::from_vec(vec![2.0, 0.5, 0.25]);
        assert_eq!(
            inv_inc(gram.inverse(), &duplicate, 2.0),
            Err(SelectionError::SingularUpdate {
                step: 3,
                candidates: 1
            })
        );
    }

    #[test]
    fn incremental_matches_direct() {
        let mut rng = XorShiftRng::seed_from_u64(1234);
        let kernel = SquaredExponential::new(Hyperparameters::new(1.0, 1.5).unwrap()).unwrap();
        for dim in 1..4 {
            let points = random_points(&mut rng, 20, dim);
            let quality: Vec<f64> = (0..20).map(|_| rng.gen_range(0.0..2.0)).collect();
            let diag = |i: usize| 1.0 + quality[i];

            let mut gram = IncrementalGram::new(diag(0));
            for m in 1..points.len() {
                let b = DVector::from_fn(m, |j, _| kernel.similarity(&points[j], &points[m]));
                gram.push(&b, diag(m)).unwrap();

                let refs: Vec<&Vector> = points[..=m].iter().collect();
                let direct = gram_matrix(&kernel, &refs, diag);
                let det = direct.clone().determinant();
                assert!(
                    relative_error(gram.determinant(), det) < 1e-6,
                    "determinant {} vs direct {}",
                    gram.determinant(),
                    det
                );
                let inverse = direct.clone().try_inverse().unwrap();
                let scale = inverse.abs().max();
                assert!((gram.inverse() - &inverse).abs().max() / scale < 1e-6);
                let identity = DMatrix::<f64>::identity(m + 1, m + 1);
                assert!((gram.inverse() * &direct - identity).abs().max() < 1e-6);
            }
        }
    }

    #[test]
    fn log_determinant_of_gram() {
        let kernel = SquaredExponential::new(Hyperparameters::default()).unwrap();
        let points = vec![Vector::new(vec![0.0]), Vector::new(vec![1.0])];
        let refs: Vec<&Vector> = points.iter().collect();
        let gram = gram_matrix(&kernel, &refs, |_| 1.0);
        let expected = (1.0 - (-1.0f64).exp()).ln();
        assert!((log_determinant(&gram).unwrap() - expected).abs() < 1e-12);

        let duplicates = vec![&points[0], &points[0]];
        let singular = gram_matrix(&kernel, &duplicates, |_| 1.0);
        assert!(log_determinant(&singular).map_or(true, |x| x < -20.0));
    }
}
