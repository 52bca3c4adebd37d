//! Kernel functions measuring the similarity between points.
//!
//! The selectors only ever see a [`Kernel`], so any positive
//! semi-definite similarity can be plugged in. Two families are provided:
//! the squared-exponential kernel on plain vectors, and its leveraged
//! variant that further scales the similarity by the distance between
//! auxiliary leverage coordinates.

use crate::error::{Result, SelectionError};
use crate::perf_counters;
use crate::types::{LeveragedVector, Point, Vector};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

pub trait Kernel<T: ?Sized>: Sync {
    fn similarity(&self, a: &T, b: &T) -> f64;

    /// The kernel's name and hyperparameters, as a JSON object.
    fn parameters(&self) -> String {
        String::from("{}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub gain: f64,
    pub lengthscale: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            gain: 1.0,
            lengthscale: 1.0,
        }
    }
}

impl Hyperparameters {
    pub fn new(gain: f64, lengthscale: f64) -> Result<Self> {
        let hyp = Self { gain, lengthscale };
        hyp.validate()?;
        Ok(hyp)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.gain.is_finite() && self.gain > 0.0) {
            return Err(SelectionError::InvalidArgument(format!(
                "kernel gain must be positive, got {}",
                self.gain
            )));
        }
        if !(self.lengthscale.is_finite() && self.lengthscale > 0.0) {
            return Err(SelectionError::InvalidArgument(format!(
                "kernel lengthscale must be positive, got {}",
                self.lengthscale
            )));
        }
        Ok(())
    }

    #[inline]
    fn se(&self, squared_distance: f64) -> f64 {
        self.gain * (-squared_distance / (2.0 * self.lengthscale * self.lengthscale)).exp()
    }
}

/// `g * exp(-|a - b|^2 / (2 l^2))`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquaredExponential {
    hyp: Hyperparameters,
}

impl SquaredExponential {
    pub fn new(hyp: Hyperparameters) -> Result<Self> {
        hyp.validate()?;
        Ok(Self { hyp })
    }

    pub fn hyperparameters(&self) -> Hyperparameters {
        self.hyp
    }
}

impl Kernel<Vector> for SquaredExponential {
    fn similarity(&self, a: &Vector, b: &Vector) -> f64 {
        perf_counters::inc_kernel_count();
        self.hyp.se(a.squared_euclidean(b))
    }

    fn parameters(&self) -> String {
        format!(
            r#"{{ "kernel": "se", "gain": {}, "lengthscale": {} }}"#,
            self.hyp.gain, self.hyp.lengthscale
        )
    }
}

/// Squared-exponential similarity of the feature vectors, multiplied by
/// `cos(pi/2 * |la - lb|_1)` of the leverage coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeveragedSquaredExponential {
    hyp: Hyperparameters,
}

impl LeveragedSquaredExponential {
    pub fn new(hyp: Hyperparameters) -> Result<Self> {
        hyp.validate()?;
        Ok(Self { hyp })
    }

    pub fn hyperparameters(&self) -> Hyperparameters {
        self.hyp
    }
}

impl Kernel<LeveragedVector> for LeveragedSquaredExponential {
    fn similarity(&self, a: &LeveragedVector, b: &LeveragedVector) -> f64 {
        perf_counters::inc_kernel_count();
        let leverage = (std::f64::consts::FRAC_PI_2 * a.leverage.cityblock(&b.leverage)).cos();
        self.hyp.se(a.vector.squared_euclidean(&b.vector)) * leverage
    }

    fn parameters(&self) -> String {
        format!(
            r#"{{ "kernel": "levse", "gain": {}, "lengthscale": {} }}"#,
            self.hyp.gain, self.hyp.lengthscale
        )
    }
}

/// Checks that all points agree with the first one on their dimensions.
pub fn check_dimensions<T: Point>(points: &[T]) -> Result<()> {
    if let Some(first) = points.first() {
        check_against(first, points)?;
    }
    Ok(())
}

fn check_against<T: Point>(reference: &T, points: &[T]) -> Result<()> {
    for (index, p) in points.iter().enumerate() {
        if p.dimension() != reference.dimension() {
            return Err(SelectionError::DimensionMismatch {
                index,
                expected: reference.dimension(),
                found: p.dimension(),
            });
        }
        if p.leverage_dimension() != reference.leverage_dimension() {
            return Err(SelectionError::DimensionMismatch {
                index,
                expected: reference.leverage_dimension(),
                found: p.leverage_dimension(),
            });
        }
    }
    Ok(())
}

/// Similarity matrix between two point sets, of shape `|x1| x |x2|`.
///
/// Fails if the points of `x2` do not share the dimensions of the points
/// of `x1`, or if either set is internally inconsistent.
pub fn kernel_matrix<T: Point, K: Kernel<T>>(kernel: &K, x1: &[T], x2: &[T]) -> Result<DMatrix<f64>> {
    check_dimensions(x1)?;
    match x1.first() {
        Some(reference) => check_against(reference, x2)?,
        None => check_dimensions(x2)?,
    }
    Ok(DMatrix::from_fn(x1.len(), x2.len(), |i, j| {
        kernel.similarity(&x1[i], &x2[j])
    }))
}
