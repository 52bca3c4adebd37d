use kdpp_base::{
    algorithm::Algorithm,
    error::{Result, SelectionError},
    kernel::check_dimensions,
    types::Point,
};

pub mod ikdpp;
pub mod random;

pub trait SequentialAlgorithm<T: Point + Clone>: Algorithm {
    fn sequential_run(
        &mut self,
        dataset: &[T],
        quality: Option<&[f64]>,
        subset_size: usize,
    ) -> anyhow::Result<Selection<T>>;
}

/// A subset of a candidate pool, in the order its points were picked.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection<T> {
    pub indices: Vec<usize>,
    pub points: Vec<T>,
    /// The first, uniformly random, pick of the incremental k-DPP. It is
    /// not part of `indices`.
    pub seed: Option<usize>,
    /// Determinant of the augmented Gram matrix of all the picks, seed
    /// included, as maintained during the selection. Zero once a pick could
    /// not extend the Gram matrix.
    pub determinant: Option<f64>,
}

impl<T: Clone> Selection<T> {
    /// The entire pool, in input order.
    pub fn whole(points: &[T]) -> Self {
        Self {
            indices: (0..points.len()).collect(),
            points: points.to_vec(),
            seed: None,
            determinant: None,
        }
    }

    pub fn from_indices(points: &[T], indices: Vec<usize>) -> Self {
        Self {
            points: indices.iter().map(|&i| points[i].clone()).collect(),
            indices,
            seed: None,
            determinant: None,
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Diagonal term of the augmented Gram matrix for point `i`.
#[inline]
pub fn diagonal(quality: Option<&[f64]>, i: usize) -> f64 {
    quality.map_or(1.0, |q| 1.0 + q[i])
}

/// Rejects inputs that violate the contract of the selectors, before any
/// state is built.
pub fn check_inputs<T: Point>(
    points: &[T],
    quality: Option<&[f64]>,
    subset_size: usize,
) -> Result<()> {
    if points.is_empty() {
        return Err(SelectionError::InvalidArgument(
            "the point set is empty".to_owned(),
        ));
    }
    if subset_size == 0 {
        return Err(SelectionError::InvalidArgument(
            "the subset size must be positive".to_owned(),
        ));
    }
    check_dimensions(points)?;
    if let Some(quality) = quality {
        if quality.len() != points.len() {
            return Err(SelectionError::InvalidArgument(format!(
                "{} quality values for {} points",
                quality.len(),
                points.len()
            )));
        }
        if let Some((i, q)) = quality
            .iter()
            .enumerate()
            .find(|(_, q)| !(q.is_finite() && **q >= 0.0))
        {
            return Err(SelectionError::InvalidArgument(format!(
                "quality of point {} is {}, expected a non-negative number",
                i, q
            )));
        }
    }
    Ok(())
}
