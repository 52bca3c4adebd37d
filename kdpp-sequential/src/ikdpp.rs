//! (Truncated) incremental k-DPP.
//!
//! Greedy MAP approximation of a k-DPP: at each step, add the point that
//! maximizes the determinant of the (quality augmented) Gram matrix of
//! the selection. The determinant and inverse of the Gram matrix are
//! carried along and updated in `O(k^2)` per step, see
//! [`kdpp_base::linalg`].
//!
//! The first point is drawn uniformly at random. It only bootstraps the
//! recursion and is dropped from the result: to return `k` points the
//! loop runs `k + 1` times.
//!
//! On pools that are numerically saturated (duplicates, or more points than
//! the kernel can tell apart) a step may find no candidate whose Schur
//! complement clears [`kdpp_base::linalg::SINGULAR_TOLERANCE`]. The
//! candidate with the largest Schur complement is picked anyway, but it
//! does not enter the Gram matrix, which stays well conditioned. Only a
//! step in which no candidate gets a finite score fails.
use crate::{check_inputs, diagonal, Selection, SequentialAlgorithm};
use anyhow::Context;
use kdpp_base::{
    algorithm::Algorithm,
    error::{Result, SelectionError},
    kernel::{Hyperparameters, Kernel, SquaredExponential},
    linalg::{is_singular, IncrementalGram},
    perf_counters,
    types::{Point, Vector},
};
use log::{debug, info};
use nalgebra::DVector;
use rand::prelude::*;
use rand_xorshift::XorShiftRng;
use rayon::prelude::*;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KDppParams {
    pub subset_size: usize,
    /// Maximum number of candidates scored at each step. When `None`,
    /// all the remaining points are scored.
    pub truncation: Option<usize>,
    /// Score the candidates of each step on the rayon thread pool.
    pub parallel: bool,
}

impl KDppParams {
    pub fn new(subset_size: usize) -> Self {
        Self {
            subset_size,
            truncation: None,
            parallel: false,
        }
    }

    pub fn with_truncation(self, truncation: usize) -> Self {
        Self {
            truncation: Some(truncation),
            ..self
        }
    }

    pub fn with_parallel(self, parallel: bool) -> Self {
        Self { parallel, ..self }
    }
}

pub struct IncrementalKDpp<K> {
    kernel: K,
    truncation: Option<usize>,
    parallel: bool,
    seed: u64,
    profile: Option<(Duration, Duration)>,
    counters: Option<(u64, u64)>,
}

impl<K> IncrementalKDpp<K> {
    pub fn new(kernel: K, truncation: Option<usize>, parallel: bool, seed: u64) -> Self {
        Self {
            kernel,
            truncation,
            parallel,
            seed,
            profile: None,
            counters: None,
        }
    }
}

impl<K> Algorithm for IncrementalKDpp<K> {
    fn version(&self) -> u32 {
        1
    }

    fn name(&self) -> String {
        String::from("IncrementalKDpp")
    }

    fn parameters(&self) -> String {
        format!(
            r#"{{ "seed": {}, "truncation": {}, "parallel": {} }}"#,
            self.seed,
            self.truncation
                .map_or_else(|| String::from("null"), |t| t.to_string()),
            self.parallel
        )
    }

    fn time_profile(&self) -> Option<(Duration, Duration)> {
        self.profile
    }

    fn counters(&self) -> Option<(u64, u64)> {
        self.counters
    }
}

impl<T: Point + Clone + Sync, K: Kernel<T>> SequentialAlgorithm<T> for IncrementalKDpp<K> {
    fn sequential_run(
        &mut self,
        dataset: &[T],
        quality: Option<&[f64]>,
        subset_size: usize,
    ) -> anyhow::Result<Selection<T>> {
        // Discard counts accumulated outside of this run
        perf_counters::reset();

        let params = KDppParams {
            subset_size,
            truncation: self.truncation,
            parallel: self.parallel,
        };
        let mut rng = XorShiftRng::seed_from_u64(self.seed);
        let start = Instant::now();
        let selection = ikdpp(dataset, quality, &params, &self.kernel, &mut rng)
            .with_context(|| format!("selecting {} out of {} points", subset_size, dataset.len()))?;
        let elapsed = start.elapsed();
        info!(
            "selected {} points with kernel {} in {:?}",
            selection.len(),
            self.kernel.parameters(),
            elapsed
        );

        self.profile.replace((Duration::from_secs(0), elapsed));
        self.counters.replace(perf_counters::take().into());
        Ok(selection)
    }
}

/// Squared-exponential incremental k-DPP on plain vectors.
pub fn select_diverse_subset<R: Rng + ?Sized>(
    points: &[Vector],
    quality: Option<&[f64]>,
    subset_size: usize,
    truncation_limit: Option<usize>,
    hyperparameters: Hyperparameters,
    rng: &mut R,
) -> Result<Selection<Vector>> {
    let kernel = SquaredExponential::new(hyperparameters)?;
    let params = KDppParams {
        subset_size,
        truncation: truncation_limit,
        parallel: false,
    };
    ikdpp(points, quality, &params, &kernel, rng)
}

/// Selects `params.subset_size` diverse points out of `points`.
///
/// If the pool has no more than `subset_size` points it is returned
/// whole, without drawing from `rng`.
pub fn ikdpp<T, K, R>(
    points: &[T],
    quality: Option<&[f64]>,
    params: &KDppParams,
    kernel: &K,
    rng: &mut R,
) -> Result<Selection<T>>
where
    T: Point + Clone + Sync,
    K: Kernel<T>,
    R: Rng + ?Sized,
{
    check_inputs(points, quality, params.subset_size)?;
    if params.truncation == Some(0) {
        return Err(SelectionError::InvalidArgument(
            "the truncation limit must be positive".to_owned(),
        ));
    }

    let n = points.len();
    if n <= params.subset_size {
        debug!("pool of {} points, returning all of them", n);
        return Ok(Selection::whole(points));
    }

    let seed = rng.gen_range(0..n);
    let mut state = SelectionState::new(seed, diagonal(quality, seed), n);
    debug!("seed point {}", seed);

    for step in 1..=params.subset_size {
        let candidates = state.candidates(params.truncation, rng);
        let score = |&i: &usize| state.score(points, quality, kernel, i);
        let winner = if params.parallel {
            candidates.par_iter().filter_map(score).reduce_with(Scored::best)
        } else {
            candidates.iter().filter_map(score).reduce(Scored::best)
        };
        let singular = SelectionError::SingularUpdate {
            step,
            candidates: candidates.len(),
        };
        let winner = winner.ok_or_else(|| singular.clone())?;

        if winner.saturated {
            state.select(winner.index, false);
            debug!(
                "step {}: no candidate out of {} extends the Gram matrix, picked {}",
                step,
                candidates.len(),
                winner.index
            );
        } else {
            let b = state.kernel_row(points, kernel, winner.index);
            state
                .gram
                .push(&b, diagonal(quality, winner.index))
                .map_err(|_| singular)?;
            state.select(winner.index, true);
            debug!(
                "step {}: picked {} out of {} candidates, determinant {}",
                step,
                winner.index,
                candidates.len(),
                state.gram.determinant()
            );
        }
    }

    let determinant = if state.basis.len() == state.selected.len() {
        state.gram.determinant()
    } else {
        0.0
    };
    let indices = state.selected.split_off(1);
    Ok(Selection {
        seed: Some(seed),
        determinant: Some(determinant),
        ..Selection::from_indices(points, indices)
    })
}

/// A candidate and the Schur complement of appending it to the Gram
/// matrix. Within a step the appended determinant is the current one times
/// the Schur complement, so both rank candidates the same way.
#[derive(Debug, Clone, Copy)]
struct Scored {
    index: usize,
    schur: f64,
    /// The Schur complement is within tolerance of zero.
    saturated: bool,
}

impl Scored {
    fn beats(&self, other: &Self) -> bool {
        if self.saturated != other.saturated {
            return !self.saturated;
        }
        self.schur > other.schur || (self.schur == other.schur && self.index < other.index)
    }

    /// Non-saturated candidates first, then the largest Schur complement,
    /// ties going to the smallest index, so that the outcome does not
    /// depend on the order of the reduction.
    fn best(a: Self, b: Self) -> Self {
        if b.beats(&a) {
            b
        } else {
            a
        }
    }
}

struct SelectionState {
    /// In selection order, the seed first.
    selected: Vec<usize>,
    /// The picks spanning the Gram matrix, in its row order.
    basis: Vec<usize>,
    /// Sorted.
    remaining: Vec<usize>,
    gram: IncrementalGram,
}

impl SelectionState {
    fn new(seed: usize, seed_diagonal: f64, n: usize) -> Self {
        Self {
            selected: vec![seed],
            basis: vec![seed],
            remaining: (0..n).filter(|&i| i != seed).collect(),
            gram: IncrementalGram::new(seed_diagonal),
        }
    }

    /// The candidates of the next step in increasing index order: all the
    /// remaining points, or a uniform sample of `truncation` of them.
    fn candidates<R: Rng + ?Sized>(&self, truncation: Option<usize>, rng: &mut R) -> Vec<usize> {
        match truncation {
            Some(limit) if limit < self.remaining.len() => {
                let mut positions =
                    rand::seq::index::sample(rng, self.remaining.len(), limit).into_vec();
                positions.sort_unstable();
                positions.into_iter().map(|p| self.remaining[p]).collect()
            }
            _ => self.remaining.clone(),
        }
    }

    fn kernel_row<T, K: Kernel<T>>(&self, points: &[T], kernel: &K, candidate: usize) -> DVector<f64> {
        DVector::from_iterator(
            self.basis.len(),
            self.basis
                .iter()
                .map(|&s| kernel.similarity(&points[s], &points[candidate])),
        )
    }

    /// `None` if the Schur complement of `candidate` is not finite.
    fn score<T, K: Kernel<T>>(
        &self,
        points: &[T],
        quality: Option<&[f64]>,
        kernel: &K,
        candidate: usize,
    ) -> Option<Scored> {
        let c = diagonal(quality, candidate);
        let schur = self
            .gram
            .schur_complement(&self.kernel_row(points, kernel, candidate), c);
        if schur.is_finite() {
            Some(Scored {
                index: candidate,
                schur,
                saturated: is_singular(schur, c),
            })
        } else {
            None
        }
    }

    fn select(&mut self, index: usize, extends_gram: bool) {
        self.remaining.retain(|&i| i != index);
        self.selected.push(index);
        if extends_gram {
            self.basis.push(index);
        }
    }
}
