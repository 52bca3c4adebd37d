use kdpp_base::{algorithm::Algorithm, perf_counters, types::Point};
use log::info;
use rand::prelude::*;
use rand_xorshift::XorShiftRng;
use std::time::{Duration, Instant};

use crate::{check_inputs, Selection, SequentialAlgorithm};

/// Baseline picking a uniformly random subset, regardless of quality and
/// diversity.
pub struct RandomSubset {
    pub seed: u64,
    profile: Option<(Duration, Duration)>,
    counters: Option<(u64, u64)>,
}

impl RandomSubset {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            profile: None,
            counters: None,
        }
    }
}

impl Algorithm for RandomSubset {
    fn version(&self) -> u32 {
        1u32
    }

    fn name(&self) -> String {
        String::from("Random")
    }

    fn parameters(&self) -> String {
        format!(r#"{{ "seed": {} }}"#, self.seed)
    }

    fn time_profile(&self) -> Option<(Duration, Duration)> {
        self.profile
    }

    fn counters(&self) -> Option<(u64, u64)> {
        self.counters
    }
}

impl<T: Point + Clone> SequentialAlgorithm<T> for RandomSubset {
    fn sequential_run(
        &mut self,
        dataset: &[T],
        quality: Option<&[f64]>,
        subset_size: usize,
    ) -> anyhow::Result<Selection<T>> {
        perf_counters::reset();
        let start = Instant::now();
        let mut rng = XorShiftRng::seed_from_u64(self.seed);
        let sol = random_subset(dataset, quality, subset_size, &mut rng)?;
        let elapsed = start.elapsed();
        info!("picked {} random points in {:?}", sol.len(), elapsed);
        self.profile.replace((Duration::from_secs(0), elapsed));
        self.counters.replace(perf_counters::take().into());
        Ok(sol)
    }
}

fn random_subset<T: Point + Clone, R: Rng + ?Sized>(
    points: &[T],
    quality: Option<&[f64]>,
    subset_size: usize,
    rng: &mut R,
) -> kdpp_base::error::Result<Selection<T>> {
    check_inputs(points, quality, subset_size)?;
    if points.len() <= subset_size {
        return Ok(Selection::whole(points));
    }
    let indices = rand::seq::index::sample(rng, points.len(), subset_size).into_vec();
    Ok(Selection::from_indices(points, indices))
}
