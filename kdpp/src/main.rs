mod configuration;
mod reporter;

use anyhow::{Context, Result};
use configuration::*;
use kdpp_base::{
    dataset::{Dataset, Datatype},
    kernel::Kernel,
    linalg::{gram_matrix, log_determinant},
    types::{LeveragedVector, Vector},
};
use kdpp_sequential::{diagonal, Selection};
use log::{info, warn};
use reporter::Reporter;
use serde::Deserialize;
use std::time::Instant;

/// Log-determinant of the augmented Gram matrix of the selected points.
fn log_diversity<V, K: Kernel<V>>(
    kernel: &K,
    selection: &Selection<V>,
    quality: Option<&[f64]>,
) -> Option<f64> {
    let points: Vec<&V> = selection.points.iter().collect();
    let gram = gram_matrix(kernel, &points, |i| diagonal(quality, selection.indices[i]));
    log_determinant(&gram)
}

fn run<V: Configure>(config: &Configuration) -> Result<Option<i64>>
where
    for<'de> V: Deserialize<'de>,
{
    let mut reporter = Reporter::from_config(config.clone())?;
    if let Some(id) = reporter.already_run()? {
        info!("experiment already run with id {}, skipping", id);
        return Ok(Some(id));
    }

    let mut algorithm = V::configure_sequential_algorithm(config)?;
    let kernel = V::configure_kernel(config)?;

    let timer = Instant::now();
    let pool = Dataset::new(&config.dataset).to_vec::<V>()?;
    info!("loaded {} points in {:?}", pool.points.len(), timer.elapsed());

    let timer = Instant::now();
    let selection = algorithm.sequential_run(&pool.points, pool.quality(), config.subset_size)?;
    let elapsed = timer.elapsed();

    let log_det = log_diversity(&kernel, &selection, pool.quality());
    match log_det {
        Some(log_det) => info!(
            "{} selected {} points in {:?}, log-determinant {}",
            algorithm.name(),
            selection.len(),
            elapsed,
            log_det
        ),
        None => warn!(
            "{} selected {} points in {:?}, their Gram matrix is not positive definite",
            algorithm.name(),
            selection.len(),
            elapsed
        ),
    }

    reporter.set_outcome(elapsed, log_det, selection.len() as u32);
    reporter.set_profile(algorithm.time_profile().context("missing time profile")?);
    reporter.set_counters(algorithm.counters().context("missing counters")?);
    reporter.save()?;

    Ok(None)
}

fn main() -> Result<()> {
    env_logger::init();

    let arg = std::env::args()
        .nth(1)
        .context("usage: kdpp <configuration file or base64 JSON>")?;
    let config = Configuration::load(arg)?;
    debug_config(&config);
    config.configure_threads()?;

    match config.datatype()? {
        Datatype::Vector => run::<Vector>(&config)?,
        Datatype::LeveragedVector => run::<LeveragedVector>(&config)?,
    };

    Ok(())
}

fn debug_config(config: &Configuration) {
    match config.sha() {
        Ok(sha) => info!("running configuration {} ({:?})", sha, config),
        Err(e) => warn!("cannot hash configuration: {}", e),
    }
}
