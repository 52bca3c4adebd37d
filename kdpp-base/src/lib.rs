pub mod algorithm;
pub mod dataset;
pub mod error;
pub mod kernel;
pub mod linalg;
pub mod perf_counters;
pub mod types;
