use std::time::Duration;

/// An algorithm whose runs are tracked in the results database.
pub trait Algorithm {
    fn version(&self) -> u32;
    fn name(&self) -> String;
    fn parameters(&self) -> String;
    /// Time spent preprocessing the pool (zero for algorithms working on
    /// the raw pool) and time spent selecting. `None` before the first run.
    fn time_profile(&self) -> Option<(Duration, Duration)>;

    /// Number of kernel evaluations and of rank-one updates of the last run.
    fn counters(&self) -> Option<(u64, u64)>;
}
