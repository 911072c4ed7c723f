//! Configuration for the parallel engine.
//!
//! This module provides options controlling the cycle ceiling, per-job timeouts,
//! concurrency limits and pre-flight validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of scheduler cycles before the engine gives up.
pub const DEFAULT_MAX_CYCLES: usize = 100;

/// Configuration for [`ParallelEngine`](super::ParallelEngine).
///
/// # Examples
///
/// ```
/// use jobflow::ParallelEngineConfig;
/// use std::time::Duration;
///
/// let config = ParallelEngineConfig::new()
///     .with_max_cycles(20)
///     .with_job_timeout(Duration::from_secs(30))
///     .with_validation(true);
///
/// assert_eq!(config.max_cycles, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelEngineConfig {
    /// Maximum number of scheduler cycles per run.
    ///
    /// Each cycle computes the ready set and runs it as one batch. The ceiling is what
    /// guarantees termination for cyclic or unsatisfiable triggers; reaching it is not
    /// an error.
    ///
    /// **Default:** 100
    #[serde(default = "default_max_cycles")]
    pub max_cycles: usize,

    /// Timeout for an individual job.
    ///
    /// If `None`, jobs may run indefinitely. A job that exceeds the timeout fails its
    /// batch like any other job error.
    #[serde(default)]
    pub job_timeout: Option<Duration>,

    /// Maximum number of jobs of one batch running at the same time.
    ///
    /// If `None`, every ready job in a batch starts immediately.
    #[serde(default)]
    pub max_concurrent_jobs: Option<usize>,

    /// Run [`ParallelEngine::validate`](super::ParallelEngine::validate) at the start of
    /// every run and refuse to start on unknown dependencies or required cycles.
    ///
    /// **Default:** `false`
    #[serde(default)]
    pub validate_before_run: bool,
}

fn default_max_cycles() -> usize {
    DEFAULT_MAX_CYCLES
}

impl Default for ParallelEngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ParallelEngineConfig {
    /// Creates a new configuration with default values.
    ///
    /// Default values:
    /// - `max_cycles`: `100`
    /// - `job_timeout`: `None` (no timeout)
    /// - `max_concurrent_jobs`: `None` (unlimited)
    /// - `validate_before_run`: `false`
    pub fn new() -> Self {
        Self {
            max_cycles: DEFAULT_MAX_CYCLES,
            job_timeout: None,
            max_concurrent_jobs: None,
            validate_before_run: false,
        }
    }

    pub fn with_max_cycles(mut self, max: usize) -> Self {
        self.max_cycles = max;
        self
    }

    /// Sets the per-job timeout duration.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    /// Removes the per-job timeout.
    pub fn with_no_timeout(mut self) -> Self {
        self.job_timeout = None;
        self
    }

    /// Limits how many jobs of a batch may run at once. A limit of zero is treated as one.
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = Some(max.max(1));
        self
    }

    /// Removes the concurrency limit, allowing every ready job to run at once.
    pub fn with_unlimited_concurrency(mut self) -> Self {
        self.max_concurrent_jobs = None;
        self
    }

    pub fn with_validation(mut self, enable: bool) -> Self {
        self.validate_before_run = enable;
        self
    }

    /// Number of jobs that actually run at the same time for a batch of `ready` jobs.
    pub(crate) fn effective_concurrency(&self, ready: usize) -> usize {
        match self.max_concurrent_jobs {
            Some(max) => ready.min(max),
            None => ready,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ParallelEngineConfig::default();
        assert_eq!(config.max_cycles, 100);
        assert!(config.job_timeout.is_none());
        assert!(config.max_concurrent_jobs.is_none());
        assert!(!config.validate_before_run);
    }

    #[test]
    fn test_builder_chain() {
        let config = ParallelEngineConfig::new()
            .with_max_cycles(5)
            .with_max_concurrent_jobs(3)
            .with_job_timeout(Duration::from_secs(600))
            .with_validation(true);

        assert_eq!(config.max_cycles, 5);
        assert_eq!(config.max_concurrent_jobs, Some(3));
        assert_eq!(config.job_timeout, Some(Duration::from_secs(600)));
        assert!(config.validate_before_run);
    }

    #[test]
    fn test_with_unlimited_concurrency_and_no_timeout() {
        let config = ParallelEngineConfig::new()
            .with_max_concurrent_jobs(5)
            .with_job_timeout(Duration::from_secs(1))
            .with_unlimited_concurrency()
            .with_no_timeout();

        assert!(config.max_concurrent_jobs.is_none());
        assert!(config.job_timeout.is_none());
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let config = ParallelEngineConfig::new().with_max_concurrent_jobs(0);
        assert_eq!(config.max_concurrent_jobs, Some(1));
    }

    #[test]
    fn test_effective_concurrency() {
        let unlimited = ParallelEngineConfig::new();
        assert_eq!(unlimited.effective_concurrency(7), 7);

        let limited = ParallelEngineConfig::new().with_max_concurrent_jobs(2);
        assert_eq!(limited.effective_concurrency(7), 2);
        assert_eq!(limited.effective_concurrency(1), 1);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: ParallelEngineConfig =
            serde_json::from_str(r#"{"max_concurrent_jobs": 4}"#).unwrap();
        assert_eq!(config.max_cycles, DEFAULT_MAX_CYCLES);
        assert_eq!(config.max_concurrent_jobs, Some(4));
        assert!(!config.validate_before_run);
    }
}
