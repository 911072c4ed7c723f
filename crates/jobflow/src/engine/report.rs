//! Reporting records produced by a run: one [`JobExecution`] per job, one
//! [`BatchMetrics`] per batch, and one [`ParallelMetrics`] plus [`ExecutionResult`]
//! per run.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::trigger::JobResults;

/// Timing record of a single successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub job_id: String,
    pub batch_id: usize,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub duration: Duration,
}

/// Metrics of one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMetrics {
    pub batch_id: usize,
    /// IDs of the jobs in the batch, in registration order.
    pub job_ids: Vec<String>,
    pub job_count: usize,
    /// Jobs allowed to run at the same time within the batch.
    pub concurrency: usize,
    /// Wall-clock time of the batch.
    pub duration: Duration,
    /// Sum of job durations divided by the batch duration.
    pub efficiency_gain: f64,
}

impl BatchMetrics {
    pub(crate) fn new(
        batch_id: usize,
        job_ids: Vec<String>,
        concurrency: usize,
        duration: Duration,
        executions: &[JobExecution],
    ) -> Self {
        let busy: Duration = executions.iter().map(|e| e.duration).sum();
        Self {
            batch_id,
            job_count: job_ids.len(),
            job_ids,
            concurrency,
            duration,
            efficiency_gain: ratio(busy, duration),
        }
    }
}

/// Run-level parallelism accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParallelMetrics {
    pub total_jobs: usize,
    pub parallel_batches: usize,
    /// Sum of all job durations, i.e. the time a serial run would have taken.
    pub serial_time: Duration,
    /// Wall-clock time of the whole run.
    pub parallel_time: Duration,
    /// `serial_time / parallel_time`, or `0.0` when the run took no measurable time.
    pub parallel_efficiency: f64,
    pub max_concurrency: usize,
    pub batches: Vec<BatchMetrics>,
}

impl ParallelMetrics {
    pub(crate) fn summarize(
        trace: &[JobExecution],
        batches: Vec<BatchMetrics>,
        parallel_batches: usize,
        parallel_time: Duration,
    ) -> Self {
        let serial_time: Duration = trace.iter().map(|e| e.duration).sum();
        Self {
            total_jobs: trace.len(),
            parallel_batches,
            serial_time,
            parallel_time,
            parallel_efficiency: ratio(serial_time, parallel_time),
            max_concurrency: batches.iter().map(|b| b.concurrency).max().unwrap_or(0),
            batches,
        }
    }
}

/// Outcome of one engine run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Result of the job folded last, in completion order across all batches.
    ///
    /// This is not necessarily the job that is "last" in the dependency order.
    pub final_result: Option<JsonValue>,
    /// Results of every completed job.
    pub all_results: JobResults,
    /// Per-job timing records, batch by batch. Order within a batch is unspecified.
    pub job_trace: Vec<JobExecution>,
    pub metrics: ParallelMetrics,
    pub duration: Duration,
    /// Scheduler cycles consumed, including the final one that found nothing ready.
    pub cycles: usize,
    /// Registered jobs that never completed, in registration order.
    pub pending_jobs: Vec<String>,
    /// Message of the error that aborted the run, if any.
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// True when the run succeeded and every registered job completed.
    pub fn is_complete(&self) -> bool {
        self.is_success() && self.pending_jobs.is_empty()
    }

    /// Returns the result of a completed job.
    pub fn result(&self, job_id: &str) -> Option<&JsonValue> {
        self.all_results.get(job_id)
    }

    /// Returns the trace entries of one batch.
    pub fn batch_trace(&self, batch_id: usize) -> impl Iterator<Item = &JobExecution> {
        self.job_trace.iter().filter(move |e| e.batch_id == batch_id)
    }
}

fn ratio(numerator: Duration, denominator: Duration) -> f64 {
    if denominator.is_zero() {
        0.0
    } else {
        numerator.as_secs_f64() / denominator.as_secs_f64()
    }
}

/// Converts a wall-clock instant to milliseconds since UNIX_EPOCH.
pub(crate) fn timestamp_ms(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn execution(job_id: &str, batch_id: usize, millis: u64) -> JobExecution {
        JobExecution {
            job_id: job_id.to_string(),
            batch_id,
            started_at_ms: 1_000,
            finished_at_ms: 1_000 + millis,
            duration: Duration::from_millis(millis),
        }
    }

    #[test]
    fn test_batch_efficiency_gain() {
        let executions = vec![execution("a", 1, 100), execution("b", 1, 100)];
        let metrics = BatchMetrics::new(
            1,
            vec!["a".to_string(), "b".to_string()],
            2,
            Duration::from_millis(100),
            &executions,
        );

        assert_eq!(metrics.job_count, 2);
        assert_eq!(metrics.concurrency, 2);
        assert!((metrics.efficiency_gain - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_duration_guard() {
        let metrics = BatchMetrics::new(1, vec![], 0, Duration::ZERO, &[]);
        assert_eq!(metrics.efficiency_gain, 0.0);

        let summary = ParallelMetrics::summarize(&[], vec![], 0, Duration::ZERO);
        assert_eq!(summary.parallel_efficiency, 0.0);
        assert_eq!(summary.max_concurrency, 0);
    }

    #[test]
    fn test_summarize() {
        let trace = vec![
            execution("a", 1, 100),
            execution("b", 2, 50),
            execution("c", 2, 50),
        ];
        let batches = vec![
            BatchMetrics::new(1, vec!["a".into()], 1, Duration::from_millis(100), &trace[..1]),
            BatchMetrics::new(
                2,
                vec!["b".into(), "c".into()],
                2,
                Duration::from_millis(50),
                &trace[1..],
            ),
        ];

        let metrics = ParallelMetrics::summarize(&trace, batches, 2, Duration::from_millis(160));

        assert_eq!(metrics.total_jobs, 3);
        assert_eq!(metrics.parallel_batches, 2);
        assert_eq!(metrics.serial_time, Duration::from_millis(200));
        assert_eq!(metrics.max_concurrency, 2);
        assert!((metrics.parallel_efficiency - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_execution_result_helpers() {
        let mut result = ExecutionResult::default();
        result.all_results.insert("a".to_string(), json!(1));
        result.job_trace = vec![execution("a", 1, 10), execution("b", 2, 10)];

        assert!(result.is_success());
        assert!(result.is_complete());
        assert_eq!(result.result("a"), Some(&json!(1)));
        assert_eq!(result.batch_trace(2).count(), 1);

        result.pending_jobs.push("c".to_string());
        assert!(!result.is_complete());

        result.error = Some("job c failed".to_string());
        assert!(!result.is_success());
    }

    #[test]
    fn test_timestamp_ms() {
        let at = UNIX_EPOCH + Duration::from_millis(1_500);
        assert_eq!(timestamp_ms(at), 1_500);
    }
}
