//! Error types for jobs, the engine and the shared flow state.

use std::time::Duration;
use thiserror::Error;

use crate::engine::ExecutionResult;

/// Errors returned by a job body.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job ran but could not complete its work.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// A value the job expected in the flow state was absent or had the wrong type.
    #[error("Missing state: {0}")]
    MissingState(String),

    /// The job observed cancellation and stopped.
    #[error("Job cancelled")]
    Cancelled,

    /// JSON (de)serialization of a job input or output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Any other error raised by business logic inside the job.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobError {
    /// Shorthand for [`JobError::ExecutionFailed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed(reason.into())
    }
}

/// Errors that can occur while registering, validating or running jobs.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A job returned an error. The whole run is aborted.
    #[error("job {job_id} failed: {source}")]
    JobFailed {
        job_id: String,
        #[source]
        source: JobError,
    },

    /// A job exceeded the configured per-job timeout.
    #[error("job {job_id} timed out after {timeout:?}")]
    JobTimeout { job_id: String, timeout: Duration },

    /// A job panicked inside its task.
    #[error("job {job_id} panicked: {message}")]
    JobPanicked { job_id: String, message: String },

    /// A job with the same ID is already registered.
    #[error("duplicate job id: {0}")]
    DuplicateJobId(String),

    /// Job IDs must be non-empty.
    #[error("job id cannot be empty")]
    EmptyJobId,

    /// A trigger references a job that was never registered.
    #[error("job {job_id} depends on unknown job {dependency}")]
    UnknownDependency { job_id: String, dependency: String },

    /// The required dependencies of a job form a cycle, so it can never become ready.
    #[error("dependency cycle involving job {job_id}")]
    Cycle { job_id: String },

    /// The cancellation token fired before the next batch could start.
    #[error("run cancelled before batch {batch_id}")]
    Cancelled { batch_id: usize },
}

impl EngineError {
    /// Returns the ID of the job this error is attributed to, if any.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::JobFailed { job_id, .. }
            | Self::JobTimeout { job_id, .. }
            | Self::JobPanicked { job_id, .. }
            | Self::UnknownDependency { job_id, .. }
            | Self::Cycle { job_id } => Some(job_id.as_str()),
            Self::DuplicateJobId(job_id) => Some(job_id.as_str()),
            Self::EmptyJobId | Self::Cancelled { .. } => None,
        }
    }
}

/// Failure of a whole run.
///
/// Carries the partial [`ExecutionResult`] accumulated up to the failure point so
/// callers can still inspect completed results and the job trace.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunError {
    #[source]
    pub error: EngineError,
    pub result: Box<ExecutionResult>,
}

impl RunError {
    pub(crate) fn new(error: EngineError, result: ExecutionResult) -> Self {
        Self {
            error,
            result: Box::new(result),
        }
    }

    /// Consumes the error and returns the partial result.
    pub fn into_result(self) -> ExecutionResult {
        *self.result
    }
}

/// Errors raised by [`FlowState`](crate::FlowState) helpers.
#[derive(Debug, Error)]
pub enum StateError {
    /// A template could not be parsed or rendered against the state snapshot.
    #[error("Template render error: {0}")]
    TemplateRender(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_failed_message_contains_id() {
        let err = EngineError::JobFailed {
            job_id: "parse".to_string(),
            source: JobError::failed("bad input"),
        };
        let msg = err.to_string();
        assert!(msg.contains("parse"));
        assert!(msg.contains("bad input"));
        assert_eq!(err.job_id(), Some("parse"));
    }

    #[test]
    fn test_job_id_absent_for_run_level_errors() {
        assert_eq!(EngineError::EmptyJobId.job_id(), None);
        assert_eq!(EngineError::Cancelled { batch_id: 2 }.job_id(), None);
    }

    #[test]
    fn test_other_is_transparent() {
        let err: JobError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.to_string(), "disk full");
    }
}
