//! 'jobflow' - dependency-triggered parallel job orchestration.
//!
//! Register independent units of work ([`Job`]) together with declarative readiness
//! conditions ([`Trigger`]) that reference other jobs' completion. The
//! [`ParallelEngine`] then repeatedly discovers every job whose trigger is satisfied,
//! runs them concurrently as one batch, merges their results, and repeats until
//! nothing else becomes ready.
//!
//! Jobs exchange data through a shared, concurrency-safe [`FlowState`] created once
//! per run.
//!
//! # Example
//!
//! ```ignore
//! use jobflow::{FnJob, ParallelEngine, Trigger};
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! let mut engine = ParallelEngine::new();
//! engine.add_job(FnJob::new("fetch", |_| async { Ok(json!("raw")) }), Trigger::immediately())?;
//! engine.add_job(FnJob::new("parse", |_| async { Ok(json!(1)) }), Trigger::after("fetch"))?;
//! engine.add_job(FnJob::new("validate", |_| async { Ok(json!(true)) }), Trigger::after("fetch"))?;
//! engine.add_job(
//!     FnJob::new("report", |_| async { Ok(json!("done")) }),
//!     Trigger::after_jobs(["parse", "validate"]),
//! )?;
//!
//! let result = engine.run(CancellationToken::new()).await?;
//! assert_eq!(result.all_results.len(), 4);
//! assert_eq!(result.metrics.max_concurrency, 2);
//! ```

pub mod engine;
pub mod error;
pub mod job;
pub mod observability;
pub mod state;
pub mod trigger;

pub use engine::{
    BatchMetrics, ExecutionPlan, ExecutionResult, JobExecution, ParallelEngine,
    ParallelEngineConfig, ParallelMetrics,
};
pub use error::{EngineError, JobError, RunError, StateError};
pub use job::{FnJob, Job, StatefulFnJob, StatefulJob};
pub use state::FlowState;
pub use trigger::{JobResults, Trigger};

// Re-exported so job implementors do not need a direct tokio-util dependency.
pub use tokio_util::sync::CancellationToken;
