//! The unit-of-work contract consumed by the engine.
//!
//! A job implements [`Job`]. Jobs that need to read or publish shared data also
//! implement [`StatefulJob`]. The engine calls [`StatefulJob::execute_with_state`]
//! instead of [`Job::execute`] for jobs registered with
//! [`ParallelEngine::add_stateful_job`](crate::ParallelEngine::add_stateful_job), and for
//! jobs registered with [`ParallelEngine::add_job`](crate::ParallelEngine::add_job) whose
//! [`Job::as_stateful`] returns `Some`.
//!
//! # Examples
//!
//! ```ignore
//! use jobflow::{FlowState, Job, JobError, StatefulJob};
//! use serde_json::{Value as JsonValue, json};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Fetch;
//!
//! #[async_trait::async_trait]
//! impl Job for Fetch {
//!     fn id(&self) -> &str {
//!         "fetch"
//!     }
//!
//!     async fn execute(&self, _cancel: CancellationToken) -> Result<JsonValue, JobError> {
//!         Ok(json!({"rows": 3}))
//!     }
//!
//!     fn as_stateful(self: Arc<Self>) -> Option<Arc<dyn StatefulJob>> {
//!         Some(self)
//!     }
//! }
//!
//! #[async_trait::async_trait]
//! impl StatefulJob for Fetch {
//!     async fn execute_with_state(
//!         &self,
//!         cancel: CancellationToken,
//!         state: Arc<FlowState>,
//!     ) -> Result<JsonValue, JobError> {
//!         let output = self.execute(cancel).await?;
//!         state.set("rows", output["rows"].clone());
//!         Ok(output)
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::state::FlowState;

/// A uniquely identified unit of work.
#[async_trait]
pub trait Job: Send + Sync {
    /// Stable, non-empty identifier, unique within one engine.
    fn id(&self) -> &str;

    /// Performs the work. Long-running jobs should watch `cancel`.
    async fn execute(&self, cancel: CancellationToken) -> Result<JsonValue, JobError>;

    /// Exposes the [`StatefulJob`] side of this job, if it has one.
    ///
    /// [`ParallelEngine::add_job`](crate::ParallelEngine::add_job) uses this to hand the
    /// flow state to stateful jobs. Implementors of [`StatefulJob`] return `Some(self)`.
    fn as_stateful(self: Arc<Self>) -> Option<Arc<dyn StatefulJob>> {
        None
    }
}

/// A job that reads from or writes to the run's shared [`FlowState`].
#[async_trait]
pub trait StatefulJob: Job {
    async fn execute_with_state(
        &self,
        cancel: CancellationToken,
        state: Arc<FlowState>,
    ) -> Result<JsonValue, JobError>;
}

/// A registered job, tagged by the contract it was registered under.
#[derive(Clone)]
pub(crate) enum JobHandle {
    /// Plain job; the flow state is not passed.
    Plain(Arc<dyn Job>),
    Stateful(Arc<dyn StatefulJob>),
}

impl JobHandle {
    /// Wraps a job, tagging it as stateful when it exposes a [`StatefulJob`] side.
    pub(crate) fn from_job<J: Job + 'static>(job: J) -> Self {
        let job = Arc::new(job);
        match Arc::clone(&job).as_stateful() {
            Some(stateful) => Self::Stateful(stateful),
            None => Self::Plain(job),
        }
    }

    pub(crate) fn id(&self) -> &str {
        match self {
            Self::Plain(job) => job.id(),
            Self::Stateful(job) => job.id(),
        }
    }

    pub(crate) async fn run(
        &self,
        cancel: CancellationToken,
        state: Arc<FlowState>,
    ) -> Result<JsonValue, JobError> {
        match self {
            Self::Plain(job) => job.execute(cancel).await,
            Self::Stateful(job) => job.execute_with_state(cancel, state).await,
        }
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(job) => f.debug_tuple("Plain").field(&job.id()).finish(),
            Self::Stateful(job) => f.debug_tuple("Stateful").field(&job.id()).finish(),
        }
    }
}

/// A job backed by an async closure.
///
/// ```ignore
/// let job = FnJob::new("fetch", |_cancel| async { Ok(json!("payload")) });
/// ```
pub struct FnJob<F> {
    id: String,
    func: F,
}

impl<F, Fut> FnJob<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<JsonValue, JobError>> + Send,
{
    pub fn new(id: impl Into<String>, func: F) -> Self {
        Self {
            id: id.into(),
            func,
        }
    }
}

#[async_trait]
impl<F, Fut> Job for FnJob<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<JsonValue, JobError>> + Send,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, cancel: CancellationToken) -> Result<JsonValue, JobError> {
        (self.func)(cancel).await
    }
}

/// A stateful job backed by an async closure.
///
/// Calling the plain [`Job::execute`] runs the closure against an empty, throwaway state.
pub struct StatefulFnJob<F> {
    id: String,
    func: F,
}

impl<F, Fut> StatefulFnJob<F>
where
    F: Fn(CancellationToken, Arc<FlowState>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<JsonValue, JobError>> + Send,
{
    pub fn new(id: impl Into<String>, func: F) -> Self {
        Self {
            id: id.into(),
            func,
        }
    }
}

#[async_trait]
impl<F, Fut> Job for StatefulFnJob<F>
where
    F: Fn(CancellationToken, Arc<FlowState>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JsonValue, JobError>> + Send,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, cancel: CancellationToken) -> Result<JsonValue, JobError> {
        (self.func)(cancel, Arc::new(FlowState::new())).await
    }

    fn as_stateful(self: Arc<Self>) -> Option<Arc<dyn StatefulJob>> {
        Some(self)
    }
}

#[async_trait]
impl<F, Fut> StatefulJob for StatefulFnJob<F>
where
    F: Fn(CancellationToken, Arc<FlowState>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JsonValue, JobError>> + Send,
{
    async fn execute_with_state(
        &self,
        cancel: CancellationToken,
        state: Arc<FlowState>,
    ) -> Result<JsonValue, JobError> {
        (self.func)(cancel, state).await
    }
}
