//! Parallel engine for dependency-triggered job execution.
//!
//! This module provides the main `ParallelEngine` implementation: a wavefront
//! scheduler that repeatedly collects every job whose trigger is satisfied, runs
//! them concurrently as one batch, and folds their results back in before polling
//! triggers again.

use futures::FutureExt;
use serde_json::Value as JsonValue;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::config::ParallelEngineConfig;
use super::dependency_graph::DependencyGraph;
use super::plan::ExecutionPlan;
use super::report::{BatchMetrics, ExecutionResult, JobExecution, ParallelMetrics, timestamp_ms};
use crate::error::{EngineError, RunError};
use crate::job::{Job, JobHandle, StatefulJob};
use crate::state::FlowState;
use crate::trigger::{JobResults, Trigger};

#[derive(Debug, Clone)]
struct Registration {
    job: JobHandle,
    trigger: Trigger,
}

/// Message sent by a job task on the batch completion channel.
struct JobOutcome {
    job_id: String,
    started_at: SystemTime,
    duration: Duration,
    result: Result<JsonValue, EngineError>,
}

/// Successful jobs of one batch, in completion order.
struct BatchOutcome {
    metrics: BatchMetrics,
    completions: Vec<(JsonValue, JobExecution)>,
}

/// Bookkeeping of a single run. Only the scheduler touches it, between batches.
#[derive(Default)]
struct RunProgress {
    completed: JobResults,
    trace: Vec<JobExecution>,
    batches: Vec<BatchMetrics>,
    final_result: Option<JsonValue>,
    cycles: usize,
    batch_id: usize,
}

impl RunProgress {
    fn fold(&mut self, outcome: BatchOutcome) {
        for (result, execution) in outcome.completions {
            self.completed.insert(execution.job_id.clone(), result.clone());
            self.trace.push(execution);
            self.final_result = Some(result);
        }
        self.batches.push(outcome.metrics);
    }
}

/// Dependency-triggered parallel job engine.
///
/// Jobs are registered together with a [`Trigger`]. A run repeatedly executes, as one
/// concurrent batch, every job that has not completed yet and whose trigger is ready.
/// Results of a batch become visible to triggers only after the whole batch has
/// drained, so jobs of the same batch never unlock each other.
///
/// The engine is cheap to clone; jobs are shared behind `Arc`.
///
/// # Examples
///
/// ```ignore
/// use jobflow::{FnJob, ParallelEngine, Trigger};
/// use serde_json::json;
/// use tokio_util::sync::CancellationToken;
///
/// let mut engine = ParallelEngine::new();
/// engine.add_job(FnJob::new("fetch", |_| async { Ok(json!("raw")) }), Trigger::immediately())?;
/// engine.add_job(FnJob::new("parse", |_| async { Ok(json!("parsed")) }), Trigger::after("fetch"))?;
///
/// let result = engine.run(CancellationToken::new()).await?;
/// assert_eq!(result.metrics.parallel_batches, 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParallelEngine {
    registrations: Vec<Registration>,
    config: ParallelEngineConfig,
}

impl ParallelEngine {
    /// Creates an engine with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine with a custom configuration.
    pub fn with_config(config: ParallelEngineConfig) -> Self {
        Self {
            registrations: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &ParallelEngineConfig {
        &self.config
    }

    /// Registers a job.
    ///
    /// Jobs whose [`Job::as_stateful`] returns `Some` receive the run's [`FlowState`]
    /// through [`StatefulJob::execute_with_state`]. Fails without modifying the engine if
    /// the ID is empty or already registered.
    pub fn add_job<J>(&mut self, job: J, trigger: Trigger) -> Result<(), EngineError>
    where
        J: Job + 'static,
    {
        self.register(JobHandle::from_job(job), trigger)
    }

    /// Registers a job that receives the run's shared [`FlowState`], whether or not it
    /// overrides [`Job::as_stateful`].
    pub fn add_stateful_job<J>(&mut self, job: J, trigger: Trigger) -> Result<(), EngineError>
    where
        J: StatefulJob + 'static,
    {
        self.register(JobHandle::Stateful(Arc::new(job)), trigger)
    }

    fn register(&mut self, job: JobHandle, trigger: Trigger) -> Result<(), EngineError> {
        let job_id = job.id();
        if job_id.is_empty() {
            return Err(EngineError::EmptyJobId);
        }
        if self.contains_job(job_id) {
            return Err(EngineError::DuplicateJobId(job_id.to_string()));
        }

        debug!(job_id = %job_id, trigger = ?trigger, "Job registered");
        self.registrations.push(Registration { job, trigger });
        Ok(())
    }

    pub fn contains_job(&self, job_id: &str) -> bool {
        self.registrations.iter().any(|r| r.job.id() == job_id)
    }

    /// Registered job IDs in registration order.
    pub fn job_ids(&self) -> Vec<&str> {
        self.registrations.iter().map(|r| r.job.id()).collect()
    }

    pub fn trigger(&self, job_id: &str) -> Option<&Trigger> {
        self.registrations
            .iter()
            .find(|r| r.job.id() == job_id)
            .map(|r| &r.trigger)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Checks the trigger set before running.
    ///
    /// Reports the first trigger (in registration order) that references an unknown
    /// job, then any job whose required dependencies form a cycle. Triggers that can
    /// still be satisfied through another `AnyOf` branch are not treated as cycles.
    pub fn validate(&self) -> Result<(), EngineError> {
        for registration in &self.registrations {
            for dependency in registration.trigger.referenced_jobs() {
                if !self.contains_job(dependency) {
                    return Err(EngineError::UnknownDependency {
                        job_id: registration.job.id().to_string(),
                        dependency: dependency.to_string(),
                    });
                }
            }
        }

        let graph =
            DependencyGraph::from_triggers(self.registrations.iter().map(|r| (r.job.id(), &r.trigger)));
        match graph.find_cycle() {
            Some(job_id) => Err(EngineError::Cycle { job_id }),
            None => Ok(()),
        }
    }

    /// Simulates a run in which every job succeeds, without executing anything.
    ///
    /// Triggers only look at which jobs have completed, so the returned batches are
    /// exactly the batches a fully successful run would execute.
    pub fn plan(&self) -> ExecutionPlan {
        let mut completed = JobResults::new();
        let mut batches = Vec::new();

        for _ in 0..self.config.max_cycles {
            let ready: Vec<String> = self
                .ready_jobs(&completed)
                .iter()
                .map(|job| job.id().to_string())
                .collect();
            if ready.is_empty() {
                break;
            }
            for job_id in &ready {
                completed.insert(job_id.clone(), JsonValue::Null);
            }
            batches.push(ready);
        }

        let unreachable = self.pending_jobs(&completed);
        ExecutionPlan::new(batches, unreachable)
    }

    /// Runs every reachable job to completion.
    ///
    /// The cancellation token is forwarded to every job; the engine never cancels it
    /// itself. If it is already cancelled when a new batch would start, the run stops.
    ///
    /// # Errors
    ///
    /// Fails fast at batch granularity: the first job error, timeout or panic observed
    /// while draining a batch aborts the run. The returned [`RunError`] carries the
    /// partial [`ExecutionResult`] with every job completed in earlier batches. Jobs
    /// still running in the failed batch are left to finish and their results are
    /// discarded.
    ///
    /// Running out of ready jobs, whether drained or deadlocked, and reaching the
    /// cycle ceiling are not errors; check [`ExecutionResult::pending_jobs`].
    pub async fn run(
        &self,
        cancellation_token: CancellationToken,
    ) -> Result<ExecutionResult, RunError> {
        let span = info_span!(
            "parallel_engine_run",
            total_jobs = self.registrations.len(),
            max_cycles = self.config.max_cycles,
        );
        self.run_inner(cancellation_token).instrument(span).await
    }

    /// Spawns [`run`](Self::run) on the current tokio runtime and delivers the result
    /// on a one-shot channel.
    ///
    /// A failed run is delivered as its partial result with
    /// [`ExecutionResult::error`] set.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn run_async(
        &self,
        cancellation_token: CancellationToken,
    ) -> oneshot::Receiver<ExecutionResult> {
        let (tx, rx) = oneshot::channel();
        let engine = self.clone();

        tokio::spawn(async move {
            let result = match engine.run(cancellation_token).await {
                Ok(result) => result,
                Err(err) => err.into_result(),
            };
            if tx.send(result).is_err() {
                debug!("Async run finished but the receiver was dropped");
            }
        });

        rx
    }

    async fn run_inner(
        &self,
        cancellation_token: CancellationToken,
    ) -> Result<ExecutionResult, RunError> {
        let started = Instant::now();
        let mut progress = RunProgress::default();

        info!(
            "Starting parallel run with {} registered job(s)",
            self.registrations.len()
        );

        if self.config.validate_before_run {
            if let Err(err) = self.validate() {
                warn!(error = %err, "Pre-flight validation failed");
                return Err(self.fail(err, progress, started));
            }
        }

        let state = Arc::new(FlowState::new());
        let mut drained = false;

        while progress.cycles < self.config.max_cycles {
            progress.cycles += 1;

            let ready = self.ready_jobs(&progress.completed);
            if ready.is_empty() {
                drained = true;
                break;
            }

            if cancellation_token.is_cancelled() {
                let err = EngineError::Cancelled {
                    batch_id: progress.batch_id + 1,
                };
                warn!(error = %err, "Run cancelled");
                return Err(self.fail(err, progress, started));
            }

            progress.batch_id += 1;
            let batch_span = info_span!(
                "batch",
                batch_id = progress.batch_id,
                ready_jobs = ready.len()
            );

            let outcome = self
                .execute_batch(
                    progress.batch_id,
                    ready,
                    Arc::clone(&state),
                    cancellation_token.clone(),
                )
                .instrument(batch_span)
                .await;

            match outcome {
                Ok(outcome) => progress.fold(outcome),
                Err(err) => {
                    warn!(error = %err, batch_id = progress.batch_id, "Batch failed, aborting run");
                    return Err(self.fail(err, progress, started));
                }
            }
        }

        let pending = self.registrations.len() - progress.completed.len();
        if pending > 0 {
            if drained {
                warn!(
                    "No ready jobs but {} job(s) still pending - potential deadlock",
                    pending
                );
            } else {
                warn!(
                    "Cycle ceiling of {} reached with {} job(s) pending",
                    self.config.max_cycles, pending
                );
            }
        }

        let result = self.finish(progress, started, None);
        info!(
            completed = result.all_results.len(),
            batches = result.metrics.parallel_batches,
            efficiency = result.metrics.parallel_efficiency,
            "Parallel run finished"
        );
        Ok(result)
    }

    /// Executes one batch and waits until every job has reported or one has failed.
    async fn execute_batch(
        &self,
        batch_id: usize,
        ready: Vec<JobHandle>,
        state: Arc<FlowState>,
        cancellation_token: CancellationToken,
    ) -> Result<BatchOutcome, EngineError> {
        let job_ids: Vec<String> = ready.iter().map(|job| job.id().to_string()).collect();
        let concurrency = self.config.effective_concurrency(ready.len());
        let permits = self
            .config
            .max_concurrent_jobs
            .map(|_| Arc::new(Semaphore::new(concurrency)));
        let job_timeout = self.config.job_timeout;

        info!(
            "Executing batch {} with {} job(s): {}",
            batch_id,
            job_ids.len(),
            job_ids.join(", ")
        );

        let batch_started = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel::<JobOutcome>();

        for job in ready {
            let tx = tx.clone();
            let state = Arc::clone(&state);
            let cancel = cancellation_token.clone();
            let permits = permits.clone();
            let job_span = info_span!("parallel_job", job_id = %job.id(), batch_id = batch_id);

            tokio::spawn(
                async move {
                    let _permit = match permits {
                        Some(semaphore) => semaphore.acquire_owned().await.ok(),
                        None => None,
                    };

                    let started_at = SystemTime::now();
                    let clock = Instant::now();
                    let result = AssertUnwindSafe(execute_job(&job, cancel, state, job_timeout))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| {
                            Err(EngineError::JobPanicked {
                                job_id: job.id().to_string(),
                                message: panic_message(payload.as_ref()),
                            })
                        });

                    // The receiver is gone once the batch has failed; the result is discarded.
                    let _ = tx.send(JobOutcome {
                        job_id: job.id().to_string(),
                        started_at,
                        duration: clock.elapsed(),
                        result,
                    });
                }
                .instrument(job_span),
            );
        }
        drop(tx);

        let mut completions = Vec::with_capacity(job_ids.len());
        while let Some(outcome) = rx.recv().await {
            match outcome.result {
                Ok(output) => {
                    debug!(job_id = %outcome.job_id, duration = ?outcome.duration, "Job completed");
                    let execution = JobExecution {
                        job_id: outcome.job_id,
                        batch_id,
                        started_at_ms: timestamp_ms(outcome.started_at),
                        finished_at_ms: timestamp_ms(outcome.started_at + outcome.duration),
                        duration: outcome.duration,
                    };
                    completions.push((output, execution));
                }
                Err(err) => {
                    warn!(job_id = %outcome.job_id, error = %err, "Job failed");
                    return Err(err);
                }
            }
        }

        if completions.len() < job_ids.len() {
            // A task was torn down without reporting, e.g. during runtime shutdown.
            let missing = job_ids
                .iter()
                .find(|id| !completions.iter().any(|(_, e)| &e.job_id == *id))
                .cloned()
                .unwrap_or_default();
            return Err(EngineError::JobPanicked {
                job_id: missing,
                message: "task ended without reporting a result".to_string(),
            });
        }

        let duration = batch_started.elapsed();
        let executions: Vec<JobExecution> = completions.iter().map(|(_, e)| e.clone()).collect();
        let metrics = BatchMetrics::new(batch_id, job_ids, concurrency, duration, &executions);
        debug!(
            batch_id = batch_id,
            duration = ?duration,
            efficiency_gain = metrics.efficiency_gain,
            "Batch drained"
        );

        Ok(BatchOutcome {
            metrics,
            completions,
        })
    }

    /// Jobs that have not completed and whose trigger is ready, in registration order.
    fn ready_jobs(&self, completed: &JobResults) -> Vec<JobHandle> {
        self.registrations
            .iter()
            .filter(|r| !completed.contains_key(r.job.id()) && r.trigger.is_ready(completed))
            .map(|r| r.job.clone())
            .collect()
    }

    fn pending_jobs(&self, completed: &JobResults) -> Vec<String> {
        self.registrations
            .iter()
            .map(|r| r.job.id())
            .filter(|id| !completed.contains_key(*id))
            .map(str::to_string)
            .collect()
    }

    fn fail(&self, error: EngineError, progress: RunProgress, started: Instant) -> RunError {
        let result = self.finish(progress, started, Some(&error));
        RunError::new(error, result)
    }

    fn finish(
        &self,
        progress: RunProgress,
        started: Instant,
        error: Option<&EngineError>,
    ) -> ExecutionResult {
        let duration = started.elapsed();
        let pending_jobs = self.pending_jobs(&progress.completed);
        let metrics = ParallelMetrics::summarize(
            &progress.trace,
            progress.batches,
            progress.batch_id,
            duration,
        );

        ExecutionResult {
            final_result: progress.final_result,
            all_results: progress.completed,
            job_trace: progress.trace,
            metrics,
            duration,
            cycles: progress.cycles,
            pending_jobs,
            error: error.map(ToString::to_string),
        }
    }
}

async fn execute_job(
    job: &JobHandle,
    cancel: CancellationToken,
    state: Arc<FlowState>,
    job_timeout: Option<Duration>,
) -> Result<JsonValue, EngineError> {
    let job_id = job.id();
    let result = match job_timeout {
        Some(timeout) => match tokio::time::timeout(timeout, job.run(cancel, state)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(job_id = %job_id, timeout = ?timeout, "Job execution timed out");
                return Err(EngineError::JobTimeout {
                    job_id: job_id.to_string(),
                    timeout,
                });
            }
        },
        None => job.run(cancel, state).await,
    };

    result.map_err(|source| EngineError::JobFailed {
        job_id: job_id.to_string(),
        source,
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;
    use serde_json::json;

    struct EchoJob(&'static str);

    #[async_trait::async_trait]
    impl Job for EchoJob {
        fn id(&self) -> &str {
            self.0
        }

        async fn execute(&self, _cancel: CancellationToken) -> Result<JsonValue, JobError> {
            Ok(json!(self.0))
        }
    }

    fn noop(id: &'static str) -> EchoJob {
        EchoJob(id)
    }

    #[test]
    fn test_engine_creation() {
        let engine = ParallelEngine::new();
        assert!(engine.is_empty());
        assert_eq!(engine.config().max_cycles, 100);
    }

    #[test]
    fn test_duplicate_and_empty_ids_rejected() {
        let mut engine = ParallelEngine::new();
        engine.add_job(noop("a"), Trigger::immediately()).unwrap();

        let err = engine.add_job(noop("a"), Trigger::after("b")).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateJobId(ref id) if id == "a"));
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.trigger("a"), Some(&Trigger::Immediately));

        let err = engine.add_job(noop(""), Trigger::immediately()).unwrap_err();
        assert!(matches!(err, EngineError::EmptyJobId));
    }

    #[test]
    fn test_ready_jobs_preserve_registration_order() {
        let mut engine = ParallelEngine::new();
        engine.add_job(noop("c"), Trigger::immediately()).unwrap();
        engine.add_job(noop("a"), Trigger::immediately()).unwrap();
        engine.add_job(noop("b"), Trigger::after("a")).unwrap();

        let ready: Vec<String> = engine
            .ready_jobs(&JobResults::new())
            .iter()
            .map(|job| job.id().to_string())
            .collect();
        assert_eq!(ready, vec!["c", "a"]);
    }

    #[test]
    fn test_validate_unknown_dependency() {
        let mut engine = ParallelEngine::new();
        engine.add_job(noop("a"), Trigger::after("ghost")).unwrap();

        let err = engine.validate().unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnknownDependency { ref job_id, ref dependency }
                if job_id == "a" && dependency == "ghost"
        ));
    }

    #[test]
    fn test_validate_cycle_and_any_of_escape() {
        let mut engine = ParallelEngine::new();
        engine.add_job(noop("a"), Trigger::after("b")).unwrap();
        engine.add_job(noop("b"), Trigger::after("a")).unwrap();
        assert!(matches!(engine.validate(), Err(EngineError::Cycle { .. })));

        let mut engine = ParallelEngine::new();
        engine
            .add_job(
                noop("a"),
                Trigger::any_of([Trigger::after("b"), Trigger::immediately()]),
            )
            .unwrap();
        engine.add_job(noop("b"), Trigger::after("a")).unwrap();
        assert!(engine.validate().is_ok());
    }

    #[test]
    fn test_plan_diamond() {
        let mut engine = ParallelEngine::new();
        engine.add_job(noop("fetch"), Trigger::immediately()).unwrap();
        engine.add_job(noop("parse"), Trigger::after("fetch")).unwrap();
        engine.add_job(noop("validate"), Trigger::after("fetch")).unwrap();
        engine
            .add_job(noop("report"), Trigger::after_jobs(["parse", "validate"]))
            .unwrap();
        engine.add_job(noop("orphan"), Trigger::after("ghost")).unwrap();

        let plan = engine.plan();
        assert_eq!(
            plan.batches,
            vec![
                vec!["fetch".to_string()],
                vec!["parse".to_string(), "validate".to_string()],
                vec!["report".to_string()],
            ]
        );
        assert_eq!(plan.unreachable, vec!["orphan".to_string()]);
    }

    #[test]
    fn test_plan_respects_cycle_ceiling() {
        let mut engine =
            ParallelEngine::with_config(ParallelEngineConfig::new().with_max_cycles(1));
        engine.add_job(noop("a"), Trigger::immediately()).unwrap();
        engine.add_job(noop("b"), Trigger::after("a")).unwrap();

        let plan = engine.plan();
        assert_eq!(plan.batches.len(), 1);
        assert_eq!(plan.unreachable, vec!["b".to_string()]);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
