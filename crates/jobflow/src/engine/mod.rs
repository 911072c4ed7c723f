//! Wavefront scheduler for dependency-triggered jobs.
//!
//! The engine polls every registered trigger against the results completed so far,
//! executes all ready jobs concurrently as one batch, and repeats until no job
//! becomes ready or the cycle ceiling is reached.

pub mod config;
mod dependency_graph;
mod parallel_engine;
pub mod plan;
pub mod report;

pub use config::{DEFAULT_MAX_CYCLES, ParallelEngineConfig};
pub use parallel_engine::ParallelEngine;
pub use plan::ExecutionPlan;
pub use report::{BatchMetrics, ExecutionResult, JobExecution, ParallelMetrics};
