//! Fetch / parse / validate / report workflow over a shared flow state.
//!
//! This example demonstrates:
//! - Registering stateful jobs with `After` and `AllOf` triggers
//! - Parse and validate running concurrently in the same batch
//! - Rendering a report from the flow state with a template
//! - Reading the parallelism metrics of a run
//!
//! Run with: cargo run --example fetch_report

use jobflow::observability::{self, ObservabilityConfig};
use jobflow::{
    CancellationToken, FlowState, JobError, ParallelEngine, StatefulFnJob, Trigger,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init(ObservabilityConfig::default())?;

    let mut engine = ParallelEngine::new();

    engine.add_stateful_job(
        StatefulFnJob::new("fetch", |_cancel, state: Arc<FlowState>| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            state.set("source", json!("inventory.csv"));
            state.set("raw", json!(["widget,3", "gadget,5", "gizmo,-1"]));
            Ok(json!("fetched 3 lines"))
        }),
        Trigger::immediately(),
    )?;

    engine.add_stateful_job(
        StatefulFnJob::new("parse", |_cancel, state: Arc<FlowState>| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let raw = state
                .get_slice("raw")
                .ok_or_else(|| JobError::MissingState("raw".to_string()))?;
            let rows: Vec<_> = raw
                .iter()
                .filter_map(|line| line.as_str()?.split_once(','))
                .map(|(name, qty)| json!({"name": name, "qty": qty.parse::<i64>().unwrap_or(0)}))
                .collect();
            state.set("rows", json!(rows.len()));
            Ok(json!(rows))
        }),
        Trigger::after("fetch"),
    )?;

    engine.add_stateful_job(
        StatefulFnJob::new("validate", |_cancel, state: Arc<FlowState>| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let raw = state
                .get_slice("raw")
                .ok_or_else(|| JobError::MissingState("raw".to_string()))?;
            let invalid = raw
                .iter()
                .filter(|line| line.as_str().is_some_and(|l| l.contains(",-")))
                .count();
            state.set("invalid", json!(invalid));
            Ok(json!(invalid == 0))
        }),
        Trigger::after("fetch"),
    )?;

    engine.add_stateful_job(
        StatefulFnJob::new("report", |_cancel, state: Arc<FlowState>| async move {
            let report = state
                .render("{{ source }}: {{ rows }} rows, {{ invalid }} invalid")
                .map_err(|e| JobError::failed(e.to_string()))?;
            Ok(json!(report))
        }),
        Trigger::all_of([Trigger::after("parse"), Trigger::after("validate")]),
    )?;

    let plan = engine.plan();
    println!("Planned batches: {:?}", plan.batches);

    let result = engine.run(CancellationToken::new()).await?;

    println!("Report: {}", result.final_result.unwrap_or_default());
    println!(
        "{} jobs in {} batches, max concurrency {}",
        result.metrics.total_jobs, result.metrics.parallel_batches, result.metrics.max_concurrency
    );
    for batch in &result.metrics.batches {
        println!(
            "  batch {}: {:?} in {:?} (x{:.2})",
            batch.batch_id, batch.job_ids, batch.duration, batch.efficiency_gain
        );
    }
    println!(
        "Serial {:?} vs parallel {:?} (x{:.2})",
        result.metrics.serial_time,
        result.metrics.parallel_time,
        result.metrics.parallel_efficiency
    );

    Ok(())
}
