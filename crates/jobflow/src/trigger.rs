//! Readiness conditions for jobs.
//!
//! A [`Trigger`] is a pure predicate over the results completed so far. Triggers are
//! composed from four primitives and are re-evaluated by the engine on every
//! scheduler cycle, so evaluation never has side effects.
//!
//! # Examples
//!
//! ```
//! use jobflow::{JobResults, Trigger};
//! use serde_json::json;
//!
//! let report = Trigger::all_of([Trigger::after("parse"), Trigger::after("validate")]);
//!
//! let mut results = JobResults::new();
//! results.insert("parse".to_string(), json!("ok"));
//! assert!(!report.is_ready(&results));
//!
//! results.insert("validate".to_string(), json!(null));
//! assert!(report.is_ready(&results));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};

/// Results of completed jobs, keyed by job ID.
pub type JobResults = HashMap<String, JsonValue>;

/// A readiness predicate over [`JobResults`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Always ready. Used for workflow entry points.
    #[default]
    Immediately,
    /// Ready once the named job has completed, whatever its result.
    After(String),
    /// Ready when every sub-trigger is ready. Empty is always ready.
    AllOf(Vec<Trigger>),
    /// Ready when at least one sub-trigger is ready. Empty is never ready.
    AnyOf(Vec<Trigger>),
}

impl Trigger {
    pub fn immediately() -> Self {
        Self::Immediately
    }

    pub fn after(job_id: impl Into<String>) -> Self {
        Self::After(job_id.into())
    }

    pub fn all_of(triggers: impl IntoIterator<Item = Trigger>) -> Self {
        Self::AllOf(triggers.into_iter().collect())
    }

    pub fn any_of(triggers: impl IntoIterator<Item = Trigger>) -> Self {
        Self::AnyOf(triggers.into_iter().collect())
    }

    /// Ready once every listed job has completed.
    pub fn after_jobs<I, S>(job_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::all_of(job_ids.into_iter().map(Self::after))
    }

    /// Ready once any listed job has completed.
    pub fn after_any_job<I, S>(job_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::any_of(job_ids.into_iter().map(Self::after))
    }

    /// Evaluates the trigger against the completed results.
    ///
    /// Only key presence matters: a job that completed with `null` still satisfies
    /// [`Trigger::After`].
    pub fn is_ready(&self, completed: &JobResults) -> bool {
        match self {
            Self::Immediately => true,
            Self::After(job_id) => completed.contains_key(job_id),
            Self::AllOf(triggers) => triggers.iter().all(|t| t.is_ready(completed)),
            Self::AnyOf(triggers) => triggers.iter().any(|t| t.is_ready(completed)),
        }
    }

    /// Every job ID mentioned anywhere in the trigger.
    pub fn referenced_jobs(&self) -> BTreeSet<&str> {
        let mut ids = BTreeSet::new();
        self.collect_referenced(&mut ids);
        ids
    }

    fn collect_referenced<'a>(&'a self, ids: &mut BTreeSet<&'a str>) {
        match self {
            Self::Immediately => {}
            Self::After(job_id) => {
                ids.insert(job_id.as_str());
            }
            Self::AllOf(triggers) | Self::AnyOf(triggers) => {
                for trigger in triggers {
                    trigger.collect_referenced(ids);
                }
            }
        }
    }

    /// Job IDs that must have completed for the trigger to be ready.
    ///
    /// `AllOf` requires the union of its children, `AnyOf` only the jobs every
    /// alternative requires.
    pub fn required_jobs(&self) -> BTreeSet<&str> {
        match self {
            Self::Immediately => BTreeSet::new(),
            Self::After(job_id) => BTreeSet::from([job_id.as_str()]),
            Self::AllOf(triggers) => triggers.iter().flat_map(|t| t.required_jobs()).collect(),
            Self::AnyOf(triggers) => {
                let mut sets = triggers.iter().map(|t| t.required_jobs());
                let Some(first) = sets.next() else {
                    return BTreeSet::new();
                };
                sets.fold(first, |acc, set| acc.intersection(&set).copied().collect())
            }
        }
    }
}
