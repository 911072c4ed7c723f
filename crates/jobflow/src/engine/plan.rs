//! Dry-run schedule of an engine.

use serde::{Deserialize, Serialize};

/// The batches a fully successful run would execute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Job IDs per batch, each batch in registration order.
    pub batches: Vec<Vec<String>>,
    /// Jobs that never become ready within the cycle ceiling.
    pub unreachable: Vec<String>,
}

impl ExecutionPlan {
    pub(crate) fn new(batches: Vec<Vec<String>>, unreachable: Vec<String>) -> Self {
        Self {
            batches,
            unreachable,
        }
    }

    /// True when every registered job is scheduled.
    pub fn is_complete(&self) -> bool {
        self.unreachable.is_empty()
    }

    pub fn max_concurrency(&self) -> usize {
        self.batches.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// 1-based batch number of a job, matching `JobExecution::batch_id`.
    pub fn batch_of(&self, job_id: &str) -> Option<usize> {
        self.batches
            .iter()
            .position(|batch| batch.iter().any(|id| id == job_id))
            .map(|index| index + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> ExecutionPlan {
        ExecutionPlan::new(
            vec![
                vec!["fetch".to_string()],
                vec!["parse".to_string(), "validate".to_string()],
            ],
            vec!["orphan".to_string()],
        )
    }

    #[test]
    fn test_plan_queries() {
        let plan = plan();
        assert!(!plan.is_complete());
        assert_eq!(plan.max_concurrency(), 2);
        assert_eq!(plan.batch_of("fetch"), Some(1));
        assert_eq!(plan.batch_of("validate"), Some(2));
        assert_eq!(plan.batch_of("orphan"), None);
    }

    #[test]
    fn test_empty_plan() {
        let plan = ExecutionPlan::default();
        assert!(plan.is_complete());
        assert_eq!(plan.max_concurrency(), 0);
    }
}
