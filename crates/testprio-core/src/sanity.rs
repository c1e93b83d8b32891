use serde::{Deserialize, Serialize};

use crate::apfd_table::ApfdTable;
use crate::settings::StrategyNames;
use crate::stats::is_close;

/// A heuristic that scored above the optimal ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanityViolation {
    pub strategy: String,
    /// Jobs where the heuristic beat the optimal ordering.
    pub jobs: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanityReport {
    pub checked: Vec<String>,
    pub violations: Vec<SanityViolation>,
}

impl SanityReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check that no heuristic outperforms the optimal-failure ordering.
///
/// Returns `None` when the table has no optimal column to compare against.
/// Undefined scores on either side are not compared.
pub fn check_optimal_failure(table: &ApfdTable, names: &StrategyNames) -> Option<SanityReport> {
    let optimal = table.column(&names.optimal)?;
    let job_ids: Vec<u64> = table.job_ids().collect();

    let mut checked = Vec::new();
    let mut violations = Vec::new();

    for strategy in table.strategies().iter().filter(|s| names.is_heuristic(s)) {
        checked.push(strategy.clone());
        let Some(scores) = table.column(strategy) else {
            continue;
        };

        let mut jobs = Vec::new();
        for ((&heuristic, &opt), &job) in scores.iter().zip(&optimal).zip(&job_ids) {
            if heuristic > opt && !is_close(heuristic, opt) {
                jobs.push(job);
            }
        }

        if !jobs.is_empty() {
            violations.push(SanityViolation {
                strategy: strategy.clone(),
                jobs,
            });
        }
    }

    Some(SanityReport { checked, violations })
}
