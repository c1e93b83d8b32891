use serde::{Deserialize, Serialize};

use crate::apfd_table::ApfdTable;
use crate::stats::{nan_mean, nan_median};

/// APFD statistics of one strategy over a project's jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySummary {
    pub strategy: String,
    pub median: f64,
    pub mean: f64,
    /// Jobs with a defined score.
    pub jobs: usize,
}

/// Summaries for every strategy, best median first. Strategies without any
/// defined score sort last.
pub fn summarize(table: &ApfdTable) -> Vec<StrategySummary> {
    let mut summaries: Vec<StrategySummary> = table
        .strategies()
        .iter()
        .filter_map(|strategy| {
            let scores = table.column(strategy)?;
            Some(StrategySummary {
                strategy: strategy.clone(),
                median: nan_median(&scores),
                mean: nan_mean(&scores),
                jobs: scores.iter().filter(|s| !s.is_nan()).count(),
            })
        })
        .collect();

    summaries.sort_by(|a, b| match (a.median.is_nan(), b.median.is_nan()) {
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        _ => b
            .median
            .partial_cmp(&a.median)
            .unwrap_or(std::cmp::Ordering::Equal),
    });
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apfd::JobScore;

    #[test]
    fn test_summaries_sorted_by_median() {
        let table = ApfdTable::from_scores(vec![
            (
                "random".to_string(),
                vec![JobScore { job_id: 1, apfd: 0.4 }, JobScore { job_id: 2, apfd: 0.6 }],
            ),
            (
                "recently-failed".to_string(),
                vec![JobScore { job_id: 1, apfd: 0.9 }, JobScore { job_id: 2, apfd: f64::NAN }],
            ),
            ("broken".to_string(), vec![JobScore { job_id: 1, apfd: f64::NAN }]),
        ]);

        let summaries = summarize(&table);
        let order: Vec<&str> = summaries.iter().map(|s| s.strategy.as_str()).collect();
        assert_eq!(order, vec!["recently-failed", "random", "broken"]);
        assert_eq!(summaries[0].jobs, 1);
        assert!((summaries[1].median - 0.5).abs() < 1e-12);
        assert_eq!(summaries[2].jobs, 0);
    }
}
