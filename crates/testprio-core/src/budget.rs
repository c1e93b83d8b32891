use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::stats::nan_median;
use crate::test_log::{Job, TestLog};

/// Candidate budgets in seconds.
pub const DEFAULT_BUDGETS: [f64; 3] = [0.1, 1.0, 10.0];

/// Duration substituted for zero-duration rows before budget accounting.
pub const DEFAULT_NOMINAL_DURATION: f64 = 0.25;

/// Detection rate of one job at one budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetPoint {
    pub budget_secs: f64,
    /// Percentage of faults detected (0-100), NaN when the job has no faults.
    pub percent_detected: f64,
}

/// Budget-vs-detection profile of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetProfile {
    pub job_id: u64,
    pub points: Vec<BudgetPoint>,
}

impl BudgetProfile {
    /// The first budget reaching the highest detection rate, if any rate is defined.
    pub fn preferred_budget(&self) -> Option<f64> {
        let mut best: Option<BudgetPoint> = None;
        for point in self.points.iter().filter(|p| !p.percent_detected.is_nan()) {
            match best {
                Some(b) if point.percent_detected <= b.percent_detected => {}
                _ => best = Some(*point),
            }
        }
        best.map(|b| b.budget_secs)
    }
}

/// Percentage of a job's faults detected when execution stops once the
/// cumulative duration exceeds `budget_secs`.
///
/// Records are executed in order; a record counts as executed when the
/// cumulative duration including it is still within the budget. A duration of
/// exactly zero is taken literally and adds nothing to the spend, so callers
/// with unmeasured durations should run [`substitute_zero_durations`] first.
pub fn percent_detected(job: &Job<'_>, budget_secs: f64) -> f64 {
    let faults = job.total_red() as f64;

    let mut spent = 0.0;
    let mut found = 0u64;
    for record in job.records() {
        spent += record.duration;
        if spent <= budget_secs {
            found += record.red();
        }
    }

    (found as f64 / faults) * 100.0
}

/// Profile every job of a log over the given budgets.
pub fn profile(log: &TestLog, budgets: &[f64]) -> Vec<BudgetProfile> {
    log.jobs()
        .iter()
        .map(|job| BudgetProfile {
            job_id: job.job_id().unwrap_or_default(),
            points: budgets
                .iter()
                .map(|&budget_secs| BudgetPoint {
                    budget_secs,
                    percent_detected: percent_detected(job, budget_secs),
                })
                .collect(),
        })
        .collect()
}

/// Median over jobs of each job's preferred budget.
pub fn median_preferred_budget(profiles: &[BudgetProfile]) -> Option<f64> {
    let preferred: Vec<f64> = profiles.iter().filter_map(|p| p.preferred_budget()).collect();
    let median = nan_median(&preferred);
    (!median.is_nan()).then_some(median)
}

/// Mean detection rate per budget across jobs with a defined rate.
pub fn mean_by_budget(profiles: &[BudgetProfile], budgets: &[f64]) -> Vec<BudgetPoint> {
    budgets
        .iter()
        .enumerate()
        .map(|(i, &budget_secs)| {
            let rates: Vec<f64> = profiles
                .iter()
                .filter_map(|p| p.points.get(i))
                .map(|p| p.percent_detected)
                .collect();
            BudgetPoint {
                budget_secs,
                percent_detected: crate::stats::nan_mean(&rates),
            }
        })
        .collect()
}

/// Replace zero durations with `nominal` seconds. Returns the number of rows changed.
pub fn substitute_zero_durations(log: &mut TestLog, nominal: f64) -> usize {
    let mut replaced = 0;
    for record in log.records_mut() {
        if record.duration == 0.0 {
            record.duration = nominal;
            replaced += 1;
        }
    }
    if replaced > 0 {
        warn!(replaced, nominal, "Substituted nominal duration for zero-duration tests");
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_log::fixtures::job_with_reds;

    fn with_durations(reds: &[u32], durations: &[f64]) -> TestLog {
        let mut records = job_with_reds(1, reds);
        for (record, d) in records.iter_mut().zip(durations) {
            record.duration = *d;
        }
        TestLog::new(records)
    }

    #[test]
    fn test_unbounded_budget_detects_everything() {
        let log = with_durations(&[0, 1, 0, 2], &[1.0, 2.0, 3.0, 4.0]);
        let jobs = log.jobs();
        assert_eq!(percent_detected(&jobs[0], f64::INFINITY), 100.0);
    }

    #[test]
    fn test_zero_budget_detects_nothing() {
        let log = with_durations(&[1, 1], &[0.5, 0.5]);
        let jobs = log.jobs();
        assert_eq!(percent_detected(&jobs[0], 0.0), 0.0);
    }

    #[test]
    fn test_zero_duration_head_counts_at_zero_budget() {
        let log = with_durations(&[1, 1], &[0.0, 0.5]);
        let jobs = log.jobs();
        assert_eq!(percent_detected(&jobs[0], 0.0), 50.0);
    }

    #[test]
    fn test_budget_boundary_is_inclusive() {
        let log = with_durations(&[1, 0, 1, 1], &[1.0, 1.0, 1.0, 1.0]);
        let jobs = log.jobs();
        let rate = percent_detected(&jobs[0], 3.0);
        assert!((rate - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_fault_free_job_is_undefined() {
        let log = with_durations(&[0, 0], &[1.0, 1.0]);
        let jobs = log.jobs();
        assert!(percent_detected(&jobs[0], 10.0).is_nan());
    }

    #[test]
    fn test_profile_and_preferred_budget() {
        // faults sit behind 0.5s and 5s of work
        let log = with_durations(&[0, 1, 0, 1], &[0.5, 0.4, 4.0, 0.1]);
        let profiles = profile(&log, &DEFAULT_BUDGETS);
        assert_eq!(profiles.len(), 1);
        let rates: Vec<f64> = profiles[0].points.iter().map(|p| p.percent_detected).collect();
        assert_eq!(rates, vec![0.0, 50.0, 100.0]);
        assert_eq!(profiles[0].preferred_budget(), Some(10.0));
    }

    #[test]
    fn test_preferred_budget_takes_first_maximum() {
        let profile = BudgetProfile {
            job_id: 1,
            points: vec![
                BudgetPoint { budget_secs: 0.1, percent_detected: 100.0 },
                BudgetPoint { budget_secs: 1.0, percent_detected: 100.0 },
            ],
        };
        assert_eq!(profile.preferred_budget(), Some(0.1));
    }

    #[test]
    fn test_median_preferred_budget_skips_undefined_jobs() {
        let mut records = job_with_reds(1, &[1]);
        records.extend(job_with_reds(2, &[0]));
        let mut third = job_with_reds(3, &[0, 1]);
        third[0].duration = 5.0;
        records.extend(third);
        let profiles = profile(&TestLog::new(records), &DEFAULT_BUDGETS);

        // job 1 peaks at 1.0, job 2 has no faults, job 3 peaks at 10.0
        assert_eq!(median_preferred_budget(&profiles), Some(5.5));
    }

    #[test]
    fn test_substitute_zero_durations() {
        let mut log = with_durations(&[0, 1, 0], &[0.0, 2.0, 0.0]);
        assert_eq!(substitute_zero_durations(&mut log, 0.25), 2);
        let durations: Vec<f64> = log.records().iter().map(|r| r.duration).collect();
        assert_eq!(durations, vec![0.25, 2.0, 0.25]);
    }

    #[test]
    fn test_mean_by_budget() {
        let mut records = job_with_reds(1, &[1]);
        records.extend(job_with_reds(2, &[0, 1]));
        let means = mean_by_budget(&profile(&TestLog::new(records), &[1.0, 2.0]), &[1.0, 2.0]);
        assert_eq!(means[0].percent_detected, 50.0);
        assert_eq!(means[1].percent_detected, 100.0);
    }
}
