//! Precision and recall of truncated test runs.
//!
//! A selector decides how much of a prioritized job to run. Precision is the
//! share of selected tests that fail, recall the share of failing tests that
//! were selected.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::AnalysisResult;
use crate::stats::nan_median;
use crate::test_log::{Job, TestExecutionRecord, TestLog};

/// Selection policy family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    /// Run a fixed number of tests.
    Fixed,
    /// Run until a streak of passing tests.
    Green,
}

impl SelectorKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fixed" => Some(Self::Fixed),
            "green" => Some(Self::Green),
            _ => None,
        }
    }

    pub fn with_parameter(self, n: usize) -> Selector {
        match self {
            Self::Fixed => Selector::FixedOffset(n),
            Self::Green => Selector::GreenStreak(n),
        }
    }
}

impl fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Green => write!(f, "green"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    /// The first `n` tests.
    FixedOffset(usize),
    /// Everything up to and including the first run of `n` consecutive
    /// passing tests. A job shorter than `n` runs completely; a job with no
    /// such run stops after its first test.
    GreenStreak(usize),
}

impl Selector {
    pub fn kind(&self) -> SelectorKind {
        match self {
            Self::FixedOffset(_) => SelectorKind::Fixed,
            Self::GreenStreak(_) => SelectorKind::Green,
        }
    }

    pub fn parameter(&self) -> usize {
        match self {
            Self::FixedOffset(n) | Self::GreenStreak(n) => *n,
        }
    }

    /// The selected prefix of the job's records.
    pub fn select<'j, 'a>(
        &self,
        records: &'j [&'a TestExecutionRecord],
    ) -> &'j [&'a TestExecutionRecord] {
        match *self {
            Self::FixedOffset(n) => &records[..n.min(records.len())],
            Self::GreenStreak(0) => &records[..0],
            Self::GreenStreak(n) if records.len() < n => records,
            Self::GreenStreak(n) => {
                let mut streak = 0;
                for (i, record) in records.iter().enumerate() {
                    if record.is_red() {
                        streak = 0;
                    } else {
                        streak += 1;
                        if streak == n {
                            return &records[..=i];
                        }
                    }
                }
                // no passing run of length n: only the first test runs
                &records[..1]
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrecisionRecall {
    pub precision: f64,
    /// NaN when the job has no failing tests.
    pub recall: f64,
}

/// Precision and recall of one selector on one job.
pub fn from_job(job: &Job<'_>, selector: Selector) -> AnalysisResult<PrecisionRecall> {
    job.validate()?;

    let selected = selector.select(job.records());
    let selected_red = selected.iter().filter(|r| r.is_red()).count();
    let total_red = job.records().iter().filter(|r| r.is_red()).count();

    let precision = if selected.is_empty() {
        1.0
    } else {
        selected_red as f64 / selected.len() as f64
    };

    Ok(PrecisionRecall {
        precision,
        recall: selected_red as f64 / total_red as f64,
    })
}

/// Median precision and recall of one selector over a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorResult {
    pub selector: SelectorKind,
    pub parameter: usize,
    pub precision: f64,
    pub recall: f64,
}

pub fn from_project(log: &TestLog, selector: Selector) -> AnalysisResult<SelectorResult> {
    let mut precision = Vec::new();
    let mut recall = Vec::new();
    for job in log.jobs() {
        let pr = from_job(&job, selector)?;
        precision.push(pr.precision);
        recall.push(pr.recall);
    }
    Ok(SelectorResult {
        selector: selector.kind(),
        parameter: selector.parameter(),
        precision: nan_median(&precision),
        recall: nan_median(&recall),
    })
}

/// Largest number of distinct failing tests in any job.
pub fn upper_bound(log: &TestLog) -> usize {
    log.jobs()
        .iter()
        .map(|job| {
            job.records()
                .iter()
                .filter(|r| r.is_red())
                .map(|r| r.test_name.as_str())
                .collect::<HashSet<_>>()
                .len()
        })
        .max()
        .unwrap_or(0)
}

/// Evaluate every kind for parameters `0..=upper_bound(log)`.
pub fn sweep(log: &TestLog, kinds: &[SelectorKind]) -> AnalysisResult<Vec<SelectorResult>> {
    let bound = upper_bound(log);
    let mut results = Vec::with_capacity(kinds.len() * (bound + 1));
    for kind in kinds {
        for n in 0..=bound {
            results.push(from_project(log, kind.with_parameter(n))?);
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_log::fixtures::job_with_reds;

    fn run(reds: &[u32], selector: Selector) -> PrecisionRecall {
        let records = job_with_reds(1, reds);
        let job = Job::new(records.iter().collect());
        from_job(&job, selector).unwrap()
    }

    #[test]
    fn test_fixed_offset_zero_selects_nothing() {
        let pr = run(&[1, 0, 1], Selector::FixedOffset(0));
        assert_eq!(pr.precision, 1.0);
        assert_eq!(pr.recall, 0.0);
    }

    #[test]
    fn test_fixed_offset_prefix() {
        let pr = run(&[1, 0, 1, 0], Selector::FixedOffset(2));
        assert_eq!(pr.precision, 0.5);
        assert_eq!(pr.recall, 0.5);
    }

    #[test]
    fn test_fixed_offset_beyond_job_selects_all() {
        let pr = run(&[1, 0], Selector::FixedOffset(10));
        assert_eq!(pr.precision, 0.5);
        assert_eq!(pr.recall, 1.0);
    }

    #[test]
    fn test_green_streak_stops_after_passing_run() {
        let records = job_with_reds(1, &[1, 0, 1, 0, 0, 1]);
        let refs: Vec<&TestExecutionRecord> = records.iter().collect();
        let selected = Selector::GreenStreak(2).select(&refs);
        assert_eq!(selected.len(), 5);

        let pr = run(&[1, 0, 1, 0, 0, 1], Selector::GreenStreak(2));
        assert_eq!(pr.precision, 2.0 / 5.0);
        assert!((pr.recall - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_green_streak_without_run_stops_after_first_test() {
        let records = job_with_reds(1, &[1, 1, 1]);
        let refs: Vec<&TestExecutionRecord> = records.iter().collect();
        assert_eq!(Selector::GreenStreak(2).select(&refs).len(), 1);

        let pr = run(&[1, 1, 1], Selector::GreenStreak(2));
        assert_eq!(pr.precision, 1.0);
        assert!((pr.recall - 1.0 / 3.0).abs() < 1e-12);

        let pr = run(&[1, 0, 1, 0], Selector::GreenStreak(2));
        assert_eq!(pr.precision, 1.0);
        assert_eq!(pr.recall, 0.5);
    }

    #[test]
    fn test_green_streak_longer_than_job_selects_all() {
        let records = job_with_reds(1, &[1, 0]);
        let refs: Vec<&TestExecutionRecord> = records.iter().collect();
        assert_eq!(Selector::GreenStreak(3).select(&refs).len(), 2);

        let pr = run(&[1, 0], Selector::GreenStreak(3));
        assert_eq!(pr.precision, 0.5);
        assert_eq!(pr.recall, 1.0);
        assert_eq!(run(&[1, 0], Selector::GreenStreak(0)).precision, 1.0);
    }

    #[test]
    fn test_upper_bound_and_sweep() {
        let mut records = job_with_reds(1, &[1, 1, 0]);
        records.extend(job_with_reds(2, &[0, 1]));
        let log = TestLog::new(records);
        assert_eq!(upper_bound(&log), 2);

        let results = sweep(&log, &[SelectorKind::Fixed, SelectorKind::Green]).unwrap();
        assert_eq!(results.len(), 6);
        assert_eq!(results[0].selector, SelectorKind::Fixed);
        assert_eq!(results[2].parameter, 2);
        // fixed(2): job 1 recall 1.0, job 2 recall 1.0
        assert_eq!(results[2].recall, 1.0);
        assert_eq!(results[3].selector, SelectorKind::Green);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(SelectorKind::parse("Fixed"), Some(SelectorKind::Fixed));
        assert_eq!(SelectorKind::parse("green"), Some(SelectorKind::Green));
        assert_eq!(SelectorKind::parse("other"), None);
    }
}
