use serde::{Deserialize, Serialize};

use crate::error::AnalysisResult;
use crate::stats::nan_median;
use crate::test_log::{Job, TestLog};

/// One point of the fault-detection curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Fraction of test methods executed so far (0.0-1.0).
    pub executed: f64,
    /// Fraction of faults detected so far (0.0-1.0), NaN when the job has no faults.
    pub faults: f64,
}

/// APFD score of one job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobScore {
    pub job_id: u64,
    pub apfd: f64,
}

/// Compute the normalized fault-detection curve of a job.
///
/// The curve starts at a synthetic origin and ends at `(1.0, 1.0)`. A job
/// without any failing test has no defined curve: every `faults` value is NaN.
pub fn compute_curve(job: &Job<'_>) -> AnalysisResult<Vec<CurvePoint>> {
    job.validate()?;

    let mut executed = Vec::with_capacity(job.len() + 1);
    let mut red = Vec::with_capacity(job.len() + 1);
    executed.push(0u64);
    red.push(0u64);

    let (mut executed_sum, mut red_sum) = (0u64, 0u64);
    for record in job.records() {
        executed_sum += record.count as u64;
        red_sum += record.red();
        executed.push(executed_sum);
        red.push(red_sum);
    }

    // 0/0 is NaN, which is the intended result for fault-free jobs
    let executed_total = executed_sum as f64;
    let red_total = red_sum as f64;

    Ok(executed
        .into_iter()
        .zip(red)
        .map(|(e, r)| CurvePoint {
            executed: e as f64 / executed_total,
            faults: r as f64 / red_total,
        })
        .collect())
}

/// Area under the curve by the trapezoidal rule.
pub fn compute_score(curve: &[CurvePoint]) -> f64 {
    curve
        .windows(2)
        .map(|w| (w[1].executed - w[0].executed) * (w[1].faults + w[0].faults) / 2.0)
        .sum()
}

/// Score a single job.
pub fn job_apfd(job: &Job<'_>) -> AnalysisResult<f64> {
    Ok(compute_score(&compute_curve(job)?))
}

/// Score every job of a log, in ascending job id order.
pub fn job_scores(log: &TestLog) -> AnalysisResult<Vec<JobScore>> {
    log.jobs()
        .iter()
        .map(|job| {
            let apfd = job_apfd(job)?;
            Ok(JobScore {
                // validated above, so the job is non-empty
                job_id: job.job_id().unwrap_or_default(),
                apfd,
            })
        })
        .collect()
}

/// Median APFD over the jobs of a log, ignoring jobs without faults.
pub fn median_score(log: &TestLog) -> AnalysisResult<f64> {
    let scores: Vec<f64> = job_scores(log)?.iter().map(|s| s.apfd).collect();
    Ok(nan_median(&scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::test_log::fixtures::{job_with_reds, record};

    fn curve_for(reds: &[u32]) -> Vec<CurvePoint> {
        let records = job_with_reds(1, reds);
        let job = Job::new(records.iter().collect());
        compute_curve(&job).unwrap()
    }

    #[test]
    fn test_curve_for_alternating_failures() {
        let curve = curve_for(&[0, 1, 0, 1]);
        let executed: Vec<f64> = curve.iter().map(|p| p.executed).collect();
        let faults: Vec<f64> = curve.iter().map(|p| p.faults).collect();
        assert_eq!(executed, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(faults, vec![0.0, 0.0, 0.5, 0.5, 1.0]);
        assert!((compute_score(&curve) - 0.375).abs() < 1e-12);
    }

    #[test]
    fn test_curve_is_monotonic_and_ends_at_one() {
        let curve = curve_for(&[2, 0, 0, 1, 0, 3, 0]);
        for pair in curve.windows(2) {
            assert!(pair[1].executed >= pair[0].executed);
            assert!(pair[1].faults >= pair[0].faults);
        }
        let last = curve.last().unwrap();
        assert_eq!(last.executed, 1.0);
        assert_eq!(last.faults, 1.0);
    }

    #[test]
    fn test_early_faults_score_high() {
        let mut reds = vec![0; 100];
        reds[0] = 1;
        let score = compute_score(&curve_for(&reds));
        assert!(score > 0.98, "score was {}", score);
    }

    #[test]
    fn test_late_faults_score_low() {
        let mut reds = vec![0; 100];
        reds[99] = 1;
        let score = compute_score(&curve_for(&reds));
        assert!(score < 0.01, "score was {}", score);
    }

    #[test]
    fn test_green_job_is_undefined() {
        let curve = curve_for(&[0, 0, 0]);
        assert!(curve.iter().all(|p| p.faults.is_nan()));
        assert!(compute_score(&curve).is_nan());
    }

    #[test]
    fn test_count_weights_executed_fraction() {
        let mut records = job_with_reds(1, &[0, 1]);
        records[0].count = 3;
        let job = Job::new(records.iter().collect());
        let curve = compute_curve(&job).unwrap();
        assert_eq!(curve[1].executed, 0.75);
        assert!((compute_score(&curve) - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_recomputation_is_bit_identical() {
        let a = compute_score(&curve_for(&[0, 1, 1, 0, 0, 1]));
        let b = compute_score(&curve_for(&[0, 1, 1, 0, 0, 1]));
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_index_gap_fails_fast() {
        let a = record(1, "A", 0, 1);
        let b = record(1, "B", 3, 0);
        let job = Job::new(vec![&a, &b]);
        assert!(matches!(compute_curve(&job), Err(AnalysisError::IndexGap { .. })));
    }

    #[test]
    fn test_median_score_ignores_green_jobs() {
        let mut records = job_with_reds(1, &[1, 0]);
        records.extend(job_with_reds(2, &[0, 1]));
        records.extend(job_with_reds(3, &[0, 0]));
        let log = TestLog::new(records);

        let scores = job_scores(&log).unwrap();
        assert_eq!(scores.len(), 3);
        assert_eq!(scores[0].job_id, 1);
        assert!((scores[0].apfd - 0.75).abs() < 1e-12);
        assert!(scores[2].apfd.is_nan());

        let median = median_score(&log).unwrap();
        assert!((median - 0.5).abs() < 1e-12);
    }
}
