//! Rank-biased overlap between two test orderings.
//!
//! Used to compare the plans of cost-cognizant and plain prioritization for
//! the same job. See Webber, Moffat and Zobel, "A Similarity Measure for
//! Indefinite Rankings" (2010), equation 32 for the extrapolated form.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::{AnalysisError, AnalysisResult};
use crate::test_log::TestLog;

pub const DEFAULT_PERSISTENCE: f64 = 0.98;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobSimilarity {
    #[serde(rename = "travisJobId")]
    pub job_id: u64,
    pub rbo: f64,
}

/// Extrapolated rank-biased overlap of two rankings without duplicates.
///
/// Returns a value in `[0, 1]`; 1 for identical rankings. Two empty rankings
/// are identical, one empty ranking shares nothing with a non-empty one.
pub fn rbo_ext<T>(s: &[T], t: &[T], p: f64) -> f64
where
    T: Eq + std::hash::Hash,
{
    match (s.is_empty(), t.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }

    let (short, long) = if s.len() <= t.len() { (s, t) } else { (t, s) };
    let (sl, ll) = (short.len(), long.len());

    let mut seen_short: HashSet<&T> = HashSet::with_capacity(sl);
    let mut seen_long: HashSet<&T> = HashSet::with_capacity(ll);
    let mut overlap = 0usize;
    // overlaps[d - 1] is the overlap at depth d
    let mut overlaps = Vec::with_capacity(ll);

    for d in 0..ll {
        if d < sl {
            if seen_long.contains(&short[d]) {
                overlap += 1;
            }
            seen_short.insert(&short[d]);
        }
        if seen_short.contains(&long[d]) {
            overlap += 1;
        }
        seen_long.insert(&long[d]);
        overlaps.push(overlap);
    }

    let x_s = overlaps[sl - 1] as f64;
    let x_l = overlaps[ll - 1] as f64;
    let (s_len, l_len) = (sl as f64, ll as f64);

    let mut sum = 0.0;
    for (i, &x_d) in overlaps.iter().enumerate() {
        let depth = (i + 1) as f64;
        let weight = p.powf(depth);
        sum += x_d as f64 / depth * weight;
        if i + 1 > sl {
            sum += x_s * (depth - s_len) / (s_len * depth) * weight;
        }
    }

    (1.0 - p) / p * sum + ((x_l - x_s) / l_len + x_s / s_len) * p.powf(l_len)
}

/// Test names of a job in execution order, first occurrence only.
fn ranking(log: &TestLog) -> BTreeMap<u64, Vec<&str>> {
    let mut rankings: BTreeMap<u64, (HashSet<&str>, Vec<&str>)> = BTreeMap::new();
    for record in log.records() {
        let (seen, order) = rankings.entry(record.job_id).or_default();
        if seen.insert(record.test_name.as_str()) {
            order.push(record.test_name.as_str());
        }
    }
    rankings.into_iter().map(|(job, (_, order))| (job, order)).collect()
}

/// Per-job similarity of two orderings of the same jobs.
pub fn job_similarity(
    left: &TestLog,
    right: &TestLog,
    p: f64,
) -> AnalysisResult<Vec<JobSimilarity>> {
    let left = ranking(left);
    let right = ranking(right);

    let only_left = left.keys().filter(|k| !right.contains_key(k)).count();
    let only_right = right.keys().filter(|k| !left.contains_key(k)).count();
    if only_left > 0 || only_right > 0 {
        return Err(AnalysisError::JobSetMismatch { only_left, only_right });
    }

    Ok(left
        .iter()
        .map(|(&job_id, order)| JobSimilarity {
            job_id,
            rbo: rbo_ext(order, &right[&job_id], p),
        })
        .collect())
}
