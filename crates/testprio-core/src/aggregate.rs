use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::apfd_table::ApfdTable;
use crate::error::{AnalysisError, AnalysisResult};
use crate::failure_distance::DistanceReport;
use crate::stats::nan_median;
use crate::test_log::TestLog;

/// Median APFD of a build under one strategy, next to the build's failure distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    #[serde(rename = "travisBuildId")]
    pub build_id: u64,
    pub strategy: String,
    pub apfd: f64,
    #[serde(rename = "distance")]
    pub failure_distance: Option<usize>,
}

/// Map every job of the log to its build, enforcing one build per job.
pub fn job_to_build(log: &TestLog) -> AnalysisResult<HashMap<u64, u64>> {
    let mut mapping = HashMap::new();
    for (job_id, build_id) in log.job_builds() {
        if let Some(existing) = mapping.insert(job_id, build_id) {
            if existing != build_id {
                return Err(AnalysisError::JoinCardinality {
                    key: "travisJobId",
                    detail: format!(
                        "job {} belongs to builds {} and {}",
                        job_id, existing, build_id
                    ),
                });
            }
        }
    }
    Ok(mapping)
}

/// Median APFD per `(build_id, strategy)`.
pub fn build_apfd(
    table: &ApfdTable,
    jobs: &HashMap<u64, u64>,
) -> AnalysisResult<BTreeMap<(u64, String), f64>> {
    let mut grouped: BTreeMap<(u64, String), Vec<f64>> = BTreeMap::new();

    for score in table.melt() {
        let build_id = *jobs.get(&score.job_id).ok_or_else(|| AnalysisError::JoinCardinality {
            key: "travisJobId",
            detail: format!("job {} has no build in the untreated log", score.job_id),
        })?;
        grouped
            .entry((build_id, score.strategy))
            .or_default()
            .push(score.apfd);
    }

    Ok(grouped
        .into_iter()
        .map(|(key, values)| (key, nan_median(&values)))
        .collect())
}

/// Join per-build APFD with per-build failure distances.
///
/// Builds without a distance entry (builds that never failed) are dropped.
pub fn aggregate(
    table: &ApfdTable,
    log: &TestLog,
    distances: &DistanceReport,
) -> AnalysisResult<Vec<ComparisonRow>> {
    let jobs = job_to_build(log)?;
    let per_build = build_apfd(table, &jobs)?;

    let mut by_build: HashMap<u64, Option<usize>> =
        HashMap::with_capacity(distances.distances.len());
    for entry in &distances.distances {
        if by_build.insert(entry.build_id, entry.distance).is_some() {
            return Err(AnalysisError::JoinCardinality {
                key: "travisBuildId",
                detail: format!("build {} has more than one distance", entry.build_id),
            });
        }
    }

    Ok(per_build
        .into_iter()
        .filter_map(|((build_id, strategy), apfd)| {
            by_build.get(&build_id).map(|&failure_distance| ComparisonRow {
                build_id,
                strategy,
                apfd,
                failure_distance,
            })
        })
        .collect())
}
