//! Failure distance: how many failed builds ago the failures of a build last occurred.
//!
//! For example, if test T fails in build X and last failed five failed builds
//! earlier, while test U in build X also failed in the build right before,
//! build X has distance 1. Builds whose failing tests never failed before have
//! no distance.

pub mod history;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::error::{AnalysisError, AnalysisResult};
pub use history::{
    BuildSnapshot, BuildWindow, BuildWindows, DuplicateBuildNumber, FailedBuild, FailureHistory,
};

/// Failure distance of one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDistance {
    #[serde(rename = "travisBuildId")]
    pub build_id: u64,
    #[serde(rename = "travisBuildNumber")]
    pub build_number: u64,
    /// `None` when none of the build's failing tests failed in an earlier build.
    pub distance: Option<usize>,
}

/// A prior build ignored because it finished after the scanned build started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPrior {
    pub build_number: u64,
    pub prior_build_number: u64,
}

/// Output of a failure distance scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistanceReport {
    /// One entry per failed build, most recent first.
    pub distances: Vec<BuildDistance>,
    pub skipped_priors: Vec<SkippedPrior>,
}

/// Scan the history from the most recent build backwards.
///
/// Each step from index `i` to `i + 1` goes one failed build further into the
/// past. When `windows` are given, a prior build whose window ends after the
/// scanned build began is not treated as being in the past: build numbers in
/// CI archives are sometimes reassigned, so numbering and wall-clock time can
/// disagree.
pub fn compute_distances(
    history: &FailureHistory,
    windows: Option<&BuildWindows>,
) -> AnalysisResult<DistanceReport> {
    let builds = &history.builds;
    let mut report = DistanceReport::default();

    for (index, build) in builds.iter().enumerate() {
        let begin = match windows {
            Some(w) => Some(window_of(w, build.build_number)?.begin),
            None => None,
        };

        let mut red_tests: HashSet<&str> = build.failing_tests.iter().map(String::as_str).collect();
        let mut nearest: Option<usize> = None;

        let mut prior_index = index + 1;
        while prior_index < builds.len() && !red_tests.is_empty() {
            let prior = &builds[prior_index];

            if let (Some(begin), Some(w)) = (begin, windows) {
                if window_of(w, prior.build_number)?.end > begin {
                    debug!(
                        build_number = build.build_number,
                        prior_build_number = prior.build_number,
                        "Prior build ended after scanned build began, skipping"
                    );
                    report.skipped_priors.push(SkippedPrior {
                        build_number: build.build_number,
                        prior_build_number: prior.build_number,
                    });
                    prior_index += 1;
                    continue;
                }
            }

            let before = red_tests.len();
            red_tests.retain(|test| !prior.failing_tests.contains(*test));
            if red_tests.len() < before {
                // later matches are further in the past, so the first one is the minimum
                nearest.get_or_insert(prior_index - index);
            }

            prior_index += 1;
        }

        report.distances.push(BuildDistance {
            build_id: build.build_id,
            build_number: build.build_number,
            distance: nearest,
        });
    }

    Ok(report)
}

fn window_of(windows: &BuildWindows, build_number: u64) -> AnalysisResult<&BuildWindow> {
    windows
        .get(build_number)
        .ok_or(AnalysisError::MissingBuildWindow { build_number })
}

/// Distances as `(build_id, distance)` pairs.
pub fn distance_pairs(report: &DistanceReport) -> Vec<(u64, Option<usize>)> {
    report
        .distances
        .iter()
        .map(|d| (d.build_id, d.distance))
        .collect()
}
