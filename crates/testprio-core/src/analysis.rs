//! Per-project analyses over the evaluation layout.
//!
//! Each function loads what it needs for one project, runs the computation
//! and returns a serializable result. Writing outputs is left to the caller.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::aggregate::{aggregate, ComparisonRow};
use crate::apfd_table::ApfdTable;
use crate::budget::{self, BudgetPoint, BudgetProfile};
use crate::failure_distance::{
    compute_distances, BuildSnapshot, DistanceReport, DuplicateBuildNumber, FailureHistory,
};
use crate::layout::{Layout, Project};
use crate::rbo::{job_similarity, JobSimilarity};
use crate::selection::{sweep, SelectorKind, SelectorResult};
use crate::settings::Settings;
use crate::stats::nan_median;
use crate::test_log::TestLog;

/// Compute the job × strategy APFD table of a project from its strategy logs.
pub fn apfd_table(layout: &Layout, project: &Project) -> Result<ApfdTable> {
    let strategies = layout.strategies(project)?;
    if strategies.is_empty() {
        anyhow::bail!(
            "No strategy logs found for {} in {}/",
            project.name,
            project.path.join(layout.qualifier()).display()
        );
    }
    ApfdTable::compute(&strategies)
}

/// The stored APFD table, computed and stored first when missing.
pub fn load_or_compute_apfd_table(layout: &Layout, project: &Project) -> Result<ApfdTable> {
    let path = layout.apfd_path(project)?;
    if path.is_file() {
        return ApfdTable::read(&path);
    }
    let table = apfd_table(layout, project)?;
    table.write(&path)?;
    info!(path = %path.display(), "Written APFD table");
    Ok(table)
}

/// Failure distances of a project joined with per-build APFD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceComparison {
    pub project: String,
    pub rows: Vec<ComparisonRow>,
    pub report: DistanceReport,
    pub duplicates: Vec<DuplicateBuildNumber>,
}

/// Join failure distances and APFD for one project.
///
/// `strategies` restricts the APFD columns (all when empty). Without a build
/// snapshot the scan runs without the time-window guard.
pub fn distance_comparison(
    layout: &Layout,
    project: &Project,
    settings: &Settings,
    snapshot: Option<&BuildSnapshot>,
    strategies: &[String],
) -> Result<DistanceComparison> {
    let untreated_path = layout.strategy_path(project, &settings.strategies.untreated);
    let untreated = TestLog::from_path(&untreated_path)?;

    let mut table = load_or_compute_apfd_table(layout, project)?;
    if !strategies.is_empty() {
        table = table.select(strategies)?;
    }

    let history = FailureHistory::from_log(&untreated);
    let windows = snapshot.map(|s| s.windows_for(&project.db_name()));
    let report = compute_distances(&history, windows.as_ref())
        .with_context(|| format!("Failure distance scan failed for {}", project.name))?;
    let rows = aggregate(&table, &untreated, &report)
        .with_context(|| format!("Joining APFD and distances failed for {}", project.name))?;

    info!(
        project = %project.name,
        builds = history.len(),
        rows = rows.len(),
        skipped_priors = report.skipped_priors.len(),
        "Computed failure distances"
    );

    Ok(DistanceComparison {
        project: project.name.clone(),
        rows,
        report,
        duplicates: history.duplicates,
    })
}

/// Budget profiles of a project's optimal-failure ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAnalysis {
    pub project: String,
    pub profiles: Vec<BudgetProfile>,
    pub mean_by_budget: Vec<BudgetPoint>,
    pub median_budget: Option<f64>,
    /// Rows whose zero duration was replaced by the nominal duration.
    pub substituted: usize,
}

pub fn budget_analysis(
    layout: &Layout,
    project: &Project,
    settings: &Settings,
) -> Result<BudgetAnalysis> {
    let path = layout.strategy_path(project, &settings.strategies.optimal);
    let mut log = TestLog::from_path(&path)?;
    let substituted = budget::substitute_zero_durations(&mut log, settings.nominal_duration);

    let profiles = budget::profile(&log, &settings.budgets);
    let mean_by_budget = budget::mean_by_budget(&profiles, &settings.budgets);
    let median_budget = budget::median_preferred_budget(&profiles);

    Ok(BudgetAnalysis {
        project: project.name.clone(),
        profiles,
        mean_by_budget,
        median_budget,
        substituted,
    })
}

/// Rank similarity of the optimal and the cost-cognizant optimal orderings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityAnalysis {
    pub project: String,
    pub jobs: Vec<JobSimilarity>,
    pub median: f64,
}

pub fn rank_similarity(
    layout: &Layout,
    project: &Project,
    settings: &Settings,
) -> Result<SimilarityAnalysis> {
    let names = &settings.strategies;
    let left = TestLog::from_path(&layout.strategy_path(project, &names.optimal))?;
    let right = TestLog::from_path(&layout.strategy_path(project, &names.optimal_duration))?;

    let jobs = job_similarity(&left, &right, settings.rbo_persistence)
        .with_context(|| format!("Comparing orderings failed for {}", project.name))?;
    let values: Vec<f64> = jobs.iter().map(|j| j.rbo).collect();

    Ok(SimilarityAnalysis {
        project: project.name.clone(),
        median: nan_median(&values),
        jobs,
    })
}

/// Precision/recall sweep of one strategy.
pub fn precision_recall(
    layout: &Layout,
    project: &Project,
    strategy: &str,
    kinds: &[SelectorKind],
) -> Result<Vec<SelectorResult>> {
    let log = TestLog::from_path(&layout.strategy_path(project, strategy))?;
    sweep(&log, kinds).with_context(|| format!("Selector sweep failed for {}", project.name))
}

/// Write serializable rows as CSV with a header.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
