use colored::*;
use std::path::Path;

use testprio_core::analysis::{BudgetAnalysis, DistanceComparison, SimilarityAnalysis};
use testprio_core::apfd::JobScore;
use testprio_core::apfd_table::ApfdTable;
use testprio_core::sanity::SanityReport;
use testprio_core::selection::SelectorResult;
use testprio_core::stats::nan_median;
use testprio_core::summary::StrategySummary;

fn header(title: &str, project: &str) {
    println!();
    println!(
        "{}",
        format!(" testprio v{}: {} {}", env!("CARGO_PKG_VERSION"), title, project).bold()
    );
    println!();
}

fn score(value: f64) -> String {
    if value.is_nan() {
        "n/a".dimmed().to_string()
    } else {
        format!("{:.3}", value)
    }
}

/// Colour an APFD-like score in `[0, 1]`.
fn rated(value: f64) -> ColoredString {
    if value.is_nan() {
        return "n/a".dimmed();
    }
    let text = format!("{:.3}", value);
    if value >= 0.75 {
        text.as_str().green()
    } else if value >= 0.5 {
        text.as_str().yellow()
    } else {
        text.as_str().red()
    }
}

pub fn print_apfd_table(project: &str, table: &ApfdTable, path: &Path) {
    header("APFD table for", project);

    println!(" {}", "Strategies".bold().underline());
    for strategy in table.strategies() {
        let median = table
            .column(strategy)
            .map(|c| nan_median(&c))
            .unwrap_or(f64::NAN);
        println!(" {} {:<32} median {}", "|-".dimmed(), strategy, rated(median));
    }
    println!();
    println!(
        " {} {} jobs x {} strategies",
        "|-".dimmed(),
        table.len(),
        table.strategies().len()
    );
    println!(" {} Written to {}", "|-".dimmed(), path.display().to_string().cyan());
    println!();
}

pub fn print_score(path: &Path, scores: &[JobScore], median: f64) {
    header("APFD of", &path.display().to_string());

    let defined = scores.iter().filter(|s| !s.apfd.is_nan()).count();
    println!(
        " {} Jobs: {} ({} with failures)",
        "|-".dimmed(),
        scores.len(),
        defined
    );
    println!(" {} Median APFD: {}", "|-".dimmed(), rated(median).bold());
    println!();
}

pub fn print_budget(analysis: &BudgetAnalysis) {
    header("Budget profile for", &analysis.project);

    if analysis.substituted > 0 {
        println!(
            " {} {} zero-duration rows counted as nominal duration",
            "!".yellow().bold(),
            analysis.substituted
        );
        println!();
    }

    println!(" {}", "Mean detection by budget".bold().underline());
    for point in &analysis.mean_by_budget {
        let percent = if point.percent_detected.is_nan() {
            "n/a".dimmed().to_string()
        } else {
            format!("{:.1}%", point.percent_detected)
        };
        println!(" {} {:>8}s  {}", "|-".dimmed(), point.budget_secs, percent);
    }
    println!();

    println!(" {}", "Summary".bold().underline());
    println!(" {} Jobs profiled: {}", "|-".dimmed(), analysis.profiles.len());
    match analysis.median_budget {
        Some(budget) => println!(
            " {} Median preferred budget: {}",
            "|-".dimmed(),
            format!("{}s", budget).green().bold()
        ),
        None => println!(
            " {} Median preferred budget: {}",
            "|-".dimmed(),
            "n/a (no job with failures)".dimmed()
        ),
    }
    println!();
}

pub fn print_distance(comparison: &DistanceComparison, path: &Path) {
    header("Failure distance for", &comparison.project);

    let distances = &comparison.report.distances;
    let recurring = distances.iter().filter(|d| d.distance.is_some()).count();

    println!(" {}", "Failed builds".bold().underline());
    println!(" {} Total: {}", "|-".dimmed(), distances.len());
    println!(" {} With recurring failures: {}", "|-".dimmed(), recurring);
    println!(
        " {} First-time failures: {}",
        "|-".dimmed(),
        distances.len() - recurring
    );

    let values: Vec<f64> = distances
        .iter()
        .filter_map(|d| d.distance.map(|v| v as f64))
        .collect();
    if !values.is_empty() {
        println!(" {} Median distance: {}", "|-".dimmed(), nan_median(&values));
    }
    println!();

    if !comparison.report.skipped_priors.is_empty() || !comparison.duplicates.is_empty() {
        println!(" {}", "Anomalies".bold().underline());
        if !comparison.report.skipped_priors.is_empty() {
            println!(
                " {} {} prior builds ended after the scanned build started",
                "!".yellow().bold(),
                comparison.report.skipped_priors.len()
            );
        }
        for duplicate in &comparison.duplicates {
            println!(
                " {} Build number {} used by builds {:?}",
                "!".yellow().bold(),
                duplicate.build_number,
                duplicate.build_ids
            );
        }
        println!();
    }

    println!(
        " {} {} rows written to {}",
        "|-".dimmed(),
        comparison.rows.len(),
        path.display().to_string().cyan()
    );
    println!();
}

pub fn print_similarity(analysis: &SimilarityAnalysis, persistence: f64) {
    header("Rank similarity for", &analysis.project);

    println!(" {} Jobs compared: {}", "|-".dimmed(), analysis.jobs.len());
    println!(" {} Persistence p: {}", "|-".dimmed(), persistence);
    println!(" {} Median RBO: {}", "|-".dimmed(), rated(analysis.median).bold());
    println!();
}

pub fn print_precision_recall(project: &str, strategy: &str, results: &[SelectorResult]) {
    header("Precision/recall for", &format!("{} ({})", project, strategy));

    println!(
        " {:<8} {:>5} {:>10} {:>10}",
        "selector".bold(),
        "n".bold(),
        "precision".bold(),
        "recall".bold()
    );
    for result in results {
        println!(
            " {:<8} {:>5} {:>10} {:>10}",
            result.selector.to_string(),
            result.parameter,
            score(result.precision),
            score(result.recall)
        );
    }
    println!();
}

pub fn print_sanity(project: &str, report: Option<&SanityReport>, optimal: &str) {
    header("Sanity check for", project);

    let Some(report) = report else {
        println!(" {} No '{}' column to compare against", "!".yellow().bold(), optimal);
        println!();
        return;
    };

    println!(" {} Heuristics checked: {}", "|-".dimmed(), report.checked.len());
    if report.is_clean() {
        println!(
            " {} {}",
            "OK".green().bold(),
            format!("No heuristic scores above {}", optimal).green()
        );
    } else {
        for violation in &report.violations {
            println!(
                " {} {} beats {} on {} job(s)",
                "FAIL".red().bold(),
                violation.strategy.bold(),
                optimal,
                violation.jobs.len()
            );
        }
    }
    println!();
}

pub fn print_summary(project: &str, jobs: usize, summaries: &[StrategySummary]) {
    header("Summary for", project);

    println!(" {} {} jobs", "|-".dimmed(), jobs);
    println!();
    println!(
        " {:<32} {:>8} {:>8} {:>6}",
        "strategy".bold(),
        "median".bold(),
        "mean".bold(),
        "jobs".bold()
    );
    for summary in summaries {
        println!(
            " {:<32} {:>8} {:>8} {:>6}",
            summary.strategy,
            rated(summary.median),
            score(summary.mean),
            summary.jobs
        );
    }
    println!();
}
