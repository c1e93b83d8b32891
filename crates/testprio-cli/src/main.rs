mod display;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use testprio_core::analysis;
use testprio_core::apfd;
use testprio_core::failure_distance::BuildSnapshot;
use testprio_core::layout::{Layout, Project};
use testprio_core::sanity;
use testprio_core::selection::SelectorKind;
use testprio_core::settings::Settings;
use testprio_core::summary;
use testprio_core::TestLog;

#[derive(Parser)]
#[command(
    name = "testprio",
    version,
    about = "testprio: evaluate test prioritization strategies on CI history",
    long_about = "Compute APFD, budget profiles and failure distances for prioritized \
        test logs.\n\n\
        Projects are read from $PRIO_BASE (default ../output), logs from the\n\
        $PRIO_QUALIFIER sub-folder of each project (default baseline)."
)]
struct Cli {
    /// Only analyze this project (directory name, e.g. apache@commons-lang)
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Settings file (defaults to testprio.toml in the base folder when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Stop at the first project that fails instead of logging and continuing
    #[arg(long, global = true)]
    fail_fast: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and store the job x strategy APFD table of every project
    Apfd {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Median APFD of a single strategy log
    Score {
        /// Path to the strategy log (CSV)
        path: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Fault detection under time budgets for the optimal-failure ordering
    Budget {
        /// Budgets in seconds, overriding the settings file
        #[arg(short, long, value_delimiter = ',')]
        budgets: Vec<f64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Join per-build APFD with failure distances
    Distance {
        /// Strategies to include (all when omitted)
        strategies: Vec<String>,

        /// Build snapshot CSV (defaults to builds.csv in the base folder)
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Ignore build time windows when scanning for prior failures
        #[arg(long)]
        no_window_guard: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Rank similarity of the optimal and cost-cognizant optimal orderings
    Rbo {
        /// Persistence parameter p, overriding the settings file
        #[arg(long)]
        persistence: Option<f64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Precision and recall of truncated runs of one strategy
    PrecisionRecall {
        /// Strategy whose log is truncated (defaults to the untreated order)
        #[arg(short, long)]
        strategy: Option<String>,

        /// Selector kinds (fixed, green)
        #[arg(long, value_delimiter = ',', default_value = "fixed,green")]
        selectors: Vec<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check that no heuristic outperforms the optimal-failure ordering
    Sanity {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Median and mean APFD per strategy
    Summary {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

/// Shared state of one invocation.
struct Session {
    layout: Layout,
    settings: Settings,
    project: Option<String>,
    fail_fast: bool,
}

impl Session {
    fn projects(&self) -> Result<Vec<Project>> {
        match &self.project {
            Some(name) => Ok(vec![self.layout.project(name)?]),
            None => self.layout.projects(),
        }
    }

    /// Run `f` for every selected project. Failures are logged and skipped
    /// unless `--fail-fast` is set.
    fn for_each_project<T, F>(&self, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(&Project) -> Result<T>,
    {
        let projects = self.projects()?;
        if projects.is_empty() {
            anyhow::bail!("No projects found in {}", self.layout.base().display());
        }

        let mut results = Vec::with_capacity(projects.len());
        for project in &projects {
            info!(project = %project.name, "Analyzing project");
            match f(project) {
                Ok(result) => results.push(result),
                Err(e) if self.fail_fast => {
                    return Err(e.context(format!("Project {} failed", project.name)));
                }
                Err(e) => error!(project = %project.name, "{:#}", e),
            }
        }
        Ok(results)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let layout = Layout::from_env();
    let settings = Settings::load(cli.config.as_deref(), layout.base())?;
    let ctx = Session {
        layout,
        settings,
        project: cli.project,
        fail_fast: cli.fail_fast,
    };

    match cli.command {
        Commands::Apfd { format } => cmd_apfd(&ctx, &format),
        Commands::Score { path, format } => cmd_score(&path, &format),
        Commands::Budget { budgets, format } => cmd_budget(ctx, budgets, &format),
        Commands::Distance { strategies, snapshot, no_window_guard, format } => {
            cmd_distance(&ctx, &strategies, snapshot.as_deref(), no_window_guard, &format)
        }
        Commands::Rbo { persistence, format } => cmd_rbo(ctx, persistence, &format),
        Commands::PrecisionRecall { strategy, selectors, format } => {
            cmd_precision_recall(&ctx, strategy.as_deref(), &selectors, &format)
        }
        Commands::Sanity { format } => cmd_sanity(&ctx, &format),
        Commands::Summary { format } => cmd_summary(&ctx, &format),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_apfd(ctx: &Session, format: &str) -> Result<()> {
    let written = ctx.for_each_project(|project| {
        let table = analysis::apfd_table(&ctx.layout, project)?;
        let path = ctx.layout.apfd_path(project)?;
        table.write(&path)?;
        Ok((project.name.clone(), table, path))
    })?;

    match format {
        "json" => {
            let scores: Vec<_> = written
                .iter()
                .map(|(project, table, _)| {
                    serde_json::json!({ "project": project, "scores": table.melt() })
                })
                .collect();
            print_json(&scores)?;
        }
        _ => {
            for (project, table, path) in &written {
                display::print_apfd_table(project, table, path);
            }
        }
    }
    Ok(())
}

fn cmd_score(path: &Path, format: &str) -> Result<()> {
    let log = TestLog::from_path(path)?;
    let scores = apfd::job_scores(&log).with_context(|| format!("Invalid log {}", path.display()))?;
    let median = apfd::median_score(&log)?;

    match format {
        "json" => print_json(&serde_json::json!({
            "path": path.display().to_string(),
            "jobs": scores,
            "median": median,
        }))?,
        _ => display::print_score(path, &scores, median),
    }
    Ok(())
}

fn cmd_budget(mut ctx: Session, budgets: Vec<f64>, format: &str) -> Result<()> {
    if !budgets.is_empty() {
        if budgets.iter().any(|b| b.is_nan() || *b < 0.0) {
            anyhow::bail!("Budgets must be non-negative numbers");
        }
        ctx.settings.budgets = budgets;
    }

    let analyses = ctx.for_each_project(|project| {
        analysis::budget_analysis(&ctx.layout, project, &ctx.settings)
    })?;

    match format {
        "json" => print_json(&analyses)?,
        _ => {
            for result in &analyses {
                display::print_budget(result);
            }
        }
    }
    Ok(())
}

fn cmd_distance(
    ctx: &Session,
    strategies: &[String],
    snapshot: Option<&Path>,
    no_window_guard: bool,
    format: &str,
) -> Result<()> {
    let snapshot = if no_window_guard {
        None
    } else {
        let path = snapshot
            .map(Path::to_path_buf)
            .unwrap_or_else(|| ctx.layout.snapshot_path());
        if path.is_file() {
            Some(BuildSnapshot::from_path(&path)?)
        } else {
            warn!(path = %path.display(), "No build snapshot, scanning without time windows");
            None
        }
    };

    let comparisons = ctx.for_each_project(|project| {
        let comparison = analysis::distance_comparison(
            &ctx.layout,
            project,
            &ctx.settings,
            snapshot.as_ref(),
            strategies,
        )?;
        let path = ctx
            .layout
            .evaluation_dir(project)?
            .join(format!("{}-distance.csv", project.name));
        analysis::write_csv(&path, &comparison.rows)?;
        Ok((comparison, path))
    })?;

    match format {
        "json" => {
            let results: Vec<_> = comparisons.iter().map(|(c, _)| c).collect();
            print_json(&results)?;
        }
        _ => {
            for (comparison, path) in &comparisons {
                display::print_distance(comparison, path);
            }
        }
    }
    Ok(())
}

fn cmd_rbo(mut ctx: Session, persistence: Option<f64>, format: &str) -> Result<()> {
    if let Some(p) = persistence {
        if !(p > 0.0 && p <= 1.0) {
            anyhow::bail!("Persistence must be in (0, 1], got {}", p);
        }
        ctx.settings.rbo_persistence = p;
    }

    let analyses = ctx.for_each_project(|project| {
        let similarity = analysis::rank_similarity(&ctx.layout, project, &ctx.settings)?;
        let path = ctx
            .layout
            .evaluation_dir(project)?
            .join(format!("{}-rbo.csv", project.name));
        analysis::write_csv(&path, &similarity.jobs)?;
        Ok(similarity)
    })?;

    match format {
        "json" => print_json(&analyses)?,
        _ => {
            for result in &analyses {
                display::print_similarity(result, ctx.settings.rbo_persistence);
            }
        }
    }
    Ok(())
}

fn cmd_precision_recall(
    ctx: &Session,
    strategy: Option<&str>,
    selectors: &[String],
    format: &str,
) -> Result<()> {
    let kinds = selectors
        .iter()
        .map(|s| {
            SelectorKind::parse(s)
                .with_context(|| format!("Unknown selector '{}'. Use fixed or green.", s))
        })
        .collect::<Result<Vec<_>>>()?;
    let strategy = strategy.unwrap_or(ctx.settings.strategies.untreated.as_str());

    let sweeps = ctx.for_each_project(|project| {
        let results = analysis::precision_recall(&ctx.layout, project, strategy, &kinds)?;
        let path = ctx
            .layout
            .evaluation_dir(project)?
            .join(format!("{}-{}-precision-recall.csv", project.name, strategy));
        analysis::write_csv(&path, &results)?;
        Ok((project.name.clone(), results))
    })?;

    match format {
        "json" => {
            let results: Vec<_> = sweeps
                .iter()
                .map(|(project, results)| {
                    serde_json::json!({
                        "project": project,
                        "strategy": strategy,
                        "results": results,
                    })
                })
                .collect();
            print_json(&results)?;
        }
        _ => {
            for (project, results) in &sweeps {
                display::print_precision_recall(project, strategy, results);
            }
        }
    }
    Ok(())
}

fn cmd_sanity(ctx: &Session, format: &str) -> Result<()> {
    let reports = ctx.for_each_project(|project| {
        let table = analysis::load_or_compute_apfd_table(&ctx.layout, project)?;
        let report = sanity::check_optimal_failure(&table, &ctx.settings.strategies);
        if report.is_none() {
            warn!(
                project = %project.name,
                strategy = %ctx.settings.strategies.optimal,
                "No optimal ordering in APFD table, nothing to check"
            );
        }
        Ok((project.name.clone(), report))
    })?;

    match format {
        "json" => {
            let results: Vec<_> = reports
                .iter()
                .map(|(project, report)| {
                    serde_json::json!({ "project": project, "report": report })
                })
                .collect();
            print_json(&results)?;
        }
        _ => {
            for (project, report) in &reports {
                display::print_sanity(project, report.as_ref(), &ctx.settings.strategies.optimal);
            }
        }
    }

    let failing = reports
        .iter()
        .filter(|(_, r)| r.as_ref().is_some_and(|r| !r.is_clean()))
        .count();
    if failing > 0 {
        anyhow::bail!(
            "{} project(s) have heuristics scoring above {}",
            failing,
            ctx.settings.strategies.optimal
        );
    }
    Ok(())
}

fn cmd_summary(ctx: &Session, format: &str) -> Result<()> {
    let summaries = ctx.for_each_project(|project| {
        let table = analysis::load_or_compute_apfd_table(&ctx.layout, project)?;
        Ok((project.name.clone(), table.len(), summary::summarize(&table)))
    })?;

    match format {
        "json" => {
            let results: Vec<_> = summaries
                .iter()
                .map(|(project, jobs, strategies)| {
                    serde_json::json!({
                        "project": project,
                        "jobs": jobs,
                        "strategies": strategies,
                    })
                })
                .collect();
            print_json(&results)?;
        }
        _ => {
            for (project, jobs, strategies) in &summaries {
                display::print_summary(project, *jobs, strategies);
            }
        }
    }
    Ok(())
}
