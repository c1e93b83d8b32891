//! Build history inputs for the failure distance scan.
//!
//! The failing-test history is derived from the untreated strategy log. Time
//! windows come from a project-wide build snapshot that the caller loads once
//! and hands down explicitly.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::warn;

use crate::test_log::TestLog;

/// A build with at least one failing test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedBuild {
    pub build_number: u64,
    pub build_id: u64,
    pub failing_tests: BTreeSet<String>,
}

/// A build number shared by several build ids in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateBuildNumber {
    pub build_number: u64,
    pub build_ids: Vec<u64>,
}

/// Failed builds of a project, most recent build number first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureHistory {
    pub builds: Vec<FailedBuild>,
    pub duplicates: Vec<DuplicateBuildNumber>,
}

impl FailureHistory {
    /// Order the given builds by descending build number.
    pub fn from_builds(mut builds: Vec<FailedBuild>) -> Self {
        builds.sort_by(|a, b| b.build_number.cmp(&a.build_number));
        Self {
            builds,
            duplicates: Vec::new(),
        }
    }

    /// Collect the failing tests of every build from a strategy log.
    ///
    /// Rows are grouped by build number. When one build number carries
    /// several build ids the rows are merged under the first id seen and the
    /// clash is reported in `duplicates`.
    pub fn from_log(log: &TestLog) -> Self {
        let mut grouped: BTreeMap<u64, (Vec<u64>, BTreeSet<String>)> = BTreeMap::new();

        for record in log.records().iter().filter(|r| r.is_red()) {
            let (ids, tests) = grouped.entry(record.build_number).or_default();
            if !ids.contains(&record.build_id) {
                ids.push(record.build_id);
            }
            tests.insert(record.test_name.clone());
        }

        let mut builds = Vec::with_capacity(grouped.len());
        let mut duplicates = Vec::new();

        for (build_number, (build_ids, failing_tests)) in grouped.into_iter().rev() {
            if build_ids.len() > 1 {
                warn!(build_number, ?build_ids, "Build number assigned to several builds");
                duplicates.push(DuplicateBuildNumber {
                    build_number,
                    build_ids: build_ids.clone(),
                });
            }
            builds.push(FailedBuild {
                build_number,
                build_id: build_ids[0],
                failing_tests,
            });
        }

        Self { builds, duplicates }
    }

    pub fn len(&self) -> usize {
        self.builds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builds.is_empty()
    }
}

/// Wall-clock window of a build: `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildWindow {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Time windows of one project's builds, keyed by build number.
#[derive(Debug, Clone, Default)]
pub struct BuildWindows {
    windows: HashMap<u64, BuildWindow>,
}

impl BuildWindows {
    /// Collect windows. A repeated build number widens its window to the
    /// earliest begin and the latest end.
    pub fn from_builds<I>(builds: I) -> Self
    where
        I: IntoIterator<Item = (u64, BuildWindow)>,
    {
        let mut windows: HashMap<u64, BuildWindow> = HashMap::new();
        for (build_number, window) in builds {
            windows
                .entry(build_number)
                .and_modify(|w| {
                    w.begin = w.begin.min(window.begin);
                    w.end = w.end.max(window.end);
                })
                .or_insert(window);
        }
        Self { windows }
    }

    pub fn get(&self, build_number: u64) -> Option<&BuildWindow> {
        self.windows.get(&build_number)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotRow {
    gh_project_name: String,
    tr_build_id: u64,
    tr_build_number: u64,
    gh_build_started_at: String,
    tr_duration: f64,
}

/// One build of the project-wide build snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBuild {
    pub project: String,
    pub build_id: u64,
    pub build_number: u64,
    pub window: BuildWindow,
}

/// Immutable table of all builds across projects, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct BuildSnapshot {
    builds: Vec<SnapshotBuild>,
}

impl BuildSnapshot {
    pub fn new(builds: Vec<SnapshotBuild>) -> Self {
        Self { builds }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open build snapshot: {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("Failed to parse build snapshot: {}", path.display()))
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut builds = Vec::new();
        for (line, row) in csv_reader.deserialize().enumerate() {
            let row: SnapshotRow =
                row.with_context(|| format!("Invalid build at row {}", line + 1))?;
            let begin = parse_timestamp(&row.gh_build_started_at).with_context(|| {
                format!("Invalid start time '{}' at row {}", row.gh_build_started_at, line + 1)
            })?;
            let end = build_end(begin, row.tr_duration).with_context(|| {
                format!("Invalid duration '{}' at row {}", row.tr_duration, line + 1)
            })?;
            builds.push(SnapshotBuild {
                project: row.gh_project_name,
                build_id: row.tr_build_id,
                build_number: row.tr_build_number,
                window: BuildWindow { begin, end },
            });
        }
        Ok(Self { builds })
    }

    pub fn builds(&self) -> &[SnapshotBuild] {
        &self.builds
    }

    /// Windows of the builds belonging to `project` (the `owner/repo` name).
    pub fn windows_for(&self, project: &str) -> BuildWindows {
        BuildWindows::from_builds(
            self.builds
                .iter()
                .filter(|b| b.project == project)
                .map(|b| (b.build_number, b.window)),
        )
    }
}

/// `begin` plus a build duration in seconds.
fn build_end(begin: DateTime<Utc>, duration_secs: f64) -> Result<DateTime<Utc>> {
    if !duration_secs.is_finite() || duration_secs < 0.0 {
        anyhow::bail!("Build duration must be a non-negative number of seconds");
    }
    let millis = (duration_secs * 1000.0).round();
    if millis > i64::MAX as f64 {
        anyhow::bail!("Build duration is out of range");
    }
    let offset =
        TimeDelta::try_milliseconds(millis as i64).context("Build duration is out of range")?;
    begin
        .checked_add_signed(offset)
        .context("Build end is out of the supported time range")
}

/// Parse RFC 3339 or `YYYY-MM-DD HH:MM:SS` (taken as UTC).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .context("Expected RFC 3339 or 'YYYY-MM-DD HH:MM:SS'")?;
    Ok(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_log::fixtures::record;
    use chrono::TimeZone;

    #[test]
    fn test_history_groups_red_rows_by_build_number() {
        let mut a = record(1, "A", 0, 1);
        a.build_number = 4;
        let mut b = record(2, "B", 0, 1);
        b.build_number = 4;
        b.build_id = a.build_id;
        let mut green = record(3, "C", 0, 0);
        green.build_number = 9;
        let mut older = record(4, "A", 0, 2);
        older.build_number = 2;

        let history = FailureHistory::from_log(&TestLog::new(vec![older, a, b, green]));
        assert_eq!(history.len(), 2);
        assert_eq!(history.builds[0].build_number, 4);
        assert_eq!(history.builds[0].failing_tests.len(), 2);
        assert_eq!(history.builds[1].build_number, 2);
        assert!(history.duplicates.is_empty());
    }

    #[test]
    fn test_history_reports_duplicate_build_numbers() {
        let mut a = record(1, "A", 0, 1);
        a.build_number = 7;
        a.build_id = 100;
        let mut b = record(2, "B", 0, 1);
        b.build_number = 7;
        b.build_id = 200;

        let history = FailureHistory::from_log(&TestLog::new(vec![a, b]));
        assert_eq!(history.len(), 1);
        assert_eq!(history.builds[0].build_id, 100);
        assert_eq!(
            history.duplicates,
            vec![DuplicateBuildNumber { build_number: 7, build_ids: vec![100, 200] }]
        );
    }

    #[test]
    fn test_snapshot_windows_merge_duplicates() {
        let csv = "\
gh_project_name,tr_build_id,tr_build_number,gh_build_started_at,tr_duration
acme/widget,1,10,2016-01-01 10:00:00,600
acme/widget,2,10,2016-01-01 09:00:00,60
acme/widget,3,11,2016-01-01T12:00:00Z,30.5
other/repo,4,10,2016-01-01 00:00:00,1
";
        let snapshot = BuildSnapshot::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(snapshot.builds().len(), 4);

        let windows = snapshot.windows_for("acme/widget");
        assert_eq!(windows.len(), 2);
        let merged = windows.get(10).unwrap();
        assert_eq!(merged.begin, Utc.with_ymd_and_hms(2016, 1, 1, 9, 0, 0).unwrap());
        assert_eq!(merged.end, Utc.with_ymd_and_hms(2016, 1, 1, 10, 10, 0).unwrap());

        let single = windows.get(11).unwrap();
        assert_eq!(
            single.end - single.begin,
            chrono::Duration::milliseconds(30_500)
        );
    }

    #[test]
    fn test_snapshot_rejects_unusable_durations() {
        for duration in ["1e17", "-5", "NaN", "inf"] {
            let csv = format!(
                "gh_project_name,tr_build_id,tr_build_number,gh_build_started_at,tr_duration\n\
                 a/b,1,1,2016-01-01 00:00:00,{}\n",
                duration
            );
            let err = BuildSnapshot::from_reader(csv.as_bytes()).unwrap_err();
            assert!(
                format!("{:#}", err).contains("at row 1"),
                "duration {}: {:#}",
                duration,
                err
            );
        }
    }

    #[test]
    fn test_snapshot_accepts_zero_duration() {
        let csv = "gh_project_name,tr_build_id,tr_build_number,gh_build_started_at,tr_duration\n\
                   a/b,1,1,2016-01-01 00:00:00,0\n";
        let snapshot = BuildSnapshot::from_reader(csv.as_bytes()).unwrap();
        let window = snapshot.builds()[0].window;
        assert_eq!(window.begin, window.end);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
    }
}
