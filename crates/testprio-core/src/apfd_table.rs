use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::apfd::{job_scores, JobScore};
use crate::test_log::TestLog;

const JOB_COLUMN: &str = "travisJobId";

/// APFD of one job under one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyScore {
    pub job_id: u64,
    pub strategy: String,
    pub apfd: f64,
}

/// Per-project score table: one row per job, one column per strategy.
///
/// Missing and undefined scores are NaN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApfdTable {
    strategies: Vec<String>,
    rows: BTreeMap<u64, Vec<f64>>,
}

impl ApfdTable {
    /// Outer-join per-strategy job scores on job id. Columns are sorted by name.
    pub fn from_scores(mut columns: Vec<(String, Vec<JobScore>)>) -> Self {
        columns.sort_by(|a, b| a.0.cmp(&b.0));
        let width = columns.len();
        let mut rows: BTreeMap<u64, Vec<f64>> = BTreeMap::new();

        for (col, (_, scores)) in columns.iter().enumerate() {
            for score in scores {
                rows.entry(score.job_id).or_insert_with(|| vec![f64::NAN; width])[col] = score.apfd;
            }
        }

        Self {
            strategies: columns.into_iter().map(|(name, _)| name).collect(),
            rows,
        }
    }

    /// Score every strategy log. Each entry is `(strategy name, log path)`.
    pub fn compute(strategy_logs: &[(String, PathBuf)]) -> Result<Self> {
        let mut columns = Vec::with_capacity(strategy_logs.len());
        for (name, path) in strategy_logs {
            info!(strategy = %name, path = %path.display(), "Scoring strategy log");
            let log = TestLog::from_path(path)?;
            let scores = job_scores(&log)
                .with_context(|| format!("Malformed jobs in {}", path.display()))?;
            columns.push((name.clone(), scores));
        }
        Ok(Self::from_scores(columns))
    }

    pub fn strategies(&self) -> &[String] {
        &self.strategies
    }

    pub fn job_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.rows.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Score of `job_id` under `strategy`, NaN if absent.
    pub fn get(&self, job_id: u64, strategy: &str) -> f64 {
        let Some(col) = self.column_index(strategy) else {
            return f64::NAN;
        };
        self.rows.get(&job_id).map_or(f64::NAN, |row| row[col])
    }

    /// All scores of one strategy in job id order.
    pub fn column(&self, strategy: &str) -> Option<Vec<f64>> {
        let col = self.column_index(strategy)?;
        Some(self.rows.values().map(|row| row[col]).collect())
    }

    fn column_index(&self, strategy: &str) -> Option<usize> {
        self.strategies.iter().position(|s| s == strategy)
    }

    /// Long format: one entry per (job, strategy).
    pub fn melt(&self) -> Vec<StrategyScore> {
        self.rows
            .iter()
            .flat_map(|(&job_id, row)| {
                self.strategies
                    .iter()
                    .zip(row)
                    .map(move |(strategy, &apfd)| StrategyScore {
                        job_id,
                        strategy: strategy.clone(),
                        apfd,
                    })
            })
            .collect()
    }

    /// Keep only the named strategies, in the given order.
    pub fn select(&self, strategies: &[String]) -> Result<Self> {
        let mut indices = Vec::with_capacity(strategies.len());
        for name in strategies {
            match self.column_index(name) {
                Some(i) => indices.push(i),
                None => bail!(
                    "Unknown strategy '{}' (available: {})",
                    name,
                    self.strategies.join(", ")
                ),
            }
        }
        Ok(Self {
            strategies: strategies.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|(&job, row)| (job, indices.iter().map(|&i| row[i]).collect()))
                .collect(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let mut header = vec![JOB_COLUMN.to_string()];
        header.extend(self.strategies.iter().cloned());
        writer.write_record(&header)?;

        for (job_id, row) in &self.rows {
            let mut fields = vec![job_id.to_string()];
            fields.extend(row.iter().map(|v| format_score(*v)));
            writer.write_record(&fields)?;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open APFD table: {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("Failed to parse APFD table: {}", path.display()))
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        match headers.iter().next() {
            Some(JOB_COLUMN) => {}
            other => bail!("Expected first column '{}', found {:?}", JOB_COLUMN, other),
        }
        let strategies: Vec<String> = headers.iter().skip(1).map(String::from).collect();

        let mut rows = BTreeMap::new();
        for (line, record) in csv_reader.records().enumerate() {
            let record = record?;
            let job_id: u64 = record
                .get(0)
                .unwrap_or_default()
                .parse()
                .with_context(|| format!("Invalid job id at row {}", line + 1))?;
            let values = record
                .iter()
                .skip(1)
                .map(parse_score)
                .collect::<Result<Vec<f64>>>()
                .with_context(|| format!("Invalid score at row {}", line + 1))?;
            rows.insert(job_id, values);
        }

        Ok(Self { strategies, rows })
    }
}

fn format_score(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

fn parse_score(field: &str) -> Result<f64> {
    let field = field.trim();
    if field.is_empty() || field.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    Ok(field.parse::<f64>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(job_id: u64, apfd: f64) -> JobScore {
        JobScore { job_id, apfd }
    }

    fn sample() -> ApfdTable {
        ApfdTable::from_scores(vec![
            ("untreated".to_string(), vec![score(1, 0.5), score(2, 0.25)]),
            ("random".to_string(), vec![score(2, 0.75), score(3, f64::NAN)]),
        ])
    }

    #[test]
    fn test_outer_join_sorts_columns() {
        let table = sample();
        assert_eq!(table.strategies(), &["random".to_string(), "untreated".to_string()]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(2, "random"), 0.75);
        assert!(table.get(1, "random").is_nan());
        assert!(table.get(3, "untreated").is_nan());
        assert!(table.get(1, "missing").is_nan());
    }

    #[test]
    fn test_melt_and_select() {
        let table = sample();
        assert_eq!(table.melt().len(), 6);

        let only = table.select(&["untreated".to_string()]).unwrap();
        assert_eq!(only.strategies().len(), 1);
        assert_eq!(only.column("untreated").unwrap()[0], 0.5);
        assert!(table.select(&["nope".to_string()]).is_err());
    }

    #[test]
    fn test_write_then_read_keeps_undefined_scores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p-apfd.csv");
        let table = sample();
        table.write(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("travisJobId,random,untreated\n"));
        assert!(content.contains("\n1,,0.5\n"));

        let back = ApfdTable::read(&path).unwrap();
        assert_eq!(back.strategies(), table.strategies());
        assert_eq!(back.get(2, "untreated"), 0.25);
        assert!(back.get(3, "random").is_nan());
    }

    #[test]
    fn test_read_rejects_foreign_header() {
        assert!(ApfdTable::from_reader("job,random\n1,0.5\n".as_bytes()).is_err());
    }
}
