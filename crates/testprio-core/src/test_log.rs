use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::error::{AnalysisError, AnalysisResult};

/// One row of a strategy log: a test class executed within a CI job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestExecutionRecord {
    #[serde(rename = "travisJobId")]
    pub job_id: u64,
    #[serde(rename = "testName")]
    pub test_name: String,
    /// Position within the job's execution order.
    pub index: i64,
    pub failures: u32,
    pub errors: u32,
    /// Number of test methods this row stands for.
    #[serde(default = "default_count")]
    pub count: u32,
    /// Seconds spent executing the row.
    #[serde(default)]
    pub duration: f64,
    #[serde(rename = "travisBuildId")]
    pub build_id: u64,
    #[serde(rename = "travisBuildNumber")]
    pub build_number: u64,
}

fn default_count() -> u32 {
    1
}

impl TestExecutionRecord {
    /// Number of failing test methods (failures plus errors).
    pub fn red(&self) -> u64 {
        u64::from(self.failures) + u64::from(self.errors)
    }

    pub fn is_red(&self) -> bool {
        self.red() > 0
    }
}

/// The ordered records of a single job.
#[derive(Debug, Clone)]
pub struct Job<'a> {
    records: Vec<&'a TestExecutionRecord>,
}

impl<'a> Job<'a> {
    /// Wrap records in execution order. No checks happen here; see [`Job::validate`].
    pub fn new(records: Vec<&'a TestExecutionRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[&'a TestExecutionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Job id of the first record, if any.
    pub fn job_id(&self) -> Option<u64> {
        self.records.first().map(|r| r.job_id)
    }

    /// Check the execution-order contract: one job id, contiguous ascending index.
    pub fn validate(&self) -> AnalysisResult<u64> {
        let first = self.records.first().ok_or(AnalysisError::EmptyJob)?;

        if let Some(other) = self.records.iter().find(|r| r.job_id != first.job_id) {
            return Err(AnalysisError::MixedJobIds {
                first: first.job_id,
                other: other.job_id,
            });
        }

        for pair in self.records.windows(2) {
            if pair[1].index - pair[0].index != 1 {
                return Err(AnalysisError::IndexGap {
                    job_id: first.job_id,
                    previous: pair[0].index,
                    next: pair[1].index,
                });
            }
        }

        Ok(first.job_id)
    }

    /// Total red count over the job.
    pub fn total_red(&self) -> u64 {
        self.records.iter().map(|r| r.red()).sum()
    }
}

/// All records of one strategy log, in file order.
#[derive(Debug, Clone, Default)]
pub struct TestLog {
    records: Vec<TestExecutionRecord>,
}

impl TestLog {
    pub fn new(records: Vec<TestExecutionRecord>) -> Self {
        Self { records }
    }

    /// Read a strategy log CSV from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open test log: {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("Failed to parse test log: {}", path.display()))
    }

    /// Read a strategy log from any CSV source. Unknown columns are ignored.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut records = Vec::new();
        for (line, row) in csv_reader.deserialize().enumerate() {
            let record: TestExecutionRecord =
                row.with_context(|| format!("Invalid record at row {}", line + 1))?;
            records.push(record);
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[TestExecutionRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [TestExecutionRecord] {
        &mut self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Group the records by job id (ascending), keeping file order inside each job.
    pub fn jobs(&self) -> Vec<Job<'_>> {
        let mut grouped: BTreeMap<u64, Vec<&TestExecutionRecord>> = BTreeMap::new();
        for record in &self.records {
            grouped.entry(record.job_id).or_default().push(record);
        }
        grouped.into_values().map(Job::new).collect()
    }

    /// Distinct `(job_id, build_id)` pairs in first-seen order.
    pub fn job_builds(&self) -> Vec<(u64, u64)> {
        let mut seen = std::collections::HashSet::new();
        self.records
            .iter()
            .map(|r| (r.job_id, r.build_id))
            .filter(|pair| seen.insert(*pair))
            .collect()
    }
}
