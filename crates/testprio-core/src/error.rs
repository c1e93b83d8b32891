use thiserror::Error;

/// Contract violations raised by the analysis components.
///
/// These indicate malformed input. They abort the computation for the
/// enclosing job or project; the caller decides whether to skip or halt.
#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("job contains no test records")]
    EmptyJob,

    #[error("records of jobs {first} and {other} were mixed into one job")]
    MixedJobIds { first: u64, other: u64 },

    #[error("job {job_id}: test index jumps from {previous} to {next}")]
    IndexGap {
        job_id: u64,
        previous: i64,
        next: i64,
    },

    #[error("join on {key} is not many-to-one: {detail}")]
    JoinCardinality { key: &'static str, detail: String },

    #[error("build {build_number} has no time window in the build snapshot")]
    MissingBuildWindow { build_number: u64 },

    #[error("orderings cover different jobs ({only_left} only left, {only_right} only right)")]
    JobSetMismatch { only_left: usize, only_right: usize },
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
