pub mod error;
pub mod test_log;
pub mod stats;
pub mod apfd;
pub mod budget;
pub mod failure_distance;
pub mod apfd_table;
pub mod aggregate;
pub mod layout;
pub mod settings;
pub mod rbo;
pub mod selection;
pub mod sanity;
pub mod summary;
pub mod analysis;

pub use error::{AnalysisError, AnalysisResult};
pub use test_log::{Job, TestExecutionRecord, TestLog};
pub use apfd::{compute_curve, compute_score, CurvePoint, JobScore};
pub use budget::{BudgetPoint, BudgetProfile};
pub use failure_distance::{
    compute_distances, BuildDistance, BuildSnapshot, DistanceReport, FailureHistory,
};
pub use apfd_table::ApfdTable;
pub use aggregate::{aggregate, ComparisonRow};
pub use layout::{Layout, Project};
pub use settings::Settings;
pub use selection::{Selector, SelectorKind};
