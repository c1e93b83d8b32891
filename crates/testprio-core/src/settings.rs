//! Analysis settings, optionally read from a `testprio.toml` file.
//!
//! ```toml
//! budgets = [0.1, 1.0, 10.0]
//! nominal_duration = 0.25
//! rbo_persistence = 0.98
//!
//! [strategies]
//! untreated = "untreated"
//! optimal = "optimal-failure"
//! optimal_duration = "optimal-failure-duration"
//! excluded = ["push-*"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::budget::{DEFAULT_BUDGETS, DEFAULT_NOMINAL_DURATION};
use crate::rbo::DEFAULT_PERSISTENCE;

pub const SETTINGS_FILE: &str = "testprio.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Candidate budgets in seconds for budget profiles.
    pub budgets: Vec<f64>,
    /// Seconds substituted for zero test durations before budget accounting.
    pub nominal_duration: f64,
    /// Persistence parameter `p` of rank-biased overlap.
    pub rbo_persistence: f64,
    pub strategies: StrategyNames,
}

/// Names of the strategies with a fixed role in the analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyNames {
    /// CI order as executed; source of the failure history.
    pub untreated: String,
    /// Failures first: the upper bound for every heuristic.
    pub optimal: String,
    /// Failures first, cheapest first.
    pub optimal_duration: String,
    /// Glob patterns of strategies that are not heuristics.
    pub excluded: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            budgets: DEFAULT_BUDGETS.to_vec(),
            nominal_duration: DEFAULT_NOMINAL_DURATION,
            rbo_persistence: DEFAULT_PERSISTENCE,
            strategies: StrategyNames::default(),
        }
    }
}

impl Default for StrategyNames {
    fn default() -> Self {
        Self {
            untreated: "untreated".to_string(),
            optimal: "optimal-failure".to_string(),
            optimal_duration: "optimal-failure-duration".to_string(),
            excluded: vec!["push-*".to_string()],
        }
    }
}

impl Settings {
    /// Load settings from an explicit file, or from `testprio.toml` in `base`
    /// when present, or fall back to the defaults.
    pub fn load(explicit: Option<&Path>, base: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let candidate = base.join(SETTINGS_FILE);
                if candidate.is_file() {
                    Self::from_file(&candidate)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.budgets.is_empty() {
            anyhow::bail!("At least one budget is required");
        }
        if self.budgets.iter().any(|b| b.is_nan() || *b < 0.0) {
            anyhow::bail!("Budgets must be non-negative numbers");
        }
        if !(self.nominal_duration.is_finite() && self.nominal_duration > 0.0) {
            anyhow::bail!("nominal_duration must be a positive number");
        }
        if !(self.rbo_persistence > 0.0 && self.rbo_persistence <= 1.0) {
            anyhow::bail!("rbo_persistence must be in (0, 1]");
        }
        for pattern in &self.strategies.excluded {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid strategy pattern '{}'", pattern))?;
        }
        Ok(())
    }
}

impl StrategyNames {
    /// Whether `strategy` is a heuristic to be held against the optimal ordering.
    pub fn is_heuristic(&self, strategy: &str) -> bool {
        if strategy == self.optimal || strategy == self.optimal_duration {
            return false;
        }
        !self
            .excluded
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .any(|p| p.matches(strategy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(None, dir.path()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.budgets, vec![0.1, 1.0, 10.0]);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let settings = Settings::from_toml(
            "budgets = [5.0, 60.0]\n[strategies]\noptimal = \"oracle\"\n",
        )
        .unwrap();
        assert_eq!(settings.budgets, vec![5.0, 60.0]);
        assert_eq!(settings.strategies.optimal, "oracle");
        assert_eq!(settings.strategies.untreated, "untreated");
        assert_eq!(settings.nominal_duration, 0.25);
    }

    #[test]
    fn test_settings_file_in_base_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "rbo_persistence = 0.9\n").unwrap();
        let settings = Settings::load(None, dir.path()).unwrap();
        assert_eq!(settings.rbo_persistence, 0.9);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Settings::from_toml("budgets = []").is_err());
        assert!(Settings::from_toml("nominal_duration = 0.0").is_err());
        assert!(Settings::from_toml("nominal_duration = nan").is_err());
        assert!(Settings::from_toml("nominal_duration = inf").is_err());
        assert!(Settings::from_toml("rbo_persistence = 1.5").is_err());
    }

    #[test]
    fn test_heuristic_classification() {
        let names = StrategyNames::default();
        assert!(names.is_heuristic("recently-failed"));
        assert!(!names.is_heuristic("optimal-failure"));
        assert!(!names.is_heuristic("optimal-failure-duration"));
        assert!(!names.is_heuristic("push-matrix-file-similarity"));
    }
}
