//! On-disk layout of the evaluation data.
//!
//! ```text
//! <base>/
//!   builds.csv                          build snapshot (all projects)
//!   <owner>@<repo>/
//!     <qualifier>/<repo>@<strategy>.csv strategy logs
//!     <qualifier>-evaluation/           outputs
//! ```

use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const ENV_BASE_FOLDER: &str = "PRIO_BASE";
pub const ENV_QUALIFIER: &str = "PRIO_QUALIFIER";

pub mod defaults {
    pub const BASE_FOLDER: &str = "../output";
    pub const QUALIFIER: &str = "baseline";
    pub const SNAPSHOT_FILE: &str = "builds.csv";
}

fn strategy_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^.*@([.\w-]+)\.csv$").expect("valid strategy pattern"))
}

/// A project directory, named `<owner>@<repo>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
}

impl Project {
    /// Repository part of the name (after the first `@`), or the whole name.
    pub fn repository(&self) -> &str {
        self.name.split_once('@').map_or(self.name.as_str(), |(_, repo)| repo)
    }

    /// The `owner/repo` name used by the build snapshot.
    pub fn db_name(&self) -> String {
        db_project_name(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    base: PathBuf,
    qualifier: String,
}

impl Layout {
    pub fn new(base: impl Into<PathBuf>, qualifier: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            qualifier: qualifier.into(),
        }
    }

    /// Read `PRIO_BASE` and `PRIO_QUALIFIER`, falling back to the defaults.
    pub fn from_env() -> Self {
        let base = std::env::var(ENV_BASE_FOLDER)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| defaults::BASE_FOLDER.to_string());
        let qualifier = std::env::var(ENV_QUALIFIER)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| defaults::QUALIFIER.to_string());
        Self::new(base, qualifier)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    /// Project directories under the base folder, sorted by name.
    pub fn projects(&self) -> Result<Vec<Project>> {
        let entries = std::fs::read_dir(&self.base)
            .with_context(|| format!("Failed to list projects in {}", self.base.display()))?;

        let mut projects = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                projects.push(Project {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    path,
                });
            }
        }
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    /// Look up one project by directory name.
    pub fn project(&self, name: &str) -> Result<Project> {
        let path = self.base.join(name);
        if !path.is_dir() {
            anyhow::bail!("Project '{}' not found under {}", name, self.base.display());
        }
        Ok(Project {
            name: name.to_string(),
            path,
        })
    }

    /// Strategy logs of a project as `(strategy, path)`, sorted by strategy.
    pub fn strategies(&self, project: &Project) -> Result<Vec<(String, PathBuf)>> {
        let pattern = project.path.join(&self.qualifier).join("*.csv");
        let pattern = pattern.to_string_lossy();

        let mut found = Vec::new();
        for path in glob::glob(&pattern).context("Failed to read glob pattern")? {
            let path = path?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if let Some(captures) = strategy_pattern().captures(&file_name) {
                found.push((captures[1].to_string(), path));
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }

    /// Path of the log for one strategy: `<qualifier>/<repo>@<strategy>.csv`.
    pub fn strategy_path(&self, project: &Project, strategy: &str) -> PathBuf {
        project
            .path
            .join(&self.qualifier)
            .join(format!("{}@{}.csv", project.repository(), strategy))
    }

    /// Output directory of a project, created on demand.
    pub fn evaluation_dir(&self, project: &Project) -> Result<PathBuf> {
        let path = project.path.join(format!("{}-evaluation", self.qualifier));
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(path)
    }

    pub fn apfd_path(&self, project: &Project) -> Result<PathBuf> {
        Ok(self
            .evaluation_dir(project)?
            .join(format!("{}-apfd.csv", project.name)))
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.base.join(defaults::SNAPSHOT_FILE)
    }
}

/// `owner@repo` (filesystem form) to `owner/repo`.
pub fn db_project_name(name: &str) -> String {
    name.replace('@', "/")
}

/// `owner/repo` to `owner@repo` (filesystem form).
pub fn fs_project_name(name: &str) -> String {
    name.replace('/', "@")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn test_project_names() {
        assert_eq!(db_project_name("apache@commons"), "apache/commons");
        assert_eq!(fs_project_name("apache/commons"), "apache@commons");
        let project = Project {
            name: "apache@commons".into(),
            path: PathBuf::from("/x/apache@commons"),
        };
        assert_eq!(project.repository(), "commons");
    }

    #[test]
    fn test_discovers_projects_and_strategies() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path(), "baseline");
        let project_dir = dir.path().join("acme@widget");
        touch(&project_dir.join("baseline/widget@untreated.csv"));
        touch(&project_dir.join("baseline/widget@recently-failed.csv"));
        touch(&project_dir.join("baseline/widget@v1.2.csv"));
        touch(&project_dir.join("baseline/notes.csv"));
        touch(&dir.path().join("builds.csv"));

        let projects = layout.projects().unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "acme@widget");

        let strategies = layout.strategies(&projects[0]).unwrap();
        let names: Vec<&str> = strategies.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["recently-failed", "untreated", "v1.2"]);

        assert_eq!(
            layout.strategy_path(&projects[0], "untreated"),
            project_dir.join("baseline/widget@untreated.csv")
        );
    }

    #[test]
    fn test_evaluation_paths_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path(), "q");
        std::fs::create_dir(dir.path().join("a@b")).unwrap();
        let project = layout.project("a@b").unwrap();

        let apfd = layout.apfd_path(&project).unwrap();
        assert_eq!(apfd, dir.path().join("a@b/q-evaluation/a@b-apfd.csv"));
        assert!(dir.path().join("a@b/q-evaluation").is_dir());
        assert!(layout.project("missing@repo").is_err());
    }
}
