use std::path::{Path, PathBuf};

/// Directory under the project root holding snapshots and the lock file.
pub const STATE_DIR: &str = ".safebump";
pub const REGISTRY_ENV: &str = "SAFEBUMP_REGISTRY";

/// How test and type-check runs are judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutcomeDetection {
    /// Non-zero exit, or a `failed` / `error` marker in the output. Catches
    /// test runners that exit 0 on failure.
    #[default]
    Heuristic,
    /// Exit status only.
    ExitStatus,
}

/// Settings collected from the command line and environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_path: PathBuf,
    pub registry_url: Option<String>,
    pub outcome_detection: OutcomeDetection,
}

impl Settings {
    pub fn new<P: AsRef<Path>>(project_path: P) -> Self {
        Self {
            project_path: project_path.as_ref().to_path_buf(),
            registry_url: None,
            outcome_detection: OutcomeDetection::default(),
        }
    }

    pub fn with_registry(mut self, registry_url: Option<String>) -> Self {
        self.registry_url = registry_url.filter(|url| !url.trim().is_empty());
        self
    }

    pub fn with_strict_exit_status(mut self, strict: bool) -> Self {
        self.outcome_detection = if strict {
            OutcomeDetection::ExitStatus
        } else {
            OutcomeDetection::Heuristic
        };
        self
    }
}
