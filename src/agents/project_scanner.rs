use crate::agents::snapshot_store::{LOCK_FILE, MANIFEST_FILE};
use crate::config::STATE_DIR;
use crate::error::{Result, SafebumpError};
use crate::utils::{FileStore, PathValidator};
use std::path::{Path, PathBuf};

const TSCONFIG_FILE: &str = "tsconfig.json";

/// ProjectScannerAgent validates the project structure
pub struct ProjectScannerAgent {
    project_path: PathBuf,
}

impl ProjectScannerAgent {
    pub fn new<P: AsRef<Path>>(project_path: P) -> Self {
        Self {
            project_path: project_path.as_ref().to_path_buf(),
        }
    }

    /// Validates the project structure
    pub fn validate(&self) -> Result<ProjectInfo> {
        let project_path = PathValidator::validate_project_path(&self.project_path)?;

        let manifest_path = project_path.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(SafebumpError::ProjectValidation(format!(
                "{MANIFEST_FILE} not found in {}",
                project_path.display()
            )));
        }

        Ok(ProjectInfo {
            has_lock_file: project_path.join(LOCK_FILE).is_file(),
            has_tsconfig: project_path.join(TSCONFIG_FILE).is_file(),
            manifest_path,
            project_path,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProjectInfo {
    pub project_path: PathBuf,
    pub manifest_path: PathBuf,
    pub has_lock_file: bool,
    pub has_tsconfig: bool,
}

impl ProjectInfo {
    pub fn state_dir(&self) -> PathBuf {
        self.project_path.join(STATE_DIR)
    }

    pub fn snapshot_root(&self) -> PathBuf {
        self.state_dir().join("snapshots")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join("lock")
    }

    /// Creates the state directory with a `.gitignore` covering everything in
    /// it, so snapshots and the lock file never show up as uncommitted changes.
    pub fn prepare_state_dir(&self, store: &dyn FileStore) -> Result<()> {
        let ignore_path = self.state_dir().join(".gitignore");
        if !store.exists(&ignore_path) {
            store.write_bytes(&ignore_path, b"*\n")?;
        }
        Ok(())
    }
}
