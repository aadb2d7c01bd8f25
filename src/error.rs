use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SafebumpError {
    #[error("Project validation failed: {0}")]
    ProjectValidation(String),

    #[error("Cannot read manifest {}: {reason}", path.display())]
    ManifestUnreadable { path: PathBuf, reason: String },

    #[error("Snapshot '{0}' not found")]
    SnapshotNotFound(String),

    #[error("You have uncommitted changes. Please commit or stash them first.")]
    DirtyWorkingTree,

    #[error("Git operation failed: {0}")]
    GitOperation(String),

    #[error("Package manager command failed: {0}")]
    PackageManager(String),

    #[error(
        "Install failed and the project was rolled back to snapshot {snapshot_id}:\n{output}"
    )]
    UpdateRolledBack { snapshot_id: String, output: String },

    #[error(
        "Install failed and reinstalling snapshot {snapshot_id} also failed; the project may be inconsistent:\n{output}"
    )]
    RecoveryFailed { snapshot_id: String, output: String },

    #[error("Trial cleanup failed, check your branches manually: {0}")]
    SandboxCleanup(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Project is locked by another safebump invocation ({})", path.display())]
    Locked { path: PathBuf },

    #[error("Operation cancelled by user")]
    UserCancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SafebumpError {
    pub(crate) fn manifest_unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SafebumpError::ManifestUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SafebumpError>;
