use crate::error::{Result, SafebumpError};
use crate::utils::PathValidator;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, warn};

/// Branch operations used to sandbox a trial. Failures of individual commands
/// are reported as `false` / `None`; only a git binary that cannot be started
/// is an error.
pub trait VersionControl: Send + Sync {
    fn is_repo(&self) -> Result<bool>;
    fn current_branch(&self) -> Result<Option<String>>;
    fn has_uncommitted_changes(&self) -> Result<bool>;
    fn create_branch(&self, name: &str) -> Result<bool>;
    fn switch_branch(&self, name: &str) -> Result<bool>;
    fn delete_branch(&self, name: &str, force: bool) -> Result<bool>;
    /// Stages every change and commits it on the current branch.
    fn commit_all(&self, message: &str) -> Result<bool>;
    /// Drops uncommitted edits to tracked files and removes untracked,
    /// non-ignored files.
    fn discard_changes(&self) -> Result<bool>;
}

/// VersionControlAgent runs git in the project directory.
pub struct VersionControlAgent {
    project_path: PathBuf,
}

impl VersionControlAgent {
    pub fn new<P: AsRef<Path>>(project_path: P) -> Result<Self> {
        let project_path = Self::validate_git_path(project_path.as_ref())?;
        Ok(Self { project_path })
    }

    fn run_git(&self, args: &[&str]) -> Result<Output> {
        debug!(args = %args.join(" "), "git");
        Command::new("git")
            .current_dir(&self.project_path)
            .args(args)
            .output()
            .map_err(|e| {
                SafebumpError::GitOperation(format!(
                    "Failed to execute git command '{}': {e}",
                    args.join(" ")
                ))
            })
    }

    fn succeeded(&self, args: &[&str]) -> Result<bool> {
        let output = self.run_git(args)?;
        if !output.status.success() {
            warn!(
                command = %format!("git {}", args.join(" ")),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "git command failed"
            );
        }
        Ok(output.status.success())
    }

    fn validate_git_path(path: &Path) -> Result<PathBuf> {
        let dangerous = [';', '|', '&', '$', '`', '\n', '\r'];
        let path_str = path.to_string_lossy();
        if let Some(ch) = dangerous.iter().find(|c| path_str.contains(**c)) {
            return Err(SafebumpError::GitOperation(format!(
                "Path contains dangerous character: '{ch}'"
            )));
        }

        PathValidator::validate_project_path(path)
            .map_err(|err| SafebumpError::GitOperation(format!("Invalid Git path: {err}")))
    }
}

impl VersionControl for VersionControlAgent {
    fn is_repo(&self) -> Result<bool> {
        self.succeeded(&["rev-parse", "--git-dir"])
    }

    fn current_branch(&self) -> Result<Option<String>> {
        let output = self.run_git(&["branch", "--show-current"])?;
        if !output.status.success() {
            return Ok(None);
        }
        let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!branch.is_empty()).then_some(branch))
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        let output = self.run_git(&["status", "--porcelain"])?;
        if !output.status.success() {
            return Err(SafebumpError::GitOperation(format!(
                "git status failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    fn create_branch(&self, name: &str) -> Result<bool> {
        let name = PathValidator::validate_branch_name(name)?;
        self.succeeded(&["checkout", "-b", name])
    }

    fn switch_branch(&self, name: &str) -> Result<bool> {
        let name = PathValidator::validate_branch_name(name)?;
        self.succeeded(&["checkout", name])
    }

    fn delete_branch(&self, name: &str, force: bool) -> Result<bool> {
        let name = PathValidator::validate_branch_name(name)?;
        let flag = if force { "-D" } else { "-d" };
        self.succeeded(&["branch", flag, name])
    }

    fn commit_all(&self, message: &str) -> Result<bool> {
        if !self.succeeded(&["add", "-A"])? {
            return Ok(false);
        }
        self.succeeded(&["commit", "--no-verify", "-m", message])
    }

    fn discard_changes(&self) -> Result<bool> {
        if !self.succeeded(&["reset", "--hard", "--quiet"])? {
            return Ok(false);
        }
        self.succeeded(&["clean", "-fd", "--quiet"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn rejects_dangerous_paths() {
        let dir = tempdir().unwrap();
        let dangerous = dir.path().join("sub;dir");
        fs::create_dir_all(&dangerous).unwrap();
        assert!(VersionControlAgent::new(dangerous).is_err());
    }

    #[test]
    fn rejects_missing_paths() {
        let dir = tempdir().unwrap();
        assert!(VersionControlAgent::new(dir.path().join("missing")).is_err());
    }

    #[test]
    fn refuses_unsafe_branch_names_before_running_git() {
        let dir = tempdir().unwrap();
        let agent = VersionControlAgent::new(dir.path()).unwrap();
        assert!(matches!(
            agent.create_branch("--orphan").unwrap_err(),
            SafebumpError::GitOperation(_)
        ));
        assert!(agent.delete_branch("a..b", true).is_err());
    }

    fn git(dir: &Path, args: &[&str]) -> bool {
        Command::new("git")
            .current_dir(dir)
            .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
            .args(args)
            .output()
            .is_ok_and(|out| out.status.success())
    }

    #[test]
    fn discard_restores_tracked_files_and_keeps_ignored_ones() {
        let dir = tempdir().unwrap();
        if !git(dir.path(), &["init", "--quiet"]) {
            // no git binary available
            return;
        }
        fs::write(dir.path().join("package.json"), "{}\n").unwrap();
        fs::create_dir_all(dir.path().join(".safebump")).unwrap();
        fs::write(dir.path().join(".safebump/.gitignore"), "*\n").unwrap();
        assert!(git(dir.path(), &["add", "-A"]));
        assert!(git(dir.path(), &["commit", "--quiet", "-m", "init"]));

        fs::write(dir.path().join("package.json"), "{\"changed\":true}\n").unwrap();
        fs::write(dir.path().join("created.txt"), "new").unwrap();
        fs::write(dir.path().join(".safebump/lock"), "").unwrap();

        let agent = VersionControlAgent::new(dir.path()).unwrap();
        assert!(agent.has_uncommitted_changes().unwrap());
        assert!(agent.discard_changes().unwrap());

        assert!(!agent.has_uncommitted_changes().unwrap());
        assert_eq!(
            fs::read_to_string(dir.path().join("package.json")).unwrap(),
            "{}\n"
        );
        assert!(!dir.path().join("created.txt").exists());
        assert!(dir.path().join(".safebump/lock").exists());
    }
}
