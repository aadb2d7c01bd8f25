use crate::agents::package_manager::{CommandOutput, PackageManager};
use crate::agents::version_control::VersionControl;
use crate::config::OutcomeDetection;
use crate::error::{Result, SafebumpError};
use crate::utils::PathValidator;
use jiff::Timestamp;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

const TRIAL_BRANCH_PREFIX: &str = "safebump/trial-";
const TRIAL_COMMIT_MESSAGE: &str = "safebump: trial changes";

/// Progress of a sandboxed trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Idle,
    BranchCreated,
    Mutated,
    Tested,
    Aborting,
    Cleaned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialResult {
    pub success: bool,
    pub tests_passed: bool,
    pub type_check_passed: bool,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

/// Runs a candidate mutation on a disposable branch, checks the project, and
/// always returns the working tree to the branch it started on.
pub struct TrialRunner {
    vcs: Arc<dyn VersionControl>,
    package_manager: Arc<dyn PackageManager>,
    type_check: bool,
    detection: OutcomeDetection,
    history: Vec<TrialState>,
}

impl TrialRunner {
    pub fn new(
        vcs: Arc<dyn VersionControl>,
        package_manager: Arc<dyn PackageManager>,
        type_check: bool,
        detection: OutcomeDetection,
    ) -> Self {
        Self {
            vcs,
            package_manager,
            type_check,
            detection,
            history: vec![TrialState::Idle],
        }
    }

    pub fn state(&self) -> TrialState {
        self.history.last().copied().unwrap_or(TrialState::Idle)
    }

    /// Every state the last trial passed through, starting with `Idle`.
    pub fn history(&self) -> &[TrialState] {
        &self.history
    }

    pub fn run_isolated<F>(&mut self, mutation: F) -> Result<TrialResult>
    where
        F: FnOnce() -> Result<()>,
    {
        self.history = vec![TrialState::Idle];
        let started = Instant::now();

        if !self.vcs.is_repo()? {
            warn!("project is not a git repository, applying the trial without a sandbox");
            return self.run_direct(mutation, started);
        }

        if self.vcs.has_uncommitted_changes()? {
            return Err(SafebumpError::DirtyWorkingTree);
        }

        let original = self.vcs.current_branch()?.ok_or_else(|| {
            SafebumpError::GitOperation(
                "Cannot determine the current branch (detached HEAD?)".to_string(),
            )
        })?;
        // checked before mutating so the switch back cannot be refused
        PathValidator::validate_branch_name(&original)?;
        let trial_branch = Self::trial_branch_name();

        let outcome = self.run_on_branch(&trial_branch, mutation, started);
        if outcome.is_err() {
            self.transition(TrialState::Aborting);
        }
        let cleanup = self.cleanup(&original, &trial_branch);
        self.transition(TrialState::Cleaned);

        match (outcome, cleanup) {
            (Ok(result), Ok(())) => Ok(result),
            (Ok(_), Err(cleanup_err)) => Err(cleanup_err),
            (Err(err), cleanup) => {
                if let Err(cleanup_err) = cleanup {
                    warn!(error = %cleanup_err, "cleanup after failed trial also failed");
                }
                Err(err)
            }
        }
    }

    fn run_direct<F>(&mut self, mutation: F, started: Instant) -> Result<TrialResult>
    where
        F: FnOnce() -> Result<()>,
    {
        mutation()?;
        self.transition(TrialState::Mutated);
        let result = self.run_checks(started)?;
        self.transition(TrialState::Tested);
        self.transition(TrialState::Cleaned);
        Ok(result)
    }

    fn run_on_branch<F>(
        &mut self,
        trial_branch: &str,
        mutation: F,
        started: Instant,
    ) -> Result<TrialResult>
    where
        F: FnOnce() -> Result<()>,
    {
        if !self.vcs.create_branch(trial_branch)? {
            return Err(SafebumpError::GitOperation(format!(
                "Failed to create trial branch '{trial_branch}'"
            )));
        }
        self.transition(TrialState::BranchCreated);

        mutation()?;
        self.transition(TrialState::Mutated);

        let result = self.run_checks(started)?;
        self.transition(TrialState::Tested);
        Ok(result)
    }

    /// Parks the trial edits on the disposable branch, returns to the original
    /// branch and deletes the disposable one. Edits that cannot be committed
    /// are discarded instead; if that fails too, the disposable branch is
    /// left checked out so nothing leaks onto the original branch.
    fn cleanup(&self, original: &str, trial_branch: &str) -> Result<()> {
        let branch_created = self.history.contains(&TrialState::BranchCreated);

        if branch_created && self.vcs.current_branch()?.as_deref() == Some(trial_branch) {
            let committed = match self.vcs.commit_all(TRIAL_COMMIT_MESSAGE) {
                Ok(committed) => committed,
                Err(e) => {
                    warn!(error = %e, "could not commit trial changes");
                    false
                }
            };
            // also the path taken when the trial changed nothing
            if !committed && !self.vcs.discard_changes()? {
                return Err(SafebumpError::SandboxCleanup(format!(
                    "could not commit or discard the trial changes; they remain on branch '{trial_branch}'"
                )));
            }
        }

        if !self.vcs.switch_branch(original)? {
            return Err(SafebumpError::SandboxCleanup(format!(
                "could not switch back to '{original}'"
            )));
        }

        if !self.vcs.delete_branch(trial_branch, true)? && branch_created {
            return Err(SafebumpError::SandboxCleanup(format!(
                "could not delete trial branch '{trial_branch}'"
            )));
        }

        Ok(())
    }

    fn run_checks(&self, started: Instant) -> Result<TrialResult> {
        let mut errors = Vec::new();

        let tests = self.package_manager.run_tests()?;
        let tests_passed = self.judge(&tests, "failed");
        if !tests_passed && !tests.output.is_empty() {
            errors.push(tests.output);
        }

        let mut type_check_passed = true;
        if self.type_check {
            let check = self.package_manager.type_check()?;
            type_check_passed = self.judge(&check, "error");
            if !type_check_passed && !check.output.is_empty() {
                errors.push(check.output);
            }
        }

        Ok(TrialResult {
            success: tests_passed && type_check_passed,
            tests_passed,
            type_check_passed,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            errors,
        })
    }

    fn judge(&self, run: &CommandOutput, failure_marker: &str) -> bool {
        match self.detection {
            OutcomeDetection::ExitStatus => run.success,
            OutcomeDetection::Heuristic => {
                run.success && !run.output.to_lowercase().contains(failure_marker)
            }
        }
    }

    fn transition(&mut self, next: TrialState) {
        debug!(from = ?self.state(), to = ?next, "trial state");
        self.history.push(next);
    }

    fn trial_branch_name() -> String {
        format!("{TRIAL_BRANCH_PREFIX}{}", Timestamp::now().as_millisecond())
    }
}
