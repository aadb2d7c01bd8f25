//! In-memory collaborators for unit tests.

use crate::agents::package_manager::{AuditReport, CommandOutput, PackageManager};
use crate::agents::update::Reporter;
use crate::agents::version_control::VersionControl;
use crate::error::{Result, SafebumpError};
use crate::repository::{PackageMetadata, RegistryClient};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

pub struct FakeRegistry {
    packages: BTreeMap<String, PackageMetadata>,
}

impl FakeRegistry {
    pub fn with_latest(pairs: &[(&str, &str)]) -> Self {
        let packages = pairs
            .iter()
            .map(|(name, version)| {
                (
                    name.to_string(),
                    PackageMetadata {
                        name: name.to_string(),
                        version: version.to_string(),
                        description: None,
                        homepage: None,
                        deprecated: None,
                    },
                )
            })
            .collect();
        Self { packages }
    }
}

impl RegistryClient for FakeRegistry {
    fn package_metadata(&self, name: &str) -> Option<PackageMetadata> {
        self.packages.get(name).cloned()
    }
}

/// Scripted package manager. Queued results are consumed in order; an empty
/// queue answers with a successful, silent run.
#[derive(Default)]
pub struct FakePackageManager {
    installs: Mutex<VecDeque<CommandOutput>>,
    tests: Mutex<VecDeque<CommandOutput>>,
    type_checks: Mutex<VecDeque<CommandOutput>>,
    vulnerable: BTreeSet<String>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakePackageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vulnerable(mut self, names: &[&str]) -> Self {
        self.vulnerable = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn queue_install(self, success: bool, output: &str) -> Self {
        self.installs
            .lock()
            .unwrap()
            .push_back(CommandOutput::new(success, output));
        self
    }

    pub fn queue_tests(self, success: bool, output: &str) -> Self {
        self.tests
            .lock()
            .unwrap()
            .push_back(CommandOutput::new(success, output));
        self
    }

    pub fn queue_type_check(self, success: bool, output: &str) -> Self {
        self.type_checks
            .lock()
            .unwrap()
            .push_back(CommandOutput::new(success, output));
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn next(&self, call: &'static str, queue: &Mutex<VecDeque<CommandOutput>>) -> CommandOutput {
        self.calls.lock().unwrap().push(call);
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| CommandOutput::new(true, ""))
    }
}

impl PackageManager for FakePackageManager {
    fn install(&self) -> Result<CommandOutput> {
        Ok(self.next("install", &self.installs))
    }

    fn run_tests(&self) -> Result<CommandOutput> {
        Ok(self.next("test", &self.tests))
    }

    fn type_check(&self) -> Result<CommandOutput> {
        Ok(self.next("type_check", &self.type_checks))
    }

    fn audit(&self) -> Result<AuditReport> {
        self.calls.lock().unwrap().push("audit");
        Ok(AuditReport {
            success: true,
            vulnerable_packages: self.vulnerable.clone(),
        })
    }

    fn explain(&self, package: &str) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push("explain");
        Ok(CommandOutput::new(true, format!("demo@1.0.0\n`-- {package}@1.0.0")))
    }
}

#[derive(Debug)]
struct GitState {
    current: Option<String>,
    branches: BTreeSet<String>,
    commits: Vec<(String, String)>,
    /// Uncommitted edits; like a real worktree they follow a branch switch.
    pending: Vec<String>,
}

/// Branch bookkeeping that behaves like a repository with a single worktree.
pub struct FakeGit {
    repo: bool,
    dirty: bool,
    fail_create: bool,
    fail_switch: bool,
    fail_commit: bool,
    fail_discard: bool,
    state: Mutex<GitState>,
}

impl FakeGit {
    pub fn on_branch(branch: &str) -> Self {
        Self {
            repo: true,
            dirty: false,
            fail_create: false,
            fail_switch: false,
            fail_commit: false,
            fail_discard: false,
            state: Mutex::new(GitState {
                current: Some(branch.to_string()),
                branches: BTreeSet::from([branch.to_string()]),
                commits: Vec::new(),
                pending: Vec::new(),
            }),
        }
    }

    pub fn not_a_repo() -> Self {
        Self {
            repo: false,
            ..Self::on_branch("main")
        }
    }

    pub fn detached() -> Self {
        let git = Self::on_branch("main");
        git.state.lock().unwrap().current = None;
        git
    }

    pub fn dirty(mut self) -> Self {
        self.dirty = true;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_switch(mut self) -> Self {
        self.fail_switch = true;
        self
    }

    /// Commits fail the way they do without a committer identity.
    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn failing_discard(mut self) -> Self {
        self.fail_discard = true;
        self
    }

    /// Records an uncommitted change to `file` in the worktree.
    pub fn edit(&self, file: &str) {
        self.state.lock().unwrap().pending.push(file.to_string());
    }

    pub fn pending_edits(&self) -> Vec<String> {
        self.state.lock().unwrap().pending.clone()
    }

    pub fn current(&self) -> Option<String> {
        self.state.lock().unwrap().current.clone()
    }

    pub fn branches(&self) -> Vec<String> {
        self.state.lock().unwrap().branches.iter().cloned().collect()
    }

    /// `(branch, message)` of every commit made.
    pub fn commits(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().commits.clone()
    }
}

impl VersionControl for FakeGit {
    fn is_repo(&self) -> Result<bool> {
        Ok(self.repo)
    }

    fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.current())
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        Ok(self.dirty || !self.state.lock().unwrap().pending.is_empty())
    }

    fn create_branch(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if self.fail_create || state.branches.contains(name) {
            return Ok(false);
        }
        state.branches.insert(name.to_string());
        state.current = Some(name.to_string());
        Ok(true)
    }

    fn switch_branch(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if self.fail_switch || !state.branches.contains(name) {
            return Ok(false);
        }
        state.current = Some(name.to_string());
        Ok(true)
    }

    fn delete_branch(&self, name: &str, force: bool) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if !force || state.current.as_deref() == Some(name) {
            return Ok(false);
        }
        Ok(state.branches.remove(name))
    }

    fn commit_all(&self, message: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let Some(branch) = state.current.clone() else {
            return Err(SafebumpError::GitOperation("detached HEAD".to_string()));
        };
        if self.fail_commit {
            return Ok(false);
        }
        state.pending.clear();
        state.commits.push((branch, message.to_string()));
        Ok(true)
    }

    fn discard_changes(&self) -> Result<bool> {
        if self.fail_discard {
            return Ok(false);
        }
        self.state.lock().unwrap().pending.clear();
        Ok(true)
    }
}

/// Records every report as `"<kind>: <message>"`.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, kind: &str, message: &str) {
        self.events.lock().unwrap().push(format!("{kind}: {message}"));
    }
}

impl Reporter for RecordingReporter {
    fn begin(&self, message: &str) {
        self.record("begin", message);
    }

    fn succeed(&self, message: &str) {
        self.record("succeed", message);
    }

    fn fail(&self, message: &str) {
        self.record("fail", message);
    }

    fn warn(&self, message: &str) {
        self.record("warn", message);
    }

    fn start_progress(&self, total: usize) {
        self.record("progress", &total.to_string());
    }

    fn tick(&self, item: &str) {
        self.record("tick", item);
    }

    fn finish_progress(&self) {}
}
