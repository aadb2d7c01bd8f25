use crate::agents::manifest_editor::{DependencySection, ManifestEditor};
use crate::agents::package_manager::PackageManager;
use crate::agents::snapshot_store::{SnapshotId, SnapshotStore};
use crate::agents::update::pattern::PatternMatcher;
use crate::agents::update::reporter::Reporter;
use crate::error::{Result, SafebumpError};
use crate::npm::version::strip_range_operator;
use crate::npm::{RiskLevel, UpdateType, VersionComparator};
use crate::repository::RegistryClient;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// An available update for one declared dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCandidate {
    pub name: String,
    /// Declared range without its operator.
    pub current_version: String,
    pub latest_version: String,
    pub update_type: UpdateType,
    pub risk_level: RiskLevel,
    pub has_security_issue: bool,
    pub section: DependencySection,
}

/// Narrows analyzed candidates down to the ones the user asked for.
#[derive(Debug, Clone, Default)]
pub struct UpdateFilter {
    pub security_only: bool,
    pub patch_only: bool,
    /// Explicit selection; empty keeps every name.
    pub packages: Vec<String>,
    pub pattern: Option<PatternMatcher>,
}

impl UpdateFilter {
    fn keeps(&self, candidate: &UpdateCandidate) -> bool {
        if self.patch_only && candidate.update_type != UpdateType::Patch {
            return false;
        }
        if self.security_only && !candidate.has_security_issue {
            return false;
        }
        if !self.packages.is_empty() && !self.packages.iter().any(|p| *p == candidate.name) {
            return false;
        }
        self.pattern
            .as_ref()
            .is_none_or(|pattern| pattern.matches(&candidate.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedUpdate {
    pub name: String,
    pub from: String,
    pub to: String,
}

/// A completed update and the snapshot that undoes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub snapshot_id: SnapshotId,
    pub updated: Vec<AppliedUpdate>,
}

/// Analyze, snapshot, rewrite, install; restores the snapshot once if the
/// install fails.
pub struct UpdateOrchestrator {
    manifest: ManifestEditor,
    snapshots: SnapshotStore,
    registry: Arc<dyn RegistryClient>,
    package_manager: Arc<dyn PackageManager>,
}

impl UpdateOrchestrator {
    pub fn new(
        manifest: ManifestEditor,
        snapshots: SnapshotStore,
        registry: Arc<dyn RegistryClient>,
        package_manager: Arc<dyn PackageManager>,
    ) -> Self {
        Self {
            manifest,
            snapshots,
            registry,
            package_manager,
        }
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Every declared dependency with a newer published version, sorted by
    /// risk tier and then by name. A package declared in several sections is
    /// reported once, under the first section that declares it.
    pub fn analyze(
        &self,
        security_only: bool,
        reporter: &dyn Reporter,
    ) -> Result<Vec<UpdateCandidate>> {
        let declared = self.manifest.declared_dependencies()?;
        let vulnerable = self.vulnerable_packages();

        let mut seen = BTreeSet::new();
        let mut candidates = Vec::new();

        reporter.start_progress(declared.len());
        for dependency in declared {
            reporter.tick(&dependency.name);
            if !seen.insert(dependency.name.clone()) {
                continue;
            }

            let current = strip_range_operator(&dependency.range);
            if current.is_empty() {
                continue;
            }
            let Some(latest) = self.registry.latest_version(&dependency.name) else {
                debug!(package = %dependency.name, "no published version found");
                continue;
            };

            let diff = VersionComparator::compare(current, &latest);
            let Some(update_type) = diff.update_type.filter(|_| diff.needs_update) else {
                continue;
            };

            let has_security_issue = vulnerable.contains(&dependency.name);
            if security_only && !has_security_issue {
                continue;
            }

            candidates.push(UpdateCandidate {
                risk_level: VersionComparator::risk_level(Some(update_type), has_security_issue),
                current_version: current.to_string(),
                latest_version: latest,
                update_type,
                has_security_issue,
                section: dependency.section,
                name: dependency.name,
            });
        }
        reporter.finish_progress();

        candidates.sort_by(|a, b| {
            a.risk_level
                .cmp(&b.risk_level)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(candidates)
    }

    /// Keeps the candidates that pass every active filter, in their original
    /// order.
    pub fn select(candidates: Vec<UpdateCandidate>, filter: &UpdateFilter) -> Vec<UpdateCandidate> {
        candidates
            .into_iter()
            .filter(|candidate| filter.keeps(candidate))
            .collect()
    }

    /// Snapshots the current manifest, rewrites it to the selected versions and
    /// installs. If the install fails the snapshot is restored and installed
    /// again; the update is then reported as rolled back, or as a failed
    /// recovery when the second install fails too.
    pub fn apply(
        &self,
        selected: &[UpdateCandidate],
        reporter: &dyn Reporter,
    ) -> Result<UpdateOutcome> {
        if selected.is_empty() {
            return Err(SafebumpError::ProjectValidation(
                "No packages selected for update".to_string(),
            ));
        }

        let names: Vec<String> = selected.iter().map(|c| c.name.clone()).collect();

        reporter.begin("Creating snapshot...");
        let snapshot_id = self.snapshots.capture(&names)?;
        reporter.succeed(&format!("Snapshot created: {snapshot_id}"));

        reporter.begin("Updating package.json...");
        let targets: BTreeMap<String, String> = selected
            .iter()
            .map(|c| (c.name.clone(), c.latest_version.clone()))
            .collect();
        self.manifest.apply(&targets)?;
        reporter.succeed("package.json updated");

        reporter.begin("Installing dependencies...");
        let failure = match self.package_manager.install() {
            Ok(install) if install.success => None,
            Ok(install) => Some(install.output),
            Err(err) => Some(err.to_string()),
        };
        if let Some(output) = failure {
            reporter.fail("Installation failed");
            return Err(self.recover(snapshot_id, output, reporter));
        }
        reporter.succeed("Dependencies installed");

        Ok(UpdateOutcome {
            snapshot_id,
            updated: selected
                .iter()
                .map(|c| AppliedUpdate {
                    name: c.name.clone(),
                    from: c.current_version.clone(),
                    to: c.latest_version.clone(),
                })
                .collect(),
        })
    }

    /// Restores a snapshot chosen by the user and reinstalls from it.
    pub fn rollback(&self, snapshot_id: &str, reporter: &dyn Reporter) -> Result<()> {
        reporter.begin("Restoring snapshot...");
        self.snapshots.restore(snapshot_id)?;
        reporter.succeed("Snapshot restored");

        reporter.begin("Installing dependencies...");
        let install = self.package_manager.install()?;
        if !install.success {
            reporter.fail("Installation failed");
            return Err(SafebumpError::PackageManager(install.output));
        }
        reporter.succeed("Dependencies installed");
        Ok(())
    }

    /// One recovery attempt: restore the snapshot taken before the update and
    /// install again.
    fn recover(
        &self,
        snapshot_id: SnapshotId,
        install_output: String,
        reporter: &dyn Reporter,
    ) -> SafebumpError {
        reporter.warn("Rolling back to previous state...");
        warn!(snapshot = %snapshot_id, "install failed, restoring snapshot");

        if let Err(err) = self.snapshots.restore(&snapshot_id) {
            return SafebumpError::RecoveryFailed {
                snapshot_id,
                output: err.to_string(),
            };
        }

        match self.package_manager.install() {
            Ok(reinstall) if reinstall.success => SafebumpError::UpdateRolledBack {
                snapshot_id,
                output: install_output,
            },
            Ok(reinstall) => SafebumpError::RecoveryFailed {
                snapshot_id,
                output: reinstall.output,
            },
            Err(err) => SafebumpError::RecoveryFailed {
                snapshot_id,
                output: err.to_string(),
            },
        }
    }

    fn vulnerable_packages(&self) -> BTreeSet<String> {
        match self.package_manager.audit() {
            Ok(report) => {
                if !report.success {
                    debug!("npm audit report unreadable, no vulnerabilities known");
                }
                report.vulnerable_packages
            }
            Err(err) => {
                warn!(error = %err, "audit unavailable, assuming no known vulnerabilities");
                BTreeSet::new()
            }
        }
    }
}
