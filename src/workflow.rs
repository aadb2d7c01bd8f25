use crate::agents::manifest_editor::ManifestEditor;
use crate::agents::package_manager::{NpmExecutionAgent, PackageManager};
use crate::agents::project_scanner::{ProjectInfo, ProjectScannerAgent};
use crate::agents::snapshot_store::{RetentionPolicy, Snapshot, SnapshotStore};
use crate::agents::trial_runner::{TrialResult, TrialRunner, TrialState};
use crate::agents::update::{
    ConsoleReporter, PatternMatcher, Reporter, UpdateCandidate, UpdateFilter, UpdateInteraction,
    UpdateOrchestrator,
};
use crate::agents::version_control::VersionControlAgent;
use crate::config::Settings;
use crate::error::{Result, SafebumpError};
use crate::npm::RiskLevel;
use crate::repository::{Deprecation, RegistryClient, RegistryFactory};
use crate::utils::{FileStore, FsFileStore, ProjectLock};
use colored::{ColoredString, Colorize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Flags of the `update` command.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub interactive: bool,
    pub security: bool,
    pub safe: bool,
    pub all: bool,
    pub packages: Vec<String>,
    pub filter: Option<String>,
    pub yes: bool,
}

impl UpdateOptions {
    /// Per-package prompts run when asked for, or when nothing narrows the
    /// selection down.
    fn prompts_per_package(&self) -> bool {
        self.interactive
            || !(self.all
                || self.safe
                || self.security
                || !self.packages.is_empty()
                || self.filter.is_some())
    }
}

/// Project paths and collaborators shared by every command.
struct Workspace {
    info: ProjectInfo,
    store: Arc<dyn FileStore>,
}

impl Workspace {
    fn open(settings: &Settings) -> Result<Self> {
        println!("\n{}", "1. Validating project structure...".yellow());
        let info = ProjectScannerAgent::new(&settings.project_path).validate()?;
        println!("{}", "✓ Project structure is valid".green());
        if !info.has_lock_file {
            println!(
                "{}",
                "  No package-lock.json found; snapshots will only cover package.json".dimmed()
            );
        }
        Ok(Self {
            info,
            store: Arc::new(FsFileStore),
        })
    }

    /// Holds the project lock for as long as the guard lives.
    fn lock(&self) -> Result<ProjectLock> {
        self.info.prepare_state_dir(self.store.as_ref())?;
        ProjectLock::acquire(&self.info.lock_path())
    }

    fn manifest(&self) -> ManifestEditor {
        ManifestEditor::new(&self.info.manifest_path, self.store.clone())
    }

    fn snapshots(&self) -> SnapshotStore {
        SnapshotStore::new(
            self.info.project_path.clone(),
            self.info.snapshot_root(),
            self.store.clone(),
        )
    }

    fn package_manager(&self) -> Arc<dyn PackageManager> {
        Arc::new(NpmExecutionAgent::new(&self.info.project_path))
    }

    fn orchestrator(&self, registry: Arc<dyn RegistryClient>) -> UpdateOrchestrator {
        UpdateOrchestrator::new(
            self.manifest(),
            self.snapshots(),
            registry,
            self.package_manager(),
        )
    }
}

/// Execute the analyze workflow (read-only)
pub fn execute_analyze(settings: &Settings, security_only: bool) -> Result<()> {
    println!("{}", "Analyzing npm dependencies...".cyan().bold());

    let workspace = Workspace::open(settings)?;
    let registry = RegistryFactory::create_npm(settings.registry_url.as_deref())?;

    println!("\n{}", "2. Checking for available updates...".yellow());
    let reporter = ConsoleReporter::new();
    let candidates = workspace
        .orchestrator(registry)
        .analyze(security_only, &reporter)?;

    if candidates.is_empty() {
        println!("\n{}", "✨ All packages are up to date!".green().bold());
        return Ok(());
    }

    println!(
        "\n{}",
        format!("Found {} update(s) available:", candidates.len()).bold()
    );
    print_candidates_by_risk(&candidates);

    println!("\n{}", "To apply updates:".cyan());
    println!("  safebump update              # review each update");
    println!("  safebump update --safe       # patch updates only");
    println!("  safebump update --security   # security fixes only");
    Ok(())
}

/// Execute the update workflow
pub fn execute_update(settings: &Settings, options: UpdateOptions) -> Result<()> {
    println!("{}", "Starting dependency update process...".cyan().bold());

    let workspace = Workspace::open(settings)?;
    let registry = RegistryFactory::create_npm(settings.registry_url.as_deref())?;

    println!("\n{}", "2. Locking project...".yellow());
    let lock = workspace.lock()?;
    println!(
        "{}",
        format!("✓ Project locked ({})", lock.path().display()).green()
    );

    println!("\n{}", "3. Checking for available updates...".yellow());
    let reporter = ConsoleReporter::new();
    let orchestrator = workspace.orchestrator(registry);
    let candidates = orchestrator.analyze(options.security, &reporter)?;

    if candidates.is_empty() {
        println!("\n{}", "✨ All packages are up to date!".green().bold());
        return Ok(());
    }

    let filter = UpdateFilter {
        security_only: options.security,
        patch_only: options.safe,
        packages: options.packages.clone(),
        pattern: options
            .filter
            .as_deref()
            .map(PatternMatcher::new)
            .transpose()?,
    };
    let candidates = UpdateOrchestrator::select(candidates, &filter);
    if candidates.is_empty() {
        println!(
            "\n{}",
            "No packages match the selected criteria.".yellow()
        );
        return Ok(());
    }

    let mut interaction = UpdateInteraction::new(options.prompts_per_package());
    let selected = match interaction.choose_candidates(candidates) {
        Ok(selected) => selected,
        Err(SafebumpError::UserCancelled) => {
            println!("\n{}", "Update cancelled by user.".yellow());
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    if selected.is_empty() {
        println!("\n{}", "No packages selected for update.".yellow());
        return Ok(());
    }

    println!(
        "\n{}",
        format!("Updating {} package(s):", selected.len()).bold()
    );
    for candidate in &selected {
        println!(
            "  • {}: {} → {}",
            candidate.name.bold(),
            candidate.current_version,
            candidate.latest_version.green()
        );
    }

    if !options.yes && !interaction.confirm("\nProceed with updates?", true)? {
        println!("{}", "Update cancelled.".yellow());
        return Ok(());
    }

    println!("\n{}", "4. Applying updates...".yellow());
    let outcome = orchestrator.apply(&selected, &reporter)?;

    println!(
        "\n{}",
        format!(
            "✨ Successfully updated {} package(s)!",
            outcome.updated.len()
        )
        .green()
        .bold()
    );
    println!("Snapshot saved: {}", outcome.snapshot_id.cyan());
    println!(
        "{}",
        "Run 'safebump rollback' to restore it if needed.".dimmed()
    );
    Ok(())
}

/// Execute the sandboxed trial of a single package version
pub fn execute_test(settings: &Settings, package_spec: &str) -> Result<()> {
    let (package, version) = parse_package_spec(package_spec)?;
    println!(
        "{}",
        format!("Testing update: {package} → {version}").cyan().bold()
    );

    let workspace = Workspace::open(settings)?;
    let _lock = workspace.lock()?;

    println!("\n{}", "2. Reading declared version...".yellow());
    let manifest = workspace.manifest();
    let Some(current) = manifest.current_declared_version(package)? else {
        return Err(SafebumpError::ProjectValidation(format!(
            "Package {package} is not declared in package.json"
        )));
    };
    println!("   Current version: {}", current.dimmed());
    println!("   Test version:    {}", version.cyan());

    println!("\n{}", "3. Running impact test...".yellow());
    let package_manager = workspace.package_manager();
    let vcs = Arc::new(VersionControlAgent::new(&workspace.info.project_path)?);
    let mut trial = TrialRunner::new(
        vcs,
        package_manager.clone(),
        workspace.info.has_tsconfig,
        settings.outcome_detection,
    );

    let reporter = ConsoleReporter::new();
    reporter.begin("Installing and testing on a disposable branch...");
    let targets = BTreeMap::from([(package.to_string(), version.to_string())]);
    let outcome = trial.run_isolated(|| {
        manifest.apply(&targets)?;
        let install = package_manager.install()?;
        if !install.success {
            return Err(SafebumpError::PackageManager(install.output));
        }
        Ok(())
    });
    let history = trial.history();

    if history.contains(&TrialState::BranchCreated) {
        reporter.begin("Reinstalling original dependencies...");
        match package_manager.install() {
            Ok(install) if install.success => reporter.succeed("Original dependencies restored"),
            _ => reporter.warn("Could not reinstall original dependencies, run 'npm install'"),
        }
    } else {
        reporter.finish_progress();
        if history.contains(&TrialState::Mutated) {
            println!(
                "{}",
                "⚠ Not a git repository: the update was applied directly".yellow()
            );
        }
    }

    print_trial_result(&outcome?);
    Ok(())
}

/// Execute the rollback workflow
pub fn execute_rollback(settings: &Settings, snapshot_id: Option<&str>, yes: bool) -> Result<()> {
    println!("{}", "Rolling back to a snapshot...".cyan().bold());

    let workspace = Workspace::open(settings)?;
    let _lock = workspace.lock()?;
    let registry = RegistryFactory::create_npm(settings.registry_url.as_deref())?;
    let orchestrator = workspace.orchestrator(registry);

    println!("\n{}", "2. Reading snapshots...".yellow());
    let snapshots = orchestrator.snapshots().list()?;
    if snapshots.is_empty() {
        println!("{}", "No snapshots available for rollback.".yellow());
        println!("Snapshots are created automatically when you update packages.");
        return Ok(());
    }

    let mut interaction = UpdateInteraction::new(true);
    let snapshot = match snapshot_id {
        Some(id) => snapshots
            .iter()
            .find(|snapshot| snapshot.id == id)
            .ok_or_else(|| SafebumpError::SnapshotNotFound(id.to_string()))?,
        None => {
            println!("   Found {} snapshot(s):", snapshots.len());
            match interaction.choose_snapshot(&snapshots) {
                Ok(snapshot) => snapshot,
                Err(SafebumpError::UserCancelled) => {
                    println!("\n{}", "Rollback cancelled.".yellow());
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    };

    print_snapshot(snapshot);
    if !yes
        && !interaction.confirm(
            "This will replace your current package.json. Continue?",
            false,
        )?
    {
        println!("{}", "Rollback cancelled.".yellow());
        return Ok(());
    }

    println!("\n{}", "3. Restoring snapshot...".yellow());
    orchestrator.rollback(&snapshot.id, &ConsoleReporter::new())?;

    println!(
        "\n{}",
        "✨ Rollback completed successfully!".green().bold()
    );
    Ok(())
}

/// List snapshots, pruning when explicitly requested
pub fn execute_snapshots(settings: &Settings, prune_keep: Option<usize>) -> Result<()> {
    println!("{}", "Listing snapshots...".cyan().bold());

    let workspace = Workspace::open(settings)?;
    let store = workspace.snapshots();

    if let Some(keep) = prune_keep {
        let _lock = workspace.lock()?;
        println!(
            "\n{}",
            format!("2. Pruning all but the newest {keep} snapshot(s)...").yellow()
        );
        let removed = store.prune(RetentionPolicy::KeepLatest(keep))?;
        for id in &removed {
            println!("   {} {}", "-".red(), id.dimmed());
        }
        println!(
            "{}",
            format!("✓ Removed {} snapshot(s)", removed.len()).green()
        );
    }

    let snapshots = store.list()?;
    if snapshots.is_empty() {
        println!("\n{}", "No snapshots found.".yellow());
        return Ok(());
    }

    println!(
        "\n{}",
        format!(
            "{} snapshot(s) in {}:",
            snapshots.len(),
            store.snapshot_root().display()
        )
        .bold()
    );
    for snapshot in &snapshots {
        print_snapshot(snapshot);
    }
    Ok(())
}

/// Show registry information and the local dependency tree for a package
pub fn execute_why(settings: &Settings, package: &str) -> Result<()> {
    println!("{}", format!("Package info: {package}").cyan().bold());

    let workspace = Workspace::open(settings)?;
    let registry = RegistryFactory::create_npm(settings.registry_url.as_deref())?;

    println!("\n{}", "2. Fetching package information...".yellow());
    let metadata = registry.package_metadata(package).ok_or_else(|| {
        SafebumpError::Registry(format!("Package \"{package}\" not found in the npm registry"))
    })?;

    println!("\n{}", "Basic Information:".bold());
    println!("  Name:        {}", metadata.name.bold());
    println!("  Version:     {}", metadata.version.cyan());
    if let Some(description) = &metadata.description {
        println!("  Description: {description}");
    }
    if let Some(homepage) = &metadata.homepage {
        println!("  Homepage:    {}", homepage.blue());
    }

    println!("\n{}", "Dependency Information:".bold());
    match workspace.manifest().declaring_section(package)? {
        Some(section) => println!(
            "  {} Directly declared in {}",
            "✓".green(),
            section.to_string().bold()
        ),
        None => println!(
            "  {} Not declared directly (may be a transitive dependency)",
            "○".yellow()
        ),
    }

    match workspace.package_manager().explain(package) {
        Ok(tree) if tree.output.contains(package) => {
            println!("\n{}", "Dependency Tree:".bold());
            println!("{}", tree.output.trim_end().dimmed());
        }
        Ok(_) => {}
        Err(e) => tracing::debug!(error = %e, "npm ls unavailable"),
    }

    if metadata.is_deprecated() {
        println!("\n{}", "⚠ This package is deprecated!".yellow().bold());
        if let Some(reason) = metadata.deprecated.as_ref().and_then(Deprecation::reason) {
            println!("  Reason: {reason}");
        }
    }
    Ok(())
}

/// Splits `name@version`, keeping the leading `@` of scoped names.
fn parse_package_spec(spec: &str) -> Result<(&str, &str)> {
    let invalid = || {
        SafebumpError::ProjectValidation(format!(
            "Invalid package specification '{spec}'. Use the format name@version (e.g. axios@1.6.0)"
        ))
    };

    let split_at = spec
        .char_indices()
        .skip(1)
        .filter(|(_, c)| *c == '@')
        .map(|(idx, _)| idx)
        .last()
        .ok_or_else(invalid)?;
    let (name, version) = (&spec[..split_at], &spec[split_at + 1..]);

    if name.is_empty() || version.trim().is_empty() {
        return Err(invalid());
    }
    Ok((name, version.trim()))
}

fn risk_heading(risk: RiskLevel, count: usize) -> ColoredString {
    match risk {
        RiskLevel::Critical => format!("CRITICAL ({count}) - Security Issues").red().bold(),
        RiskLevel::Breaking => format!("BREAKING ({count}) - Major Updates").red().bold(),
        RiskLevel::Moderate => format!("MODERATE ({count}) - Minor Updates").yellow().bold(),
        RiskLevel::Safe => format!("SAFE ({count}) - Patch Updates").green().bold(),
    }
}

fn print_candidates_by_risk(candidates: &[UpdateCandidate]) {
    let mut groups: BTreeMap<RiskLevel, Vec<&UpdateCandidate>> = BTreeMap::new();
    for candidate in candidates {
        groups.entry(candidate.risk_level).or_default().push(candidate);
    }

    for (risk, group) in groups {
        println!("\n{}", risk_heading(risk, group.len()));
        for candidate in group {
            let tag = if candidate.has_security_issue {
                "[SECURITY]".red()
            } else {
                format!("[{}]", candidate.section).dimmed()
            };
            println!(
                "  {} {}: {} → {} {}",
                "●".bright_cyan(),
                candidate.name.bold(),
                candidate.current_version.dimmed(),
                candidate.latest_version.green(),
                tag
            );
        }
    }
}

fn print_trial_result(result: &TrialResult) {
    println!("\n{}", "Test Results:".bold());
    let status = |passed: bool| {
        if passed {
            "PASSED".green()
        } else {
            "FAILED".red()
        }
    };
    println!("  Tests:      {}", status(result.tests_passed));
    println!("  TypeScript: {}", status(result.type_check_passed));
    println!(
        "  Duration:   {:.2}s",
        result.duration_ms as f64 / 1000.0
    );

    if !result.errors.is_empty() {
        println!("\n{}", "Errors:".bold());
        for error in &result.errors {
            println!("{}", error.red());
        }
    }

    if result.success {
        println!(
            "\n{}",
            "✨ Impact test passed! The update appears safe.".green().bold()
        );
        println!("To apply it, run: safebump update");
    } else {
        println!(
            "\n{}",
            "✗ Impact test failed! The update may cause issues.".red().bold()
        );
        println!("Review the errors above before proceeding.");
    }
}

fn print_snapshot(snapshot: &Snapshot) {
    println!(
        "  • {} {}",
        snapshot.id.bold(),
        snapshot.timestamp.to_string().dimmed()
    );
    println!(
        "    Packages: {}",
        snapshot.package_names.join(", ").cyan()
    );
    if !snapshot.has_lock_file() {
        println!("    {}", "(no package-lock.json captured)".dimmed());
    }
}
