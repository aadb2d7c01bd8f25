use crate::error::{Result, SafebumpError};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::debug;

/// Exit status plus the captured diagnostic text of a package manager command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub output: String,
}

impl CommandOutput {
    pub fn new(success: bool, output: impl Into<String>) -> Self {
        Self {
            success,
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub success: bool,
    pub vulnerable_packages: BTreeSet<String>,
}

/// Operations the update pipeline needs from the package manager. A command
/// that runs and fails is reported through `CommandOutput`; only a command that
/// cannot be started is an error.
pub trait PackageManager: Send + Sync {
    fn install(&self) -> Result<CommandOutput>;
    fn run_tests(&self) -> Result<CommandOutput>;
    fn type_check(&self) -> Result<CommandOutput>;
    fn audit(&self) -> Result<AuditReport>;
    fn explain(&self, package: &str) -> Result<CommandOutput>;
}

/// npm (and npx for the TypeScript compiler) invoked in the project directory.
pub struct NpmExecutionAgent {
    project_path: PathBuf,
    npm: PathBuf,
    npx: PathBuf,
}

impl NpmExecutionAgent {
    pub fn new<P: AsRef<Path>>(project_path: P) -> Self {
        let (npm, npx) = if cfg!(target_os = "windows") {
            ("npm.cmd", "npx.cmd")
        } else {
            ("npm", "npx")
        };
        Self {
            project_path: project_path.as_ref().to_path_buf(),
            npm: PathBuf::from(npm),
            npx: PathBuf::from(npx),
        }
    }

    fn execute(&self, program: &Path, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(program, args)?;
        Ok(CommandOutput::new(
            output.status.success(),
            Self::combined_output(&output),
        ))
    }

    fn run(&self, program: &Path, args: &[&str]) -> Result<Output> {
        debug!(program = %program.display(), args = %args.join(" "), "executing");

        let output = Command::new(program)
            .current_dir(&self.project_path)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                SafebumpError::PackageManager(format!(
                    "Failed to execute '{} {}': {e}",
                    program.display(),
                    args.join(" ")
                ))
            })?;

        debug!(
            program = %program.display(),
            status = output.status.code().unwrap_or(-1),
            "command finished"
        );
        Ok(output)
    }

    fn combined_output(output: &Output) -> String {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", stdout.trim_end(), stderr.trim_end()),
            (false, true) => stdout.trim_end().to_string(),
            (true, _) => stderr.trim_end().to_string(),
        }
    }

    /// `npm audit --json` exits non-zero whenever vulnerabilities exist, so
    /// success here means "the report could be read".
    fn parse_audit(stdout: &[u8]) -> AuditReport {
        #[derive(Deserialize)]
        struct RawAudit {
            #[serde(default)]
            vulnerabilities: BTreeMap<String, Value>,
        }

        match serde_json::from_slice::<RawAudit>(stdout) {
            Ok(raw) => AuditReport {
                success: true,
                vulnerable_packages: raw.vulnerabilities.into_keys().collect(),
            },
            Err(e) => {
                debug!(error = %e, "unreadable audit report");
                AuditReport::default()
            }
        }
    }
}

impl PackageManager for NpmExecutionAgent {
    fn install(&self) -> Result<CommandOutput> {
        self.execute(&self.npm, &["install"])
    }

    fn run_tests(&self) -> Result<CommandOutput> {
        self.execute(&self.npm, &["test"])
    }

    fn type_check(&self) -> Result<CommandOutput> {
        self.execute(&self.npx, &["tsc", "--noEmit"])
    }

    fn audit(&self) -> Result<AuditReport> {
        let output = self.run(&self.npm, &["audit", "--json"])?;
        Ok(Self::parse_audit(&output.stdout))
    }

    fn explain(&self, package: &str) -> Result<CommandOutput> {
        self.execute(&self.npm, &["ls", package, "--depth=999"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_audit_vulnerabilities() {
        let report = NpmExecutionAgent::parse_audit(
            br#"{"auditReportVersion":2,"vulnerabilities":{"lodash":{"severity":"high"},"minimist":{}},"metadata":{}}"#,
        );
        assert!(report.success);
        assert_eq!(
            report.vulnerable_packages.into_iter().collect::<Vec<_>>(),
            vec!["lodash".to_string(), "minimist".to_string()]
        );
    }

    #[test]
    fn clean_audit_has_no_vulnerabilities() {
        let report = NpmExecutionAgent::parse_audit(br#"{"auditReportVersion":2,"metadata":{}}"#);
        assert!(report.success);
        assert!(report.vulnerable_packages.is_empty());
    }

    #[test]
    fn unreadable_audit_degrades_to_empty() {
        let report = NpmExecutionAgent::parse_audit(b"npm ERR! network");
        assert!(!report.success);
        assert!(report.vulnerable_packages.is_empty());
    }

    #[test]
    fn missing_program_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let agent = NpmExecutionAgent::new(dir.path());
        let err = agent
            .execute(Path::new("safebump-no-such-program"), &["--version"])
            .unwrap_err();
        assert!(matches!(err, SafebumpError::PackageManager(_)));
    }
}
