use crate::error::{Result, SafebumpError};
use std::path::{Path, PathBuf};

const FORBIDDEN_ROOTS: &[&str] = &["/etc", "/sys", "/proc", "/dev", "/boot"];

/// Validation for user-supplied paths and names that end up in filesystem
/// locations or subprocess arguments.
pub struct PathValidator;

impl PathValidator {
    /// Canonicalises the project directory and refuses system directories.
    pub fn validate_project_path(path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();

        let canonical = path.canonicalize().map_err(|e| {
            SafebumpError::ProjectValidation(format!("Invalid path '{}': {e}", path.display()))
        })?;

        if !canonical.is_dir() {
            return Err(SafebumpError::ProjectValidation(format!(
                "Path '{}' is not a directory",
                canonical.display()
            )));
        }

        for forbidden in FORBIDDEN_ROOTS {
            let forbidden_path = Path::new(forbidden);
            let canonical_forbidden = forbidden_path
                .canonicalize()
                .unwrap_or_else(|_| forbidden_path.to_path_buf());

            if canonical.starts_with(forbidden_path) || canonical.starts_with(&canonical_forbidden)
            {
                return Err(SafebumpError::ProjectValidation(format!(
                    "Access to system directory '{forbidden}' is not allowed"
                )));
            }
        }

        Ok(canonical)
    }

    /// Snapshot ids become directory names under the snapshot root, so they
    /// must be a single plain path component.
    pub fn validate_snapshot_id(id: &str) -> Result<&str> {
        let valid = !id.is_empty()
            && id.len() <= 128
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

        if valid {
            Ok(id)
        } else {
            Err(SafebumpError::SnapshotNotFound(id.to_string()))
        }
    }

    /// Branch names are passed to git as arguments. Follows the rules of
    /// `git check-ref-format --branch` and additionally rejects a leading `-`,
    /// which git would read as an option.
    pub fn validate_branch_name(name: &str) -> Result<&str> {
        let forbidden_char = |c: char| {
            c.is_ascii_control() || matches!(c, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\')
        };
        let bad_component =
            |part: &str| part.is_empty() || part.starts_with('.') || part.ends_with(".lock");

        let valid = !name.is_empty()
            && name != "@"
            && !name.starts_with('-')
            && !name.ends_with('.')
            && !name.contains("..")
            && !name.contains("@{")
            && !name.chars().any(forbidden_char)
            && !name.split('/').any(bad_component);

        if valid {
            Ok(name)
        } else {
            Err(SafebumpError::GitOperation(format!(
                "Refusing to use unsafe branch name '{name}'"
            )))
        }
    }
}
