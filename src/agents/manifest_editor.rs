use crate::error::{Result, SafebumpError};
use crate::npm::version::split_range_operator;
use crate::utils::FileStore;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Dependency sections of `package.json`, in the order they are searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencySection {
    Dependencies,
    DevDependencies,
    PeerDependencies,
    OptionalDependencies,
}

impl DependencySection {
    pub const ALL: [DependencySection; 4] = [
        DependencySection::Dependencies,
        DependencySection::DevDependencies,
        DependencySection::PeerDependencies,
        DependencySection::OptionalDependencies,
    ];

    pub fn key(self) -> &'static str {
        match self {
            DependencySection::Dependencies => "dependencies",
            DependencySection::DevDependencies => "devDependencies",
            DependencySection::PeerDependencies => "peerDependencies",
            DependencySection::OptionalDependencies => "optionalDependencies",
        }
    }
}

impl fmt::Display for DependencySection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredDependency {
    pub name: String,
    pub range: String,
    pub section: DependencySection,
}

/// Reads and rewrites the dependency declarations of `package.json`.
pub struct ManifestEditor {
    manifest_path: PathBuf,
    store: Arc<dyn FileStore>,
}

impl ManifestEditor {
    pub fn new<P: AsRef<Path>>(manifest_path: P, store: Arc<dyn FileStore>) -> Self {
        Self {
            manifest_path: manifest_path.as_ref().to_path_buf(),
            store,
        }
    }

    /// Sets each named package to `prefix + version` in every section that
    /// declares it, keeping the existing range operator. Packages the manifest
    /// does not declare are skipped. Returns whether anything changed.
    pub fn apply(&self, target_versions: &BTreeMap<String, String>) -> Result<bool> {
        let raw = self.read_raw()?;
        let mut doc = self.parse(&raw)?;
        let mut changed = false;

        for section in DependencySection::ALL {
            let Some(deps) = doc.get_mut(section.key()).and_then(Value::as_object_mut) else {
                continue;
            };

            for (name, new_version) in target_versions {
                let Some(declared) = deps.get_mut(name) else {
                    continue;
                };
                let Some(range) = declared.as_str() else {
                    debug!(package = %name, %section, "skipping non-string declaration");
                    continue;
                };

                let (prefix, _) = split_range_operator(range);
                let updated = format!("{prefix}{new_version}");
                if updated != range {
                    debug!(package = %name, %section, from = range, to = %updated, "rewriting range");
                    *declared = Value::String(updated);
                    changed = true;
                }
            }
        }

        if changed {
            let rendered = Self::render(&doc, &raw)?;
            self.store.write_bytes(&self.manifest_path, &rendered)?;
        }

        Ok(changed)
    }

    /// The declared range of a package, taken from the first section that
    /// lists it.
    pub fn current_declared_version(&self, package: &str) -> Result<Option<String>> {
        Ok(self
            .find_declaration(package)?
            .map(|declared| declared.range))
    }

    pub fn declaring_section(&self, package: &str) -> Result<Option<DependencySection>> {
        Ok(self
            .find_declaration(package)?
            .map(|declared| declared.section))
    }

    /// Every string declaration in section order.
    pub fn declared_dependencies(&self) -> Result<Vec<DeclaredDependency>> {
        let doc = self.load()?;
        let mut declared = Vec::new();

        for section in DependencySection::ALL {
            let Some(deps) = doc.get(section.key()).and_then(Value::as_object) else {
                continue;
            };
            for (name, range) in deps {
                if let Some(range) = range.as_str() {
                    declared.push(DeclaredDependency {
                        name: name.clone(),
                        range: range.to_string(),
                        section,
                    });
                }
            }
        }

        Ok(declared)
    }

    fn find_declaration(&self, package: &str) -> Result<Option<DeclaredDependency>> {
        Ok(self
            .declared_dependencies()?
            .into_iter()
            .find(|declared| declared.name == package))
    }

    fn load(&self) -> Result<Map<String, Value>> {
        let raw = self.read_raw()?;
        self.parse(&raw)
    }

    fn read_raw(&self) -> Result<Vec<u8>> {
        self.store
            .read_bytes(&self.manifest_path)
            .map_err(|e| SafebumpError::manifest_unreadable(&self.manifest_path, e))?
            .ok_or_else(|| SafebumpError::manifest_unreadable(&self.manifest_path, "file not found"))
    }

    fn parse(&self, raw: &[u8]) -> Result<Map<String, Value>> {
        match serde_json::from_slice::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(SafebumpError::manifest_unreadable(
                &self.manifest_path,
                "top-level value is not an object",
            )),
            Err(e) => Err(SafebumpError::manifest_unreadable(&self.manifest_path, e)),
        }
    }

    /// Pretty-prints the document with the indentation, line endings and
    /// trailing newline of the original file.
    fn render(doc: &Map<String, Value>, original: &[u8]) -> Result<Vec<u8>> {
        let indent = detect_indent(original);
        let mut out = Vec::with_capacity(original.len() + 16);
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(&indent));
        doc.serialize(&mut serializer)?;

        if original.is_empty() || original.last() == Some(&b'\n') {
            out.push(b'\n');
        }
        if !uses_crlf(original) {
            return Ok(out);
        }

        // serialized strings escape their newlines, so every '\n' is a line break
        let mut crlf = Vec::with_capacity(out.len() + out.len() / 8);
        for byte in out {
            if byte == b'\n' {
                crlf.push(b'\r');
            }
            crlf.push(byte);
        }
        Ok(crlf)
    }
}

fn uses_crlf(original: &[u8]) -> bool {
    original
        .iter()
        .position(|b| *b == b'\n')
        .is_some_and(|at| at > 0 && original[at - 1] == b'\r')
}

fn detect_indent(original: &[u8]) -> Vec<u8> {
    original
        .split(|b| *b == b'\n')
        .skip(1)
        .find_map(|line| {
            let width = line
                .iter()
                .take_while(|b| **b == b' ' || **b == b'\t')
                .count();
            (width > 0 && width < line.len()).then(|| line[..width].to_vec())
        })
        .unwrap_or_else(|| b"  ".to_vec())
}
