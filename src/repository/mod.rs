use serde::Deserialize;

pub mod factory;
pub use factory::RegistryFactory;

/// `deprecated` is published either as a boolean flag or as a message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Deprecation {
    Flag(bool),
    Message(String),
}

impl Deprecation {
    pub fn is_deprecated(&self) -> bool {
        match self {
            Deprecation::Flag(flag) => *flag,
            Deprecation::Message(_) => true,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Deprecation::Message(message) => Some(message.as_str()),
            Deprecation::Flag(_) => None,
        }
    }
}

/// Manifest of a published package version as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub deprecated: Option<Deprecation>,
}

impl PackageMetadata {
    pub fn is_deprecated(&self) -> bool {
        self.deprecated
            .as_ref()
            .map(Deprecation::is_deprecated)
            .unwrap_or(false)
    }
}

/// Lookup of published package information. Implementations report every
/// not-found or network condition as `None`.
pub trait RegistryClient: Send + Sync {
    fn package_metadata(&self, name: &str) -> Option<PackageMetadata>;

    fn latest_version(&self, name: &str) -> Option<String> {
        self.package_metadata(name).map(|metadata| metadata.version)
    }
}
