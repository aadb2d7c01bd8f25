use crate::error::{Result, SafebumpError};
use crate::repository::{PackageMetadata, RegistryClient};
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_NPM_REGISTRY: &str = "https://registry.npmjs.org";
const MAX_MANIFEST_BYTES: usize = 10 * 1024 * 1024;

/// npm registry client
pub struct NpmRegistry {
    client: Client,
    base_url: String,
}

impl NpmRegistry {
    pub fn new() -> Result<Self> {
        Self::with_registry(DEFAULT_NPM_REGISTRY)
    }

    pub fn with_registry(registry_url: &str) -> Result<Self> {
        Self::validate_registry_url(registry_url)?;
        Ok(Self {
            client: Self::build_client()?,
            base_url: registry_url.trim_end_matches('/').to_string(),
        })
    }

    /// URL of the `latest` dist-tag manifest. Scoped names keep their `@` but
    /// encode the separating slash.
    pub fn latest_manifest_url(&self, name: &str) -> String {
        format!("{}/{}/latest", self.base_url, name.replace('/', "%2F"))
    }

    fn fetch_latest_manifest(&self, name: &str) -> Option<PackageMetadata> {
        if !Self::is_valid_package_name(name) {
            debug!(package = name, "refusing registry lookup for invalid name");
            return None;
        }

        let manifest_url = self.latest_manifest_url(name);
        debug!(url = %manifest_url, "fetching package manifest");

        let response = match self.client.get(&manifest_url).send() {
            Ok(resp) => resp,
            Err(e) => {
                debug!(url = %manifest_url, error = %e, "registry request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(url = %manifest_url, status = %response.status(), "registry lookup missed");
            return None;
        }

        let text = response.text().ok()?;
        if text.len() > MAX_MANIFEST_BYTES {
            debug!(url = %manifest_url, "registry manifest exceeded 10MB limit");
            return None;
        }

        Self::decode_manifest(&text)
    }

    /// Decodes a registry manifest; payloads that do not fit the expected
    /// record shape are treated as a miss.
    fn decode_manifest(text: &str) -> Option<PackageMetadata> {
        match serde_json::from_str::<PackageMetadata>(text) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                debug!(error = %e, "unexpected registry manifest shape");
                None
            }
        }
    }

    fn is_valid_package_name(name: &str) -> bool {
        if name.is_empty() || name.len() > 214 {
            return false;
        }

        let unscoped = match name.strip_prefix('@') {
            Some(scoped) => match scoped.split_once('/') {
                Some((scope, rest)) if !scope.is_empty() => rest,
                _ => return false,
            },
            None => name,
        };

        !unscoped.is_empty()
            && !unscoped.starts_with('.')
            && unscoped
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
    }

    fn build_client() -> Result<Client> {
        Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("safebump/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SafebumpError::Registry(format!("Failed to build HTTP client: {e}")))
    }

    fn validate_registry_url(url: &str) -> Result<()> {
        let parsed = Url::parse(url)
            .map_err(|_| SafebumpError::Registry(format!("Invalid registry URL: {url}")))?;

        match parsed.scheme() {
            "https" | "http" => {}
            scheme => {
                return Err(SafebumpError::Registry(format!(
                    "Unsupported registry scheme: {scheme}"
                )));
            }
        }

        if parsed.host_str().is_none() {
            return Err(SafebumpError::Registry(format!(
                "Registry URL has no host: {url}"
            )));
        }

        Ok(())
    }
}

impl RegistryClient for NpmRegistry {
    fn package_metadata(&self, name: &str) -> Option<PackageMetadata> {
        self.fetch_latest_manifest(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_https_registry() {
        assert!(NpmRegistry::validate_registry_url("https://registry.npmjs.org").is_ok());
        assert!(NpmRegistry::validate_registry_url("http://localhost:4873").is_ok());
    }

    #[test]
    fn rejects_invalid_scheme() {
        let err = NpmRegistry::validate_registry_url("ftp://example.com").unwrap_err();
        assert!(matches!(err, SafebumpError::Registry(_)));
        assert!(NpmRegistry::validate_registry_url("not a url").is_err());
    }

    #[test]
    fn encodes_scoped_package_urls() {
        let registry = NpmRegistry::with_registry("https://registry.example.com/").unwrap();
        assert_eq!(
            registry.latest_manifest_url("@types/node"),
            "https://registry.example.com/@types%2Fnode/latest"
        );
        assert_eq!(
            registry.latest_manifest_url("axios"),
            "https://registry.example.com/axios/latest"
        );
    }

    #[test]
    fn validates_package_names() {
        assert!(NpmRegistry::is_valid_package_name("axios"));
        assert!(NpmRegistry::is_valid_package_name("@babel/core"));
        assert!(NpmRegistry::is_valid_package_name("lodash.merge"));
        assert!(!NpmRegistry::is_valid_package_name(""));
        assert!(!NpmRegistry::is_valid_package_name("../etc"));
        assert!(!NpmRegistry::is_valid_package_name("@/x"));
        assert!(!NpmRegistry::is_valid_package_name("a b"));
    }

    #[test]
    fn decodes_manifest_or_misses() {
        let metadata = NpmRegistry::decode_manifest(
            r#"{"name":"axios","version":"1.6.0","homepage":"https://axios-http.com"}"#,
        )
        .unwrap();
        assert_eq!(metadata.version, "1.6.0");
        assert_eq!(metadata.homepage.as_deref(), Some("https://axios-http.com"));

        assert!(NpmRegistry::decode_manifest("<html>oops</html>").is_none());
        assert!(NpmRegistry::decode_manifest(r#"{"error":"Not found"}"#).is_none());
    }
}
