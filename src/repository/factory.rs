use crate::error::Result;
use crate::npm::NpmRegistry;
use crate::repository::RegistryClient;
use std::sync::Arc;

pub struct RegistryFactory;

impl RegistryFactory {
    pub fn create_npm(registry_url: Option<&str>) -> Result<Arc<dyn RegistryClient>> {
        let client = match registry_url {
            Some(url) => NpmRegistry::with_registry(url)?,
            None => NpmRegistry::new()?,
        };
        Ok(Arc::new(client))
    }
}
