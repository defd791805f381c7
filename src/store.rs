use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::models::SiteConfiguration;

/// Domain -> extraction rules. The only state that survives between runs.
#[derive(Debug, Default, Clone)]
pub struct ConfigStore {
    sites: BTreeMap<String, SiteConfiguration>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the store file. A missing file is an empty store; so is a
    /// corrupt one, with a warning. Entries that are not valid
    /// configurations are dropped.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::new(),
        };

        let entries: BTreeMap<String, Value> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Store file '{}' is corrupt or empty ({}). Starting a new one.",
                    path.display(),
                    e
                );
                return Self::new();
            }
        };

        let mut store = Self::new();
        for (domain, value) in entries {
            match serde_json::from_value::<SiteConfiguration>(value) {
                Ok(mut config) => {
                    config.domain = domain;
                    if let Err(e) = store.insert(config) {
                        warn!("Dropping stored entry: {}", e);
                    }
                }
                Err(e) => warn!("Dropping stored entry for {}: {}", domain, e),
            }
        }
        store
    }

    /// Writes the whole store as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.sites).map_err(|e| PipelineError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| PipelineError::io(path, e))
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.sites.contains_key(domain)
    }

    /// Adds a configuration. Invalid configurations are refused; an existing
    /// domain is never overwritten.
    pub fn insert(&mut self, config: SiteConfiguration) -> Result<bool> {
        if !config.is_valid() {
            return Err(PipelineError::InvalidConfiguration {
                raw: format!("{} has no container selector", config.domain),
            });
        }
        if self.sites.contains_key(&config.domain) {
            return Ok(false);
        }
        self.sites.insert(config.domain.clone(), config);
        Ok(true)
    }

    pub fn get(&self, domain: &str) -> Option<&SiteConfiguration> {
        self.sites.get(domain)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteConfiguration> {
        self.sites.values()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
