use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::error::{PipelineError, Result};

/// Marker written in place of any field the site or the model did not provide
pub const NOT_INFORMED: &str = "N/I";

/// Host part of a URL (with the port, if any). Used as the key for
/// configurations and for deduplication across runs.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?;
    if host.is_empty() {
        return None;
    }
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// CSS selectors the model inferred for one listing page.
///
/// Everything except `next_page` is relative to the container element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSet {
    #[serde(rename = "container_anuncio")]
    pub container: String,
    #[serde(rename = "preco", default, deserialize_with = "null_as_empty")]
    pub price: String,
    #[serde(rename = "endereco", default, deserialize_with = "null_as_empty")]
    pub address: String,
    #[serde(rename = "descricao", default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(rename = "proxima_pagina", default)]
    pub next_page: Option<String>,
}

/// Extraction rules for one domain, as persisted in the configuration store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfiguration {
    /// Key in the store; not part of the stored value
    #[serde(skip)]
    pub domain: String,
    #[serde(flatten)]
    pub selectors: SelectorSet,
    #[serde(rename = "url_busca")]
    pub source_url: String,
}

impl SiteConfiguration {
    pub fn new(domain: impl Into<String>, source_url: impl Into<String>, selectors: SelectorSet) -> Self {
        Self {
            domain: domain.into(),
            selectors,
            source_url: source_url.into(),
        }
    }

    /// A configuration is usable only when it names a container selector.
    pub fn is_valid(&self) -> bool {
        !self.selectors.container.trim().is_empty()
    }

    pub fn next_page_selector(&self) -> Option<&str> {
        self.selectors
            .next_page
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// One scraped listing. Column names match the per-site CSV headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "tipo")]
    pub property_type: String,
    #[serde(rename = "endereco")]
    pub address: String,
    #[serde(rename = "preco")]
    pub price: String,
    pub area: String,
    #[serde(rename = "quartos")]
    pub bedroom_count: String,
    #[serde(rename = "salas")]
    pub living_room_count: String,
    #[serde(rename = "banheiros")]
    pub bathroom_count: String,
    #[serde(rename = "garagem")]
    pub parking_spots: String,
    #[serde(rename = "site")]
    pub site_domain: String,
}

/// Column order of per-site batches and of the consolidated table
pub const RECORD_COLUMNS: [&str; 10] = [
    "codigo", "tipo", "endereco", "preco", "area", "quartos", "salas", "banheiros", "garagem", "site",
];

/// A `(site, reason)` pair collected during a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub site: String,
    pub reason: String,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.site, self.reason)
    }
}

/// Per-run error accumulator, flushed once to a text report at stage end
#[derive(Debug, Default)]
pub struct ErrorLog {
    entries: Vec<ErrorRecord>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, site: impl Into<String>, reason: impl fmt::Display) {
        self.entries.push(ErrorRecord {
            site: site.into(),
            reason: reason.to_string(),
        });
    }

    pub fn entries(&self) -> &[ErrorRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the report only if at least one error was recorded.
    /// Returns whether a file was written.
    pub fn write_report(&self, path: &Path, title: &str) -> Result<bool> {
        if self.entries.is_empty() {
            return Ok(false);
        }

        let mut body = format!("{title}\n{}\n", "=".repeat(40));
        for entry in &self.entries {
            body.push_str(&entry.to_string());
            body.push('\n');
        }

        std::fs::write(path, body).map_err(|e| PipelineError::io(path, e))?;
        Ok(true)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn domain_keeps_subdomain_and_port() {
        assert_eq!(domain_of("https://www.imob.com.br/venda?p=1").as_deref(), Some("www.imob.com.br"));
        assert_eq!(domain_of("http://localhost:8080/x").as_deref(), Some("localhost:8080"));
        assert_eq!(domain_of("not a url"), None);
    }

    #[test]
    fn configuration_uses_store_field_names() {
        let config = SiteConfiguration::new(
            "imob.com.br",
            "https://imob.com.br",
            SelectorSet {
                container: ".card".into(),
                price: ".price".into(),
                address: String::new(),
                description: ".desc".into(),
                next_page: None,
            },
        );

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["container_anuncio"], ".card");
        assert_eq!(value["url_busca"], "https://imob.com.br");
        assert_eq!(value["proxima_pagina"], serde_json::Value::Null);
        assert!(value.get("domain").is_none());
    }

    #[test]
    fn stored_nulls_become_empty_selectors() {
        let config: SiteConfiguration = serde_json::from_value(json!({
            "container_anuncio": "li.item",
            "preco": null,
            "url_busca": "https://a.com"
        }))
        .unwrap();

        assert_eq!(config.selectors.price, "");
        assert_eq!(config.selectors.address, "");
        assert_eq!(config.next_page_selector(), None);
    }

    #[test]
    fn blank_next_page_counts_as_missing() {
        let mut config = SiteConfiguration::new("a.com", "https://a.com", SelectorSet {
            container: "div".into(),
            price: String::new(),
            address: String::new(),
            description: String::new(),
            next_page: Some("  ".into()),
        });
        assert_eq!(config.next_page_selector(), None);

        config.selectors.next_page = Some("a.next".into());
        assert_eq!(config.next_page_selector(), Some("a.next"));
    }

    #[test]
    fn error_log_writes_nothing_when_empty() {
        let dir = std::env::temp_dir().join(format!("scout-errlog-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("empty.txt");

        let log = ErrorLog::new();
        assert!(!log.write_report(&path, "Report").unwrap());
        assert!(!path.exists());

        let mut log = ErrorLog::new();
        log.record("a.com", "Timeout");
        assert!(log.write_report(&path, "Report").unwrap());
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Report\n===="));
        assert!(text.ends_with("a.com - Timeout\n"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
