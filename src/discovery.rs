//! Site discovery: search-engine queries for a city, filtered down to
//! candidate real-estate agency sites.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{PipelineError, Result};
use crate::models::domain_of;
use crate::scrapers::browser::USER_AGENT;

pub const RESULTS_PER_QUERY: usize = 50;

/// Appended to every query to keep job boards, registries and news out
pub const EXCLUDED_QUERY_TERMS: &str = "-vagas -emprego -classificados -cartorio -registro -noticias";

/// A result URL must contain one of these to be kept
pub const INCLUDE_KEYWORDS: [&str; 7] = [
    "imoveis",
    "imobiliaria",
    "corretor",
    "creci",
    "aluguel",
    "venda",
    "lançamentos",
];

/// Large portals, social networks and job sites that are never candidates
pub const BLOCKED_DOMAINS: [&str; 20] = [
    "zapimoveis",
    "vivareal",
    "olx",
    "imovelweb",
    "mercadolivre",
    "facebook",
    "instagram",
    "linkedin",
    "youtube",
    "twitter",
    "infojobs",
    "catho",
    "vagas.com.br",
    "indeed",
    "glassdoor",
    "guiamais",
    "jusbrasil",
    "gov.br",
    "prefeitura",
    "econodata",
];

pub fn build_queries(city: &str) -> Vec<String> {
    vec![
        format!("site imobiliária \"{city}\" MG {EXCLUDED_QUERY_TERMS}"),
        format!("imóveis à venda em \"{city}\" {EXCLUDED_QUERY_TERMS}"),
        format!("corretor de imóveis site \"{city}\" {EXCLUDED_QUERY_TERMS}"),
    ]
}

/// Domain of `url` when it looks like an agency site, `None` otherwise.
pub fn candidate_domain(url: &str) -> Option<String> {
    let domain = domain_of(url)?;
    if BLOCKED_DOMAINS.iter().any(|blocked| domain.contains(blocked)) {
        return None;
    }

    let lowered = url.to_lowercase();
    INCLUDE_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
        .then_some(domain)
}

/// Web search backend
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>>;
}

/// Scrapes DuckDuckGo's HTML results page
pub struct DuckDuckGoSearch {
    client: Client,
    endpoint: String,
}

impl DuckDuckGoSearch {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Self::with_endpoint("https://html.duckduckgo.com/html/", timeout)
    }

    pub fn with_endpoint(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl SearchEngine for DuckDuckGoSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let fetch_error = |reason: String| PipelineError::NetworkFetchError {
            url: self.endpoint.clone(),
            reason,
        };

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("kl", "br-pt")])
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_error(format!("HTTP status {}", response.status())));
        }

        let html = response.text().await.map_err(|e| fetch_error(e.to_string()))?;
        let mut results = parse_result_links(&html);
        results.truncate(limit);
        Ok(results)
    }
}

/// Result URLs from a DuckDuckGo HTML page, with redirect links unwrapped.
pub fn parse_result_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a.result__a") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(unwrap_redirect)
        .collect()
}

fn unwrap_redirect(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    let parsed = Url::parse(&absolute).ok()?;

    if parsed.host_str().is_some_and(|h| h.ends_with("duckduckgo.com")) {
        return parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, target)| target.into_owned());
    }
    Some(parsed.to_string())
}

pub struct SiteDiscovery<'a> {
    engine: &'a dyn SearchEngine,
    result_throttle: Duration,
    query_throttle: Duration,
}

impl<'a> SiteDiscovery<'a> {
    pub fn new(engine: &'a dyn SearchEngine) -> Self {
        Self {
            engine,
            result_throttle: Duration::from_millis(1500),
            query_throttle: Duration::from_secs(5),
        }
    }

    pub fn without_delays(engine: &'a dyn SearchEngine) -> Self {
        Self {
            engine,
            result_throttle: Duration::ZERO,
            query_throttle: Duration::ZERO,
        }
    }

    /// Runs every query for `city` and returns sorted `https://<domain>` URLs.
    /// A failing query is logged and skipped.
    pub async fn discover(&self, city: &str) -> Vec<String> {
        info!("🔎 Searching for real-estate agency sites in {}...", city);
        let mut domains = BTreeSet::new();

        for query in build_queries(city) {
            info!("Searching for: '{}'...", query);
            match self.engine.search(&query, RESULTS_PER_QUERY).await {
                Ok(results) => {
                    for url in results {
                        match candidate_domain(&url) {
                            Some(domain) => {
                                debug!("Keeping {}", domain);
                                domains.insert(domain);
                            }
                            None => debug!("Skipping {}", url),
                        }
                        if !self.result_throttle.is_zero() {
                            tokio::time::sleep(self.result_throttle).await;
                        }
                    }
                }
                Err(e) => warn!("Search failed: {}. Continuing...", e),
            }

            if !self.query_throttle.is_zero() {
                tokio::time::sleep(self.query_throttle).await;
            }
        }

        info!("✅ Search finished: {} potential domains.", domains.len());
        domains.into_iter().map(|d| format!("https://{d}")).collect()
    }
}

/// JSON form of the site list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteListDocument {
    pub cidade_analisada: String,
    pub total_sites: usize,
    pub sites: Vec<String>,
}

pub fn write_site_list(path: &Path, sites: &[String]) -> Result<()> {
    let mut body = sites.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    std::fs::write(path, body).map_err(|e| PipelineError::io(path, e))
}

pub fn write_site_list_json(path: &Path, city: &str, sites: &[String]) -> Result<()> {
    let document = SiteListDocument {
        cidade_analisada: city.to_string(),
        total_sites: sites.len(),
        sites: sites.to_vec(),
    };
    let json = serde_json::to_string_pretty(&document).map_err(|e| PipelineError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    std::fs::write(path, json).map_err(|e| PipelineError::io(path, e))
}

/// Reads either list format. When `path` is absent its `.json` sibling (as
/// written by `discover --json`) is used instead; if neither exists the
/// result is `MissingInputFile`.
pub fn read_site_list(path: &Path) -> Result<Vec<String>> {
    let json_sibling = path.with_extension("json");
    let path = if path.exists() {
        path
    } else if json_sibling.exists() {
        info!("Reading site list from '{}'", json_sibling.display());
        json_sibling.as_path()
    } else {
        return Err(PipelineError::MissingInputFile(path.to_path_buf()));
    };
    let raw = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;

    if raw.trim_start().starts_with('{') {
        let document: SiteListDocument = serde_json::from_str(&raw).map_err(|e| PipelineError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        return Ok(document
            .sites
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect());
    }

    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct CannedSearch;

    #[async_trait]
    impl SearchEngine for CannedSearch {
        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<String>> {
            if query.starts_with("corretor") {
                return Err(PipelineError::NetworkFetchError {
                    url: "search".into(),
                    reason: "429".into(),
                });
            }
            Ok(vec![
                "https://www.imobiliariacentral.com.br/imoveis/venda".into(),
                "https://www.imobiliariacentral.com.br/contato-imoveis".into(),
                "https://www.zapimoveis.com.br/venda/sjdr".into(),
                "https://padaria.com.br/".into(),
                "https://alfa-corretor.com/".into(),
            ])
        }
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scout-sites-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn queries_name_the_city_and_exclusions() {
        let queries = build_queries("São João del-Rei");
        assert_eq!(queries.len(), 3);
        assert!(queries.iter().all(|q| q.contains("\"São João del-Rei\"")));
        assert!(queries.iter().all(|q| q.ends_with(EXCLUDED_QUERY_TERMS)));
    }

    #[test]
    fn filters_portals_and_unrelated_sites() {
        assert_eq!(
            candidate_domain("https://www.imobiliariacentral.com.br/").as_deref(),
            Some("www.imobiliariacentral.com.br")
        );
        assert_eq!(candidate_domain("https://www.vivareal.com.br/venda/"), None);
        assert_eq!(candidate_domain("https://sjdr.mg.gov.br/imoveis"), None);
        assert_eq!(candidate_domain("https://padaria.com.br/"), None);
        assert_eq!(candidate_domain("mailto:someone"), None);
    }

    #[test]
    fn unwraps_duckduckgo_redirects() {
        let html = r#"
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.imob.com.br%2Fvenda&rut=abc">Imob</a>
            <a class="result__a" href="https://direct-imoveis.com/">Direct</a>
            <a class="other" href="https://ignored.com/">Ad</a>"#;

        assert_eq!(
            parse_result_links(html),
            vec!["https://www.imob.com.br/venda", "https://direct-imoveis.com/"]
        );
    }

    #[tokio::test]
    async fn discovery_dedupes_sorts_and_survives_failed_queries() {
        let engine = CannedSearch;
        let sites = SiteDiscovery::without_delays(&engine).discover("Tiradentes").await;

        assert_eq!(
            sites,
            vec!["https://alfa-corretor.com", "https://www.imobiliariacentral.com.br"]
        );
    }

    #[test]
    fn reads_both_list_formats() {
        let dir = scratch("formats");
        let sites = vec!["https://a-imoveis.com".to_string(), "https://b-imoveis.com".to_string()];

        let txt = dir.join("sites.txt");
        write_site_list(&txt, &sites).unwrap();
        assert_eq!(read_site_list(&txt).unwrap(), sites);

        let json = dir.join("sites.json");
        write_site_list_json(&json, "Tiradentes", &sites).unwrap();
        let document: SiteListDocument = serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(document.total_sites, 2);
        assert_eq!(read_site_list(&json).unwrap(), sites);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn falls_back_to_the_json_list() {
        let dir = scratch("fallback");
        let sites = vec!["https://c-imoveis.com".to_string()];
        write_site_list_json(&dir.join("sites.json"), "Tiradentes", &sites).unwrap();

        assert_eq!(read_site_list(&dir.join("sites.txt")).unwrap(), sites);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_list_is_a_missing_input() {
        let err = read_site_list(Path::new("/nonexistent/sites.txt")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInputFile(_)));
    }
}
