use std::collections::HashSet;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::discovery::read_site_list;
use crate::error::{PipelineError, Result};
use crate::inference::SelectorInference;
use crate::models::{domain_of, ErrorLog, SiteConfiguration};
use crate::scrapers::PageFetcher;
use crate::store::ConfigStore;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub new_sites: usize,
    pub configured: usize,
    pub errors: usize,
    pub halted_on_quota: bool,
    pub total_in_store: usize,
}

/// Sites whose domain is not yet configured, one per domain, in list order.
pub fn pending_sites(sites: &[String], store: &ConfigStore) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    sites
        .iter()
        .filter_map(|url| domain_of(url).map(|domain| (domain, url.clone())))
        .filter(|(domain, _)| !store.contains(domain) && seen.insert(domain.clone()))
        .collect()
}

/// Infers configurations for every new site in `sites`, adding them to
/// `store`. Stops early when the model quota runs out.
pub async fn analyze_sites(
    sites: &[String],
    store: &mut ConfigStore,
    fetcher: &dyn PageFetcher,
    inference: &SelectorInference,
    errors: &mut ErrorLog,
    throttle: Duration,
) -> AnalysisSummary {
    for url in sites.iter().filter(|url| domain_of(url).is_none()) {
        warn!("Skipping malformed site URL '{}'", url);
        errors.record(url.as_str(), "invalid URL");
    }

    let pending = pending_sites(sites, store);
    let mut summary = AnalysisSummary {
        new_sites: pending.len(),
        ..AnalysisSummary::default()
    };

    if pending.is_empty() {
        info!("✅ No new sites to process.");
        summary.total_in_store = store.len();
        summary.errors = errors.len();
        return summary;
    }

    info!("🤖 Starting model analysis for {} new sites...", pending.len());

    for (domain, url) in pending {
        info!("Processing: {}", url);

        let html = match fetcher.fetch(&url).await {
            Ok(html) => html,
            Err(reason) => {
                let err = PipelineError::NetworkFetchError { url: url.clone(), reason };
                warn!("  ❌ {}", err);
                errors.record(url.as_str(), err);
                continue;
            }
        };

        if !throttle.is_zero() {
            tokio::time::sleep(throttle).await;
        }

        match inference.infer(&html).await {
            Ok(selectors) => {
                let config = SiteConfiguration::new(domain, url.clone(), selectors);
                match store.insert(config) {
                    Ok(_) => {
                        info!("  ✅ Configuration generated and validated!");
                        summary.configured += 1;
                    }
                    Err(e) => errors.record(url.as_str(), e),
                }
            }
            Err(e) if e.is_fatal() => {
                errors.record(url.as_str(), &e);
                warn!("  🛑 {}. Stopping; run again later to continue.", e);
                summary.halted_on_quota = true;
                break;
            }
            Err(e) => {
                warn!("  ⚠️ {}", e);
                errors.record(url.as_str(), e);
            }
        }
    }

    summary.total_in_store = store.len();
    summary.errors = errors.len();
    summary
}

/// The `analyze` stage: site list in, configuration store out.
pub async fn run_analysis(
    app: &AppConfig,
    fetcher: &dyn PageFetcher,
    inference: &SelectorInference,
    throttle: Duration,
) -> Result<AnalysisSummary> {
    let sites = read_site_list(&app.sites_file)?;

    let mut store = ConfigStore::load(&app.config_file);
    info!("Loaded {} existing configurations.", store.len());

    let mut errors = ErrorLog::new();
    let summary = analyze_sites(&sites, &mut store, fetcher, inference, &mut errors, throttle).await;

    if summary.new_sites > 0 {
        store.save(&app.config_file)?;
        info!(
            "🎉 Done! {} configurations saved to '{}'",
            store.len(),
            app.config_file.display()
        );
    }

    if errors.write_report(&app.analyst_errors_file, "Relatório de Erros - Analista de Seletores")? {
        info!(
            "📝 A report with {} errors was saved to '{}'",
            errors.len(),
            app.analyst_errors_file.display()
        );
    }

    Ok(summary)
}
