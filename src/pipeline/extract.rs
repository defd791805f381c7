use tracing::{info, warn};

use super::batch::{batch_path, write_csv};
use crate::config::AppConfig;
use crate::enrich::DescriptionParser;
use crate::error::{PipelineError, Result};
use crate::models::ErrorLog;
use crate::scrapers::{BrowserLauncher, ExtractionEngine, ExtractionOptions, FinishReason};
use crate::store::ConfigStore;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub sites: usize,
    pub sites_with_data: usize,
    pub records: usize,
    pub errors: usize,
}

/// The `extract` stage: every configured site, one browser session each,
/// one CSV batch per site that produced records.
pub async fn run_extraction(
    app: &AppConfig,
    launcher: &dyn BrowserLauncher,
    parser: &DescriptionParser,
    options: ExtractionOptions,
) -> Result<ExtractionSummary> {
    if !app.config_file.exists() {
        return Err(PipelineError::MissingInputFile(app.config_file.clone()));
    }
    let store = ConfigStore::load(&app.config_file);
    std::fs::create_dir_all(&app.output_dir).map_err(|e| PipelineError::io(&app.output_dir, e))?;

    info!("🤖 Starting extraction for {} configured sites...", store.len());

    let engine = ExtractionEngine::new(launcher, parser, options);
    let mut errors = ErrorLog::new();
    let mut summary = ExtractionSummary {
        sites: store.len(),
        ..ExtractionSummary::default()
    };

    for config in store.iter() {
        info!("Extracting data from: {}", config.domain);
        let result = engine.extract(config, app.max_pages).await;

        match &result.finish {
            Ok(FinishReason::PaginationNotConfigured) => {
                errors.record(config.domain.as_str(), "Lembrete: Paginação não configurada.");
            }
            Ok(reason) => info!("    - Finished after {} page(s): {:?}", result.pages_read, reason),
            Err(e) => {
                warn!("    ❌ {}", e);
                errors.record(config.domain.as_str(), e);
            }
        }

        if result.records.is_empty() {
            continue;
        }

        let path = batch_path(&app.output_dir, &config.domain);
        match write_csv(&path, &result.records) {
            Ok(()) => {
                info!("    ✅ {} records saved to '{}'", result.records.len(), path.display());
                summary.sites_with_data += 1;
                summary.records += result.records.len();
            }
            Err(e) => {
                warn!("    ❌ {}", e);
                errors.record(config.domain.as_str(), e);
            }
        }
    }

    if errors.write_report(&app.extractor_errors_file, "Relatório de Erros - Extrator Mestre")? {
        info!(
            "📝 A report with {} entries was saved to '{}'",
            errors.len(),
            app.extractor_errors_file.display()
        );
    }

    summary.errors = errors.len();
    info!("🎉 Extraction finished!");
    Ok(summary)
}
