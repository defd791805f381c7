use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use listing_scout::config::{namespaced, AppConfig, API_KEY_VAR};
use listing_scout::consolidate::run_consolidation;
use listing_scout::discovery::{write_site_list, write_site_list_json, DuckDuckGoSearch, SiteDiscovery};
use listing_scout::enrich::DescriptionParser;
use listing_scout::inference::SelectorInference;
use listing_scout::llm::{GeminiClient, LanguageModel};
use listing_scout::pipeline::{run_analysis, run_extraction};
use listing_scout::report::run_report;
use listing_scout::scrapers::{ChromeLauncher, ExtractionOptions, HttpFetcher};
use listing_scout::PipelineError;

/// Pause between fetching a site and asking the model about it
const ANALYSIS_THROTTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "listing-scout")]
#[command(about = "Finds real-estate agency sites, learns their listing layout and builds a market report")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Search the web for agency sites in a city
    Discover {
        city: String,
        run_id: Option<String>,
        /// Write the list as JSON instead of one URL per line
        #[arg(long)]
        json: bool,
    },
    /// Infer extraction selectors for every new site in the list
    Analyze { run_id: Option<String> },
    /// Scrape listings from every configured site
    Extract {
        /// Overrides SCOUT_MAX_PAGES for this run
        #[arg(long)]
        max_pages: Option<usize>,
    },
    /// Merge per-site batches into one deduplicated table
    Consolidate { run_id: Option<String> },
    /// Render the PDF market report
    Report { city: String, run_id: Option<String> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let app = AppConfig::load().context("Invalid configuration")?;

    match cli.command {
        Commands::Discover { city, run_id, json } => discover(&app, &city, run_id.as_deref(), json).await,
        Commands::Analyze { run_id } => analyze(&app, run_id.as_deref()).await,
        Commands::Extract { max_pages } => extract(app, max_pages).await,
        Commands::Consolidate { run_id } => {
            let output = namespaced(&app.consolidated_file, run_id.as_deref());
            run_consolidation(&app.output_dir, &output).context("Consolidation failed")?;
            Ok(())
        }
        Commands::Report { city, run_id } => {
            let input = namespaced(&app.consolidated_file, run_id.as_deref());
            let output = namespaced(&app.report_file, run_id.as_deref());
            run_report(&input, &output, &city).context("Report generation failed")?;
            Ok(())
        }
    }
}

async fn discover(app: &AppConfig, city: &str, run_id: Option<&str>, json: bool) -> anyhow::Result<()> {
    info!("🏠 Listing Scout - site discovery for {}", city);

    let engine = DuckDuckGoSearch::new(app.http_timeout)?;
    let sites = SiteDiscovery::new(&engine).discover(city).await;

    let mut path = namespaced(&app.sites_file, run_id);
    if json {
        path.set_extension("json");
        write_site_list_json(&path, city, &sites)?;
    } else {
        write_site_list(&path, &sites)?;
    }

    info!("💾 {} sites saved to '{}'", sites.len(), path.display());
    Ok(())
}

fn gemini(app: &AppConfig, api_key: &str) -> anyhow::Result<Arc<dyn LanguageModel>> {
    let client = GeminiClient::new(&app.api_base, &app.model, api_key)?;
    Ok(Arc::new(client))
}

async fn analyze(app: &AppConfig, run_id: Option<&str>) -> anyhow::Result<()> {
    let api_key = app
        .api_key
        .as_deref()
        .ok_or(PipelineError::MissingApiKey(API_KEY_VAR))?;

    let mut app = app.clone();
    app.sites_file = namespaced(&app.sites_file, run_id);

    let fetcher = HttpFetcher::new(app.http_timeout)?;
    let inference = SelectorInference::new(gemini(&app, api_key)?);

    let summary = run_analysis(&app, &fetcher, &inference, ANALYSIS_THROTTLE)
        .await
        .context("Selector analysis failed")?;

    if summary.halted_on_quota {
        warn!(
            "⚠️ Model quota exhausted after {} of {} new sites",
            summary.configured, summary.new_sites
        );
    }
    Ok(())
}

async fn extract(mut app: AppConfig, max_pages: Option<usize>) -> anyhow::Result<()> {
    if let Some(max_pages) = max_pages {
        app.max_pages = max_pages;
    }

    let parser = match app.api_key.as_deref() {
        Some(key) => DescriptionParser::new(gemini(&app, key)?),
        None => {
            warn!("{} not set; descriptions will not be enriched", API_KEY_VAR);
            DescriptionParser::disabled()
        }
    };

    let launcher = ChromeLauncher::new(app.page_load_timeout);
    let summary = run_extraction(&app, &launcher, &parser, ExtractionOptions::default())
        .await
        .context("Extraction failed")?;

    info!(
        "📦 {} records from {} of {} sites ({} errors)",
        summary.records, summary.sites_with_data, summary.sites, summary.errors
    );
    Ok(())
}
