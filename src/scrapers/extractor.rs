//! Paginated extraction: drives one browser session through a site's
//! listing pages using the selectors stored for it.

use std::time::Duration;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use super::traits::{BrowserLauncher, ClickOutcome, DriverError, PageDriver};
use super::types::ExtractionOptions;
use crate::enrich::{DescriptionParser, ListingDetails};
use crate::error::PipelineError;
use crate::models::{ListingRecord, SelectorSet, SiteConfiguration, NOT_INFORMED};

/// Why a site's extraction stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The container selector matched nothing on the current page
    NoListings,
    /// `max_pages` pages were read
    PageLimit,
    /// The configuration has no next-page selector
    PaginationNotConfigured,
    /// The next-page control was missing or could not be clicked
    EndOfPagination,
}

/// Where the extraction loop is
#[derive(Debug)]
pub enum ExtractionState {
    Loading,
    Scraping { page: usize },
    Paginating { page: usize },
    Done(FinishReason),
    Aborted(PipelineError),
}

/// Outcome of one site's extraction. Records gathered before an abort are kept.
#[derive(Debug)]
pub struct SiteExtraction {
    pub domain: String,
    pub records: Vec<ListingRecord>,
    pub pages_read: usize,
    pub finish: Result<FinishReason, PipelineError>,
}

impl SiteExtraction {
    fn aborted(domain: &str, error: PipelineError) -> Self {
        Self {
            domain: domain.to_string(),
            records: Vec::new(),
            pages_read: 0,
            finish: Err(error),
        }
    }
}

/// Selectors compiled once per site. Empty field selectors stay `None`.
struct CompiledSelectors {
    container: Selector,
    price: Option<Selector>,
    address: Option<Selector>,
    description: Option<Selector>,
}

impl CompiledSelectors {
    fn compile(set: &SelectorSet) -> Result<Self, PipelineError> {
        let container = compile(&set.container)?.ok_or_else(|| PipelineError::InvalidSelectorSyntax {
            selector: set.container.clone(),
        })?;

        // only checked here; the driver resolves it against the live page
        if let Some(next_page) = &set.next_page {
            compile(next_page)?;
        }

        Ok(Self {
            container,
            price: compile(&set.price)?,
            address: compile(&set.address)?,
            description: compile(&set.description)?,
        })
    }
}

fn compile(raw: &str) -> Result<Option<Selector>, PipelineError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    Selector::parse(raw)
        .map(Some)
        .map_err(|_| PipelineError::InvalidSelectorSyntax {
            selector: raw.to_string(),
        })
}

/// Text pulled from one container before enrichment
#[derive(Debug)]
struct RawListing {
    price: Option<String>,
    address: Option<String>,
    description: Option<String>,
}

pub struct ExtractionEngine<'a> {
    launcher: &'a dyn BrowserLauncher,
    parser: &'a DescriptionParser,
    options: ExtractionOptions,
}

impl<'a> ExtractionEngine<'a> {
    pub fn new(launcher: &'a dyn BrowserLauncher, parser: &'a DescriptionParser, options: ExtractionOptions) -> Self {
        Self {
            launcher,
            parser,
            options,
        }
    }

    /// Scrapes up to `max_pages` pages of `config.source_url` in a fresh
    /// browser session. The session is closed before this returns.
    pub async fn extract(&self, config: &SiteConfiguration, max_pages: usize) -> SiteExtraction {
        let domain = config.domain.as_str();

        let selectors = match CompiledSelectors::compile(&config.selectors) {
            Ok(selectors) => selectors,
            Err(e) => return SiteExtraction::aborted(domain, e),
        };
        if max_pages == 0 {
            return SiteExtraction {
                domain: domain.to_string(),
                records: Vec::new(),
                pages_read: 0,
                finish: Ok(FinishReason::PageLimit),
            };
        }

        info!("  - Starting browser for {}...", config.source_url);
        let mut session = match self.launcher.launch() {
            Ok(session) => session,
            Err(e) => return SiteExtraction::aborted(domain, PipelineError::ExtractionFailed(e.to_string())),
        };

        let mut listings = Vec::new();
        let mut pages_read = 0;
        let mut state = ExtractionState::Loading;

        let finish = loop {
            debug!("{}: {:?}", domain, state);
            state = match state {
                ExtractionState::Loading => match self.load(session.as_mut(), &config.source_url).await {
                    Ok(()) => ExtractionState::Scraping { page: 1 },
                    Err(e) => ExtractionState::Aborted(e),
                },
                ExtractionState::Scraping { page } => {
                    info!("    - Reading page {}...", page);
                    match self.scrape_page(session.as_mut(), &selectors, config, &mut listings).await {
                        Ok(0) => {
                            info!("    - No listings matched the container selector.");
                            ExtractionState::Done(FinishReason::NoListings)
                        }
                        Ok(_) => {
                            pages_read = page;
                            ExtractionState::Paginating { page }
                        }
                        Err(e) => ExtractionState::Aborted(e),
                    }
                }
                ExtractionState::Paginating { page } => {
                    self.paginate(session.as_mut(), config, page, max_pages).await
                }
                ExtractionState::Done(reason) => break Ok(reason),
                ExtractionState::Aborted(e) => break Err(e),
            };
        };

        // model calls can outlast the browser's idle timeout, so the
        // session goes before enrichment starts
        drop(session);
        let records = self.enrich(&listings, domain).await;

        SiteExtraction {
            domain: domain.to_string(),
            records,
            pages_read,
            finish,
        }
    }

    async fn load(&self, session: &mut dyn PageDriver, url: &str) -> Result<(), PipelineError> {
        session.navigate(url).map_err(|e| driver_failure(e, url))?;
        settle(self.options.initial_settle).await;
        Ok(())
    }

    /// Reads the current page and appends its listings. Returns how many
    /// containers matched.
    async fn scrape_page(
        &self,
        session: &mut dyn PageDriver,
        selectors: &CompiledSelectors,
        config: &SiteConfiguration,
        listings: &mut Vec<RawListing>,
    ) -> Result<usize, PipelineError> {
        // lazy-loaded listings only show up after scrolling
        for (fraction, wait) in [
            (0.5, self.options.mid_scroll_settle),
            (1.0, self.options.bottom_scroll_settle),
        ] {
            if let Err(e) = session.scroll_to(fraction) {
                warn!("    - Scroll failed: {}", e);
            }
            settle(wait).await;
        }

        let html = session
            .page_source()
            .map_err(|e| driver_failure(e, &config.source_url))?;
        let found = read_listings(&html, selectors);
        let count = found.len();
        listings.extend(found);
        Ok(count)
    }

    async fn enrich(&self, listings: &[RawListing], domain: &str) -> Vec<ListingRecord> {
        let mut records = Vec::with_capacity(listings.len());
        for listing in listings {
            let description = listing.description.as_deref().unwrap_or_default();
            let called_model = self.parser.would_call_model(description);
            let details = self.parser.parse(description).await;
            if called_model {
                settle(self.options.enrichment_throttle).await;
            }
            records.push(build_record(listing, &details, domain));
        }
        records
    }

    async fn paginate(
        &self,
        session: &mut dyn PageDriver,
        config: &SiteConfiguration,
        page: usize,
        max_pages: usize,
    ) -> ExtractionState {
        let Some(next) = config.next_page_selector() else {
            return ExtractionState::Done(FinishReason::PaginationNotConfigured);
        };
        if page >= max_pages {
            return ExtractionState::Done(FinishReason::PageLimit);
        }

        match session.reveal(next) {
            ClickOutcome::Clicked => {}
            ClickOutcome::Failed(message) => return ExtractionState::Aborted(PipelineError::ExtractionFailed(message)),
            outcome => {
                info!("    - End of pagination ({:?}).", outcome);
                return ExtractionState::Done(FinishReason::EndOfPagination);
            }
        }
        settle(self.options.reveal_settle).await;

        match session.click(next) {
            ClickOutcome::Clicked => {
                settle(self.options.click_settle).await;
                ExtractionState::Scraping { page: page + 1 }
            }
            ClickOutcome::Failed(message) => ExtractionState::Aborted(PipelineError::ExtractionFailed(message)),
            outcome => {
                info!("    - End of pagination ({:?}).", outcome);
                ExtractionState::Done(FinishReason::EndOfPagination)
            }
        }
    }
}

fn read_listings(html: &str, selectors: &CompiledSelectors) -> Vec<RawListing> {
    let document = Html::parse_document(html);
    document
        .select(&selectors.container)
        .map(|container| RawListing {
            price: first_text(container, selectors.price.as_ref()),
            address: first_text(container, selectors.address.as_ref()),
            description: first_text(container, selectors.description.as_ref()),
        })
        .collect()
}

/// Whitespace-normalized text of the first match inside `container`
fn first_text(container: ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
    let element = container.select(selector?).next()?;
    let text = element.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn build_record(listing: &RawListing, details: &ListingDetails, domain: &str) -> ListingRecord {
    let or_ni = |value: Option<&String>| value.cloned().unwrap_or_else(|| NOT_INFORMED.to_string());
    let count = |value: Option<u32>| value.map_or_else(|| NOT_INFORMED.to_string(), |n| n.to_string());

    ListingRecord {
        code: or_ni(details.code.as_ref()),
        property_type: or_ni(details.property_type.as_ref()),
        address: or_ni(listing.address.as_ref()),
        price: or_ni(listing.price.as_ref()),
        area: or_ni(details.area.as_ref()),
        bedroom_count: count(details.bedrooms),
        living_room_count: count(details.living_rooms),
        bathroom_count: count(details.bathrooms),
        parking_spots: count(details.parking),
        site_domain: domain.to_string(),
    }
}

fn driver_failure(error: DriverError, url: &str) -> PipelineError {
    match error {
        DriverError::Timeout(_) => PipelineError::NavigationTimeout { url: url.to_string() },
        DriverError::Browser(message) => PipelineError::ExtractionFailed(message),
    }
}

async fn settle(wait: Duration) {
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }
}
