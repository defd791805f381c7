use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a browser driver
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("page load timed out: {0}")]
    Timeout(String),

    #[error("browser error: {0}")]
    Browser(String),
}

/// What happened when we tried to follow the next-page control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Clicked,
    NotFound,
    NotClickable,
    /// The session itself broke (connection lost, browser gone)
    Failed(String),
}

/// One live browser tab, exclusively owned by one site's extraction.
/// Dropping it releases the underlying session.
pub trait PageDriver {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Scrolls to `fraction` of the document height (0.5 = midpoint, 1.0 = bottom).
    fn scroll_to(&mut self, fraction: f64) -> Result<(), DriverError>;

    /// Currently rendered HTML
    fn page_source(&mut self) -> Result<String, DriverError>;

    /// Finds the control matching `selector` and scrolls it into view.
    fn reveal(&mut self, selector: &str) -> ClickOutcome;

    /// Clicks the control matching `selector`.
    fn click(&mut self, selector: &str) -> ClickOutcome;
}

/// Opens a fresh browser session per site.
pub trait BrowserLauncher {
    fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError>;
}

/// Plain HTTP fetch of a page's HTML
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, String>;
}
