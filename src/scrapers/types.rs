use std::time::Duration;

/// Fixed waits used while driving a site
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    /// After the first navigation
    pub initial_settle: Duration,
    /// After scrolling to the middle of the page
    pub mid_scroll_settle: Duration,
    /// After scrolling to the bottom of the page
    pub bottom_scroll_settle: Duration,
    /// After scrolling the next-page control into view
    pub reveal_settle: Duration,
    /// After clicking the next-page control
    pub click_settle: Duration,
    /// After each description enrichment call
    pub enrichment_throttle: Duration,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            initial_settle: Duration::from_secs(5),
            mid_scroll_settle: Duration::from_secs(2),
            bottom_scroll_settle: Duration::from_secs(3),
            reveal_settle: Duration::from_secs(1),
            click_settle: Duration::from_secs(5),
            enrichment_throttle: Duration::from_millis(1500),
        }
    }
}

impl ExtractionOptions {
    /// No waiting at all
    pub fn without_delays() -> Self {
        Self {
            initial_settle: Duration::ZERO,
            mid_scroll_settle: Duration::ZERO,
            bottom_scroll_settle: Duration::ZERO,
            reveal_settle: Duration::ZERO,
            click_settle: Duration::ZERO,
            enrichment_throttle: Duration::ZERO,
        }
    }
}
