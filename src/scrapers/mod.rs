pub mod browser;
pub mod extractor;
pub mod fetch;
pub mod traits;
pub mod types;

pub use browser::ChromeLauncher;
pub use extractor::{ExtractionEngine, ExtractionState, FinishReason, SiteExtraction};
pub use fetch::HttpFetcher;
pub use traits::{BrowserLauncher, ClickOutcome, DriverError, PageDriver, PageFetcher};
pub use types::ExtractionOptions;
