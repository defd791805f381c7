use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info, warn};

use super::traits::{BrowserLauncher, ClickOutcome, DriverError, PageDriver};

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// How long the driver keeps a silent connection open
const BROWSER_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Launches one headless Chrome process per site
pub struct ChromeLauncher {
    page_load_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(page_load_timeout: Duration) -> Self {
        Self { page_load_timeout }
    }
}

impl BrowserLauncher for ChromeLauncher {
    fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        info!("  - Launching headless Chrome...");

        let args: Vec<&OsStr> = vec![
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-gpu"),
        ];
        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .args(args)
            .idle_browser_timeout(BROWSER_IDLE_TIMEOUT.max(self.page_load_timeout * 4))
            .build()
            .map_err(|e| DriverError::Browser(format!("failed to build launch options: {e}")))?;

        let browser = Browser::new(options)
            .map_err(|e| DriverError::Browser(format!("failed to launch Chrome: {e}")))?;
        let tab = browser
            .new_tab()
            .map_err(|e| DriverError::Browser(format!("failed to open tab: {e}")))?;

        tab.set_default_timeout(self.page_load_timeout);
        tab.set_user_agent(USER_AGENT, None, None)
            .map_err(|e| DriverError::Browser(format!("failed to set user agent: {e}")))?;

        Ok(Box::new(ChromeSession { browser, tab }))
    }
}

/// Tab plus the browser process that owns it. The process is killed when
/// the session is dropped.
pub struct ChromeSession {
    #[allow(dead_code)]
    browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeSession {
    fn eval(&self, script: &str) -> Result<(), DriverError> {
        self.tab
            .evaluate(script, false)
            .map(|_| ())
            .map_err(|e| DriverError::Browser(e.to_string()))
    }
}

impl PageDriver for ChromeSession {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ())
            .map_err(|e| {
                let message = e.to_string().to_lowercase();
                // the driver's wait timeout reads "the event waited for never came"
                if ["timeout", "timed out", "timed_out", "never came"]
                    .iter()
                    .any(|marker| message.contains(marker))
                {
                    DriverError::Timeout(url.to_string())
                } else {
                    DriverError::Browser(e.to_string())
                }
            })
    }

    fn scroll_to(&mut self, fraction: f64) -> Result<(), DriverError> {
        self.eval(&format!(
            "window.scrollTo(0, document.body.scrollHeight * {fraction});"
        ))
    }

    fn page_source(&mut self) -> Result<String, DriverError> {
        self.tab
            .get_content()
            .map_err(|e| DriverError::Browser(e.to_string()))
    }

    fn reveal(&mut self, selector: &str) -> ClickOutcome {
        match self.tab.find_element(selector) {
            Ok(element) => match element.scroll_into_view() {
                Ok(_) => ClickOutcome::Clicked,
                Err(e) => {
                    debug!("Could not scroll '{}' into view: {}", selector, e);
                    ClickOutcome::NotClickable
                }
            },
            Err(e) => lookup_failure(&e.to_string()),
        }
    }

    fn click(&mut self, selector: &str) -> ClickOutcome {
        match self.tab.find_element(selector) {
            Ok(element) => match element.click() {
                Ok(_) => ClickOutcome::Clicked,
                Err(e) => {
                    debug!("Click on '{}' failed: {}", selector, e);
                    ClickOutcome::NotClickable
                }
            },
            Err(e) => lookup_failure(&e.to_string()),
        }
    }
}

/// A missing element ends pagination; anything else means the session broke.
fn lookup_failure(message: &str) -> ClickOutcome {
    let lowered = message.to_lowercase();
    if ["no element found", "could not find node", "not found"]
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        ClickOutcome::NotFound
    } else {
        ClickOutcome::Failed(message.to_string())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(true) {
            warn!("Failed to close tab cleanly: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_elements_are_not_failures() {
        assert_eq!(lookup_failure("No element found"), ClickOutcome::NotFound);
        assert_eq!(
            lookup_failure("Method call error -32000: Could not find node with given id"),
            ClickOutcome::NotFound
        );
    }

    #[test]
    fn broken_sessions_are_failures() {
        let message = "Unable to make method calls because underlying connection is closed";
        assert_eq!(lookup_failure(message), ClickOutcome::Failed(message.to_string()));
    }
}
