use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong between discovering a site and rendering the report.
///
/// Most variants are per-site and only get recorded in the stage's error log.
/// [`PipelineError::is_fatal`] tells the driver loops which ones stop the batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("model returned a response that is not valid JSON: {raw}")]
    InvalidModelResponse { raw: String },

    #[error("model API quota exceeded")]
    QuotaExceeded,

    #[error("model API error: {0}")]
    ProviderError(String),

    #[error("model did not return a usable configuration. Response: {raw}")]
    InvalidConfiguration { raw: String },

    #[error("timeout while loading page {url}")]
    NavigationTimeout { url: String },

    #[error("invalid selector syntax '{selector}'")]
    InvalidSelectorSyntax { selector: String },

    #[error("unexpected failure while browsing: {0}")]
    ExtractionFailed(String),

    #[error("failed to fetch {url}: {reason}")]
    NetworkFetchError { url: String, reason: String },

    #[error("required input file not found: {}", .0.display())]
    MissingInputFile(PathBuf),

    #[error("no valid data: {0}")]
    NoValidData(String),

    #[error("environment variable {0} is not set")]
    MissingApiKey(&'static str),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error on {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("PDF rendering failed: {0}")]
    Pdf(String),
}

impl PipelineError {
    /// Quota exhaustion stops all further new-site processing.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::QuotaExceeded)
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_quota_exhaustion_is_fatal() {
        assert!(PipelineError::QuotaExceeded.is_fatal());
        assert!(!PipelineError::ProviderError("boom".into()).is_fatal());
        assert!(!PipelineError::NavigationTimeout {
            url: "https://a.com".into()
        }
        .is_fatal());
    }

    #[test]
    fn messages_carry_the_site_context() {
        let err = PipelineError::InvalidSelectorSyntax {
            selector: "div[".into(),
        };
        assert_eq!(err.to_string(), "invalid selector syntax 'div['");
    }
}
