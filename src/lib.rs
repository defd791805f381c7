pub mod config;
pub mod consolidate;
pub mod discovery;
pub mod enrich;
pub mod error;
pub mod inference;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod scrapers;
pub mod store;

pub use config::AppConfig;
pub use error::{PipelineError, Result};
