//! Stage drivers that own the per-run state (store, error log, batches).

pub mod analyze;
pub mod batch;
pub mod extract;

pub use analyze::{analyze_sites, run_analysis, AnalysisSummary};
pub use extract::{run_extraction, ExtractionSummary};
