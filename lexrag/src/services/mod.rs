//! Request-scoped orchestration services built from the core components.

pub mod analyze;
pub mod indexer;

pub use analyze::{AnalyzeMetadata, AnalyzeRequest, AnalyzeResponse, AnalyzeService};
pub use indexer::{IndexOutcome, IndexRequest, IndexerService, numeric_point_id};
