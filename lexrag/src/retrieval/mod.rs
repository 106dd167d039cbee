//! Retrieval: vector search with hierarchical context enrichment and a
//! TTL-bound query-result cache.

pub mod cache;
pub mod retriever;

pub use cache::{QueryCache, query_cache_key};
pub use retriever::Retriever;
