//! ```text
//! Upload ──► IndexerService ──► Parser ──► Chunker ──► Embedder ──► VectorStore
//!
//! Query ──► [QueryCache hit?] ──yes──► cached results
//!                │no
//!                ▼
//!           Embedder ──► VectorStore::match ──► VectorStore::batch_context
//!                │                                     │
//!                └───────── RetrievalResults ──────────┘
//!                                  │
//!                    PiiAnonymizer(query), PiiAnonymizer(context)
//!                                  │
//!                            LlmClient::analyze
//!                                  │
//!                    PiiAnonymizer::deanonymize(answer)
//!                                  │
//!            Verifier (sentence split + semantic match + scoring)
//!                                  │
//!                       FingerprintTracker::record
//!                                  │
//!                            AnalyzeResponse
//! ```
//!
//! Core library of the legal-document RAG back-end: hierarchical parsing
//! and chunking, retrieval with context enrichment and a query cache, the
//! PII anonymization pipeline, the sentence-level verifier, and the two
//! services that orchestrate them. External systems (embedding model,
//! vector database, KV store, generative model, OCR, PII recognition) stay
//! behind the traits in [`ports`]; in-memory reference backends live in
//! [`stores`].

pub mod clients;
pub mod config;
pub mod embed;
pub mod errors;
pub mod parser;
pub mod pii;
pub mod ports;
pub mod retrieval;
pub mod services;
pub mod stores;
pub mod types;
pub mod verify;

pub use config::Settings;
pub use errors::LexError;
pub use types::{Chunk, ChunkType, Document, DocumentStatus, RetrievalResult, Section};
