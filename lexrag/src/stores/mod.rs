//! In-process reference backends for the collaborator ports.
//!
//! These power local development, the default server wiring, and the test
//! suites. Production deployments substitute real backends (a managed
//! vector database, Redis) behind the same traits.

pub mod memory;

pub use memory::{MemoryDocumentStore, MemoryKvStore, MemoryQueryLog, MemoryVectorStore};
