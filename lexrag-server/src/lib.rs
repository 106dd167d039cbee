//! HTTP surface for the lexrag back-end.
//!
//! The routes are a thin layer: every request validates its inputs, calls
//! one core service, and maps the outcome (or error kind) to the wire
//! shape. Authentication, quotas, and rate limiting front this service in
//! deployment and are not part of the crate.

pub mod error;
pub mod llm;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, Backends};
