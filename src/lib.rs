//! Bearer token gate.
//!
//! Answers each TCP connection with one of four fixed HTTP responses: a
//! known bearer token gets `200`, an unknown one `403`, and a request without
//! a token gets `401`, or `429` once its client IP exceeds a sliding
//! per-minute request budget kept in a shared counter store.

pub mod classifier;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod server;
pub mod state;
pub mod store;
pub mod tokens;

pub use classifier::{Classifier, extract_token};
pub use error::{GateError, StoreError};
pub use models::Outcome;
pub use rate_limit::RateLimiter;
pub use server::{GateServer, ServerOptions};
pub use state::AppState;
pub use store::{CounterStore, MemcachedStore, MemoryStore, Store};
pub use tokens::TokenAuthority;
