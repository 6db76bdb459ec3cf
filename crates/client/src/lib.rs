//! RIT REST API client.
//!
//! [`RitClient`] implements the core crate's case, price, news and history
//! source traits over HTTP with basic auth, per-request timeouts and a
//! client-side rate limit.

pub mod client;
pub mod types;

pub use client::RitClient;
pub use types::Security;
