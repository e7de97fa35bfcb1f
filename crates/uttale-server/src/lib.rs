//! uttale-server
//!
//! Thin HTTP boundary over the index, query, and extraction cores. Routing
//! and request parsing only; all behavior lives in the other crates.

pub mod server;

pub use server::{router, AppState, Server};
