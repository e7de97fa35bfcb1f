//! uttale-index
//!
//! Tantivy-backed cue index: the persistent store with atomic commits, the
//! incremental corpus indexer, and the query engine that resolves ranked
//! hits back to playable time ranges.

pub mod indexer;
pub mod query;
pub mod schema;
pub mod store;

pub use indexer::Indexer;
pub use query::SearchService;
pub use store::IndexStore;
