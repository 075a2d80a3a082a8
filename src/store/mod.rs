//! Named cache stores for request/response pairs and the offline order queue.
//!
//! This module provides the persistence layer the router operates on:
//! - versioned, named stores mapping request identity to stored responses
//! - an any-store match, the lookup the offline fallbacks use
//! - a durable queue of orders captured while offline

mod backend;
mod types;

pub use backend::{OrderQueue, SqliteBackend, StoreBackend};
pub use types::{
  PendingOrder, RequestKey, RequestMode, Served, ServeSource, StoredEntry, StoredRequest,
  StoredResponse,
};
