//! Generic query cache for request deduplication and tag-based invalidation.
//!
//! This module provides a backend-agnostic caching mechanism that:
//! - Keys entries by a hash of the endpoint name and its arguments
//! - Shares one in-flight request between concurrent subscribers
//! - Keeps entries alive while subscribed, evicts them after a retention window
//! - Refetches entries whose tags a mutation invalidates

pub mod layer;
mod tags;
mod traits;

pub use layer::{CacheSettings, EntryInfo, Fetcher, QueryCache};
pub use traits::{EntrySnapshot, EntryStatus, QueryKey, Tag};
