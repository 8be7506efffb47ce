//! Core traits and types for the query cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::ErrorInfo;

/// Key of a cacheable query.
///
/// Implementors describe one endpoint call: which endpoint, with which
/// arguments, and which tags its result provides.
pub trait QueryKey {
  /// Stable, fixed-length hash of the endpoint name and its arguments.
  fn cache_hash(&self) -> String;

  /// Human-readable form used in logs.
  fn description(&self) -> String;

  /// Tags the result of this query provides.
  fn provides(&self) -> Vec<Tag>;
}

/// Identifier half of a tag: a concrete record id, or the whole collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TagId {
  List,
  Id(String),
}

/// Opaque invalidation handle, e.g. `Products:LIST` or `Products:p1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
  pub kind: String,
  pub id: TagId,
}

impl Tag {
  pub fn list(kind: &str) -> Self {
    Self {
      kind: kind.to_string(),
      id: TagId::List,
    }
  }

  pub fn id(kind: &str, id: impl Into<String>) -> Self {
    Self {
      kind: kind.to_string(),
      id: TagId::Id(id.into()),
    }
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.id {
      TagId::List => write!(f, "{}:LIST", self.kind),
      TagId::Id(id) => write!(f, "{}:{}", self.kind, id),
    }
  }
}

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
  Pending,
  Fulfilled,
  Rejected,
}

/// Point-in-time view of an entry, broadcast to its subscribers.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
  pub status: EntryStatus,
  /// Last good value. Kept while a refetch is pending.
  pub value: Option<Value>,
  pub error: Option<ErrorInfo>,
  /// When the last fetch completed
  pub fetched_at: Option<DateTime<Utc>>,
  /// Invalidated or past its stale time, refetch required
  pub stale: bool,
}

impl EntrySnapshot {
  pub(crate) fn pending() -> Self {
    Self {
      status: EntryStatus::Pending,
      value: None,
      error: None,
      fetched_at: None,
      stale: false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_tag_display() {
    assert_eq!(Tag::list("Products").to_string(), "Products:LIST");
    assert_eq!(Tag::id("Products", "p1").to_string(), "Products:p1");
    assert_ne!(Tag::list("Products"), Tag::id("Products", "LIST"));
  }
}
