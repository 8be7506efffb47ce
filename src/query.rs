//! Subscriptions to cached queries.
//!
//! A `Subscription<T>` is the consumer side of a cache entry: it holds the
//! entry alive (counted as a subscriber), exposes loading/success/error
//! state, and wakes up whenever the entry is refetched or invalidated.
//!
//! # Example
//!
//! ```ignore
//! let mut products = api.products(args);
//!
//! // In event loop tick
//! if products.poll() {
//!     // State changed, re-render
//! }
//!
//! match products.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) | QueryState::Refreshing(data) => render_data(data),
//!     QueryState::Error(e) => render_error(e),
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tokio::sync::watch;

use crate::cache::layer::{Completion, SubscriberGuard};
use crate::cache::{EntrySnapshot, EntryStatus};
use crate::error::ErrorInfo;

/// The state of a query as seen by one subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// First fetch in progress, nothing to show yet
  Loading,
  /// Query completed successfully
  Success(T),
  /// Previous data, with a refetch in progress
  Refreshing(T),
  /// Query failed with an error
  Error(ErrorInfo),
}

impl<T> QueryState<T> {
  /// True while a fetch is outstanding, with or without data.
  pub fn is_fetching(&self) -> bool {
    matches!(self, QueryState::Loading | QueryState::Refreshing(_))
  }

  pub fn error(&self) -> Option<&ErrorInfo> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

#[cfg(test)]
impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) | QueryState::Refreshing(data) => Some(data),
      _ => None,
    }
  }
}

fn decode<T: DeserializeOwned>(snapshot: &EntrySnapshot) -> QueryState<T> {
  let value = snapshot.value.as_ref().map(|v| serde_json::from_value::<T>(v.clone()));

  match (snapshot.status, value) {
    (EntryStatus::Rejected, _) => QueryState::Error(
      snapshot
        .error
        .clone()
        .unwrap_or_else(|| ErrorInfo::new(None, crate::error::GENERIC_FAILURE)),
    ),
    (_, Some(Err(e))) => QueryState::Error(ErrorInfo::new(
      None,
      format!("Failed to decode response: {}", e),
    )),
    (EntryStatus::Pending, Some(Ok(data))) => QueryState::Refreshing(data),
    (EntryStatus::Pending, None) => QueryState::Loading,
    (EntryStatus::Fulfilled, Some(Ok(data))) => QueryState::Success(data),
    (EntryStatus::Fulfilled, None) => {
      QueryState::Error(ErrorInfo::new(None, "Response had no body"))
    }
  }
}

/// Live view of a cache entry.
///
/// Dropping the subscription releases the entry; the cache keeps it around
/// for its retention window in case someone subscribes again.
pub struct Subscription<T> {
  guard: SubscriberGuard,
  rx: watch::Receiver<EntrySnapshot>,
  state: QueryState<T>,
  fetched_at: Option<DateTime<Utc>>,
  stale: bool,
  closed: bool,
  _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Subscription<T> {
  pub(crate) fn new(guard: SubscriberGuard, rx: watch::Receiver<EntrySnapshot>) -> Self {
    let mut subscription = Self {
      guard,
      rx,
      state: QueryState::Loading,
      fetched_at: None,
      stale: false,
      closed: false,
      _marker: PhantomData,
    };
    subscription.apply();
    subscription
  }

  fn apply(&mut self) {
    let snapshot = self.rx.borrow_and_update();
    self.state = decode(&snapshot);
    self.fetched_at = snapshot.fetched_at;
    self.stale = snapshot.stale;
  }

  /// Get the current state of the query.
  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  /// When the data on display was fetched
  pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
    self.fetched_at
  }

  /// The data on display was invalidated and a refetch is due or running.
  pub fn is_stale(&self) -> bool {
    self.stale
  }

  /// Description of the underlying query, for logs and headers.
  pub fn describe(&self) -> &str {
    self.guard.description()
  }

  /// Pick up any update published since the last look.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    match self.rx.has_changed() {
      Ok(true) => {
        self.apply();
        true
      }
      Ok(false) => false,
      Err(_) => self.mark_closed(),
    }
  }

  /// Wait for the next update. Returns `false` once the entry is gone.
  pub async fn changed(&mut self) -> bool {
    if self.closed {
      return false;
    }
    match self.rx.changed().await {
      Ok(()) => {
        self.apply();
        true
      }
      Err(_) => {
        self.mark_closed();
        false
      }
    }
  }

  /// Wait until no fetch is outstanding.
  pub async fn settled(&mut self) -> &QueryState<T> {
    self.poll();
    while self.state.is_fetching() {
      if !self.changed().await {
        break;
      }
    }
    &self.state
  }

  /// Force a refetch, superseding any fetch already in flight.
  pub fn refetch(&self) -> Option<Completion> {
    self.guard.refetch()
  }

  // The entry was dropped by a cache reset (logout); nothing it held is trustworthy.
  fn mark_closed(&mut self) -> bool {
    if self.closed {
      return false;
    }
    self.closed = true;
    self.state = QueryState::Error(ErrorInfo::new(None, "Query was cancelled"));
    self.stale = false;
    true
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Subscription<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("query", &self.guard.description())
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn snapshot(status: EntryStatus, value: Option<serde_json::Value>) -> EntrySnapshot {
    EntrySnapshot {
      status,
      value,
      error: None,
      fetched_at: Some(Utc::now()),
      stale: false,
    }
  }

  #[test]
  fn test_decode_states() {
    let state: QueryState<Vec<i32>> = decode(&snapshot(EntryStatus::Pending, None));
    assert!(state.is_loading());

    let state: QueryState<Vec<i32>> =
      decode(&snapshot(EntryStatus::Pending, Some(json!([1, 2]))));
    assert_eq!(state, QueryState::Refreshing(vec![1, 2]));
    assert!(state.is_fetching());

    let state: QueryState<Vec<i32>> =
      decode(&snapshot(EntryStatus::Fulfilled, Some(json!([1, 2, 3]))));
    assert_eq!(state.data(), Some(&vec![1, 2, 3]));
  }

  #[test]
  fn test_decode_rejected_and_mismatched() {
    let mut rejected = snapshot(EntryStatus::Rejected, None);
    rejected.error = Some(ErrorInfo::new(Some(404), "Product not found"));
    let state: QueryState<i32> = decode(&rejected);
    assert!(state.error().is_some_and(|e| e.is_not_found()));

    let state: QueryState<i32> = decode(&snapshot(EntryStatus::Fulfilled, Some(json!("nope"))));
    assert!(state.is_error());
  }
}
