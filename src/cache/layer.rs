//! Query cache that deduplicates fetches, tracks subscribers and applies tag invalidation.

use chrono::Utc;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::tags::TagIndex;
use super::traits::{EntrySnapshot, EntryStatus, QueryKey, Tag};
use crate::error::ErrorInfo;
use crate::query::Subscription;

pub type FetchResult = Result<Value, ErrorInfo>;
pub type FetchFuture = BoxFuture<'static, FetchResult>;

/// Produces a fresh request future each time the entry needs fetching.
pub type Fetcher = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

/// Resolves once a fetch has finished and its result is stored in the cache.
pub type Completion = Shared<FetchFuture>;

/// Timing knobs for the cache.
#[derive(Debug, Clone)]
pub struct CacheSettings {
  /// How long an entry with no subscribers is retained
  pub keep_unused_for: Duration,
  /// Age after which a fulfilled entry is refetched on subscribe. `None` = never by age.
  pub stale_after: Option<Duration>,
}

impl Default for CacheSettings {
  fn default() -> Self {
    Self {
      keep_unused_for: Duration::from_secs(300),
      stale_after: Some(Duration::from_secs(60)),
    }
  }
}

/// Diagnostic view of one entry.
#[derive(Debug, Clone)]
pub struct EntryInfo {
  pub description: String,
  pub status: EntryStatus,
  pub subscribers: usize,
  pub stale: bool,
  pub tags: Vec<Tag>,
}

struct Entry {
  /// Distinguishes this entry from a later one under the same key
  id: u64,
  description: String,
  tags: HashSet<Tag>,
  fetcher: Fetcher,
  subscribers: usize,
  status: EntryStatus,
  value: Option<Value>,
  error: Option<ErrorInfo>,
  fetched_at: Option<Instant>,
  fetched_at_utc: Option<chrono::DateTime<Utc>>,
  stale: bool,
  /// Invalidated while a fetch was in flight with no one watching
  stale_on_arrival: bool,
  in_flight: Option<Completion>,
  fetch_seq: u64,
  eviction: Option<JoinHandle<()>>,
  notify: watch::Sender<EntrySnapshot>,
}

impl Entry {
  fn snapshot(&self) -> EntrySnapshot {
    EntrySnapshot {
      status: self.status,
      value: self.value.clone(),
      error: self.error.clone(),
      fetched_at: self.fetched_at_utc,
      stale: self.stale,
    }
  }

  fn publish(&self) {
    self.notify.send_replace(self.snapshot());
  }

  fn cancel_eviction(&mut self) {
    if let Some(handle) = self.eviction.take() {
      handle.abort();
    }
  }
}

#[derive(Default)]
struct Inner {
  entries: HashMap<String, Entry>,
  tags: TagIndex,
  next_seq: u64,
}

impl Inner {
  fn next_seq(&mut self) -> u64 {
    self.next_seq += 1;
    self.next_seq
  }

  fn remove(&mut self, key: &str) {
    if let Some(mut entry) = self.entries.remove(key) {
      entry.cancel_eviction();
      debug!(key = %entry.description, "evicted cache entry");
    }
    self.tags.remove_key(key);
  }
}

/// Process-wide query cache.
///
/// Cloning is cheap; all clones share the same entries.
#[derive(Clone)]
pub struct QueryCache {
  inner: Arc<Mutex<Inner>>,
  settings: CacheSettings,
}

impl QueryCache {
  pub fn new(settings: CacheSettings) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Inner::default())),
      settings,
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn is_stale(&self, entry: &Entry) -> bool {
    if entry.stale {
      return true;
    }
    match (self.settings.stale_after, entry.fetched_at) {
      (Some(max_age), Some(fetched_at)) => fetched_at.elapsed() >= max_age,
      (Some(_), None) => true,
      (None, _) => false,
    }
  }

  /// Subscribe to a query.
  ///
  /// 1. Fresh fulfilled entry - served from cache, no fetch
  /// 2. Fetch already in flight - joined, no second request
  /// 3. Missing, stale or rejected - fetch started; stale data stays visible meanwhile
  pub fn query<K, T>(&self, key: &K, tags: Vec<Tag>, fetcher: Fetcher) -> Subscription<T>
  where
    K: QueryKey,
    T: DeserializeOwned,
  {
    let hash = key.cache_hash();
    let description = key.description();
    let mut inner = self.lock();

    let entry_seq = inner.next_seq();
    let entry = inner.entries.entry(hash.clone()).or_insert_with(|| {
      debug!(key = %description, "cache miss");
      let (notify, _) = watch::channel(EntrySnapshot::pending());
      Entry {
        id: entry_seq,
        description: description.clone(),
        tags: HashSet::new(),
        fetcher: fetcher.clone(),
        subscribers: 0,
        status: EntryStatus::Pending,
        value: None,
        error: None,
        fetched_at: None,
        fetched_at_utc: None,
        stale: false,
        stale_on_arrival: false,
        in_flight: None,
        fetch_seq: 0,
        eviction: None,
        notify,
      }
    });

    entry.subscribers += 1;
    entry.fetcher = fetcher;
    entry.tags = tags.iter().cloned().collect();
    entry.cancel_eviction();

    let needs_fetch = match (&entry.in_flight, entry.status) {
      (Some(_), _) => entry.stale_on_arrival,
      (None, EntryStatus::Pending | EntryStatus::Rejected) => true,
      (None, EntryStatus::Fulfilled) => self.is_stale(entry),
    };
    if !needs_fetch {
      debug!(key = %description, subscribers = entry.subscribers, "cache hit");
    }

    let guard = SubscriberGuard {
      cache: self.clone(),
      key: hash.clone(),
      entry_id: entry.id,
      description,
    };
    let rx = entry.notify.subscribe();

    inner.tags.provide(&hash, tags);
    if needs_fetch {
      self.start_fetch(&mut inner, &hash);
    }
    drop(inner);

    Subscription::new(guard, rx)
  }

  /// Start a fetch for `key`, superseding any fetch already in flight.
  fn start_fetch(&self, inner: &mut Inner, key: &str) -> Option<Completion> {
    let seq = inner.next_seq();
    let entry = inner.entries.get_mut(key)?;

    let request = (entry.fetcher)();
    let cache = self.clone();
    let owned_key = key.to_string();
    let completion = async move {
      let result = request.await;
      cache.complete(&owned_key, seq, result.clone());
      result
    }
    .boxed()
    .shared();

    entry.fetch_seq = seq;
    entry.in_flight = Some(completion.clone());
    entry.stale_on_arrival = false;
    entry.status = EntryStatus::Pending;
    entry.publish();
    debug!(key = %entry.description, seq, "fetch started");

    // Driven to completion even if every subscriber goes away.
    tokio::spawn(completion.clone());
    Some(completion)
  }

  fn complete(&self, key: &str, seq: u64, result: FetchResult) {
    let mut inner = self.lock();
    let Some(entry) = inner.entries.get_mut(key) else {
      debug!(seq, "dropping result for evicted entry");
      return;
    };
    if entry.fetch_seq != seq {
      debug!(key = %entry.description, seq, "dropping superseded result");
      return;
    }

    entry.in_flight = None;
    match result {
      Ok(value) => {
        entry.status = EntryStatus::Fulfilled;
        entry.value = Some(value);
        entry.error = None;
        debug!(key = %entry.description, "fetch fulfilled");
      }
      Err(error) => {
        warn!(key = %entry.description, error = %error, "fetch rejected");
        entry.status = EntryStatus::Rejected;
        entry.value = None;
        entry.error = Some(error);
      }
    }
    entry.fetched_at = Some(Instant::now());
    entry.fetched_at_utc = Some(Utc::now());
    entry.stale = std::mem::take(&mut entry.stale_on_arrival);
    entry.publish();

    let tags: Vec<Tag> = entry.tags.iter().cloned().collect();
    inner.tags.provide(key, tags);
  }

  /// Mark every entry providing one of `tags` as stale.
  ///
  /// Subscribed entries are refetched right away; the returned completions
  /// resolve once those refetches are stored. Unsubscribed entries refetch on
  /// their next subscription.
  pub fn mark_invalidated(&self, tags: &[Tag]) -> Vec<Completion> {
    let mut inner = self.lock();
    let keys = inner.tags.keys_for(tags);
    let mut pending = Vec::new();

    for key in &keys {
      let subscribed = match inner.entries.get_mut(key) {
        Some(entry) => {
          entry.stale = true;
          if entry.subscribers == 0 {
            if entry.in_flight.is_some() {
              entry.stale_on_arrival = true;
            }
            entry.publish();
          }
          entry.subscribers > 0
        }
        None => false,
      };
      if subscribed {
        pending.extend(self.start_fetch(&mut inner, key));
      }
    }

    let tag_list: Vec<String> = tags.iter().map(Tag::to_string).collect();
    info!(
      tags = ?tag_list,
      matched = keys.len(),
      refetching = pending.len(),
      "invalidated"
    );
    pending
  }

  /// Invalidate `tags` and wait for subscribed entries to be refetched.
  pub async fn invalidate(&self, tags: &[Tag]) {
    let pending = self.mark_invalidated(tags);
    join_all(pending).await;
  }

  /// Refetch one entry by its cache hash.
  pub fn refetch(&self, key: &str) -> Option<Completion> {
    let mut inner = self.lock();
    self.start_fetch(&mut inner, key)
  }

  /// Drop every entry. Results of fetches still in flight are discarded.
  pub fn reset(&self) {
    let mut inner = self.lock();
    let count = inner.entries.len();
    for entry in inner.entries.values_mut() {
      entry.cancel_eviction();
    }
    inner.entries.clear();
    inner.tags.clear();
    info!(entries = count, "query cache reset");
  }

  fn release(&self, key: &str, entry_id: u64) {
    let mut inner = self.lock();
    let Some(entry) = inner.entries.get_mut(key) else {
      return;
    };
    if entry.id != entry_id {
      return;
    }
    entry.subscribers = entry.subscribers.saturating_sub(1);
    if entry.subscribers > 0 {
      return;
    }

    let keep = self.settings.keep_unused_for;
    let runtime = tokio::runtime::Handle::try_current();
    match runtime {
      Ok(handle) if !keep.is_zero() => {
        let cache = self.clone();
        let owned_key = key.to_string();
        entry.cancel_eviction();
        entry.eviction = Some(handle.spawn(async move {
          tokio::time::sleep(keep).await;
          cache.evict_if_unused(&owned_key, entry_id);
        }));
        debug!(key = %entry.description, ?keep, "no subscribers, eviction scheduled");
      }
      _ => inner.remove(key),
    }
  }

  fn evict_if_unused(&self, key: &str, entry_id: u64) {
    let mut inner = self.lock();
    let unused = inner
      .entries
      .get(key)
      .is_some_and(|e| e.id == entry_id && e.subscribers == 0);
    if unused {
      if let Some(entry) = inner.entries.get_mut(key) {
        // This task is the eviction handle; don't abort ourselves.
        entry.eviction = None;
      }
      inner.remove(key);
    }
  }

  pub fn entry_info<K: QueryKey>(&self, key: &K) -> Option<EntryInfo> {
    let hash = key.cache_hash();
    let inner = self.lock();
    inner.entries.get(&hash).map(|entry| {
      let mut tags: Vec<Tag> = entry.tags.iter().cloned().collect();
      tags.sort();
      EntryInfo {
        description: entry.description.clone(),
        status: entry.status,
        subscribers: entry.subscribers,
        stale: self.is_stale(entry),
        tags,
      }
    })
  }

  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }
}

impl std::fmt::Debug for QueryCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryCache")
      .field("entries", &self.len())
      .field("settings", &self.settings)
      .finish()
  }
}

/// Counts one subscriber on an entry for as long as it lives.
pub struct SubscriberGuard {
  cache: QueryCache,
  key: String,
  entry_id: u64,
  description: String,
}

impl SubscriberGuard {
  pub fn description(&self) -> &str {
    &self.description
  }

  pub fn refetch(&self) -> Option<Completion> {
    self.cache.refetch(&self.key)
  }
}

impl Drop for SubscriberGuard {
  fn drop(&mut self) {
    self.cache.release(&self.key, self.entry_id);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::QueryState;
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};

  struct TestKey(&'static str);

  impl QueryKey for TestKey {
    fn cache_hash(&self) -> String {
      self.0.to_string()
    }

    fn description(&self) -> String {
      format!("test {}", self.0)
    }

    fn provides(&self) -> Vec<Tag> {
      vec![Tag::list("Products")]
    }
  }

  /// Fetcher returning how many times it has been called, after `delay`.
  fn counting(counter: Arc<AtomicU32>, delay: Duration) -> Fetcher {
    Arc::new(move || {
      let counter = counter.clone();
      async move {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(delay).await;
        Ok(json!(n))
      }
      .boxed()
    })
  }

  fn subscribe(cache: &QueryCache, key: &'static str, fetcher: Fetcher) -> Subscription<u32> {
    let key = TestKey(key);
    let tags = key.provides();
    cache.query(&key, tags, fetcher)
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_queries_share_one_fetch() {
    let cache = QueryCache::new(CacheSettings::default());
    let counter = Arc::new(AtomicU32::new(0));
    let fetcher = counting(counter.clone(), Duration::from_millis(50));

    let mut a = subscribe(&cache, "list", fetcher.clone());
    let mut b = subscribe(&cache, "list", fetcher.clone());
    let mut c = subscribe(&cache, "list", fetcher);
    assert!(a.state().is_loading());

    assert_eq!(a.settled().await.data(), Some(&1));
    assert_eq!(b.settled().await.data(), Some(&1));
    assert_eq!(c.settled().await.data(), Some(&1));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(cache.entry_info(&TestKey("list")).unwrap().subscribers, 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_fresh_entry_served_without_fetch() {
    let cache = QueryCache::new(CacheSettings::default());
    let counter = Arc::new(AtomicU32::new(0));
    let fetcher = counting(counter.clone(), Duration::from_millis(10));

    let mut first = subscribe(&cache, "list", fetcher.clone());
    first.settled().await;

    let second = subscribe(&cache, "list", fetcher);
    assert_eq!(second.state(), &QueryState::Success(1));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_entry_served_while_refetching() {
    let settings = CacheSettings {
      stale_after: Some(Duration::from_secs(60)),
      ..Default::default()
    };
    let cache = QueryCache::new(settings);
    let counter = Arc::new(AtomicU32::new(0));
    let fetcher = counting(counter.clone(), Duration::from_millis(10));

    let mut first = subscribe(&cache, "list", fetcher.clone());
    first.settled().await;
    tokio::time::sleep(Duration::from_secs(61)).await;

    let mut second = subscribe(&cache, "list", fetcher);
    assert_eq!(second.state(), &QueryState::Refreshing(1));
    assert_eq!(second.settled().await, &QueryState::Success(2));
  }

  #[tokio::test]
  async fn test_rejection_is_observable() {
    let cache = QueryCache::new(CacheSettings::default());
    let fetcher: Fetcher =
      Arc::new(|| async { Err(ErrorInfo::new(Some(500), "Internal error")) }.boxed());

    let mut sub = subscribe(&cache, "broken", fetcher);
    let state = sub.settled().await;
    assert_eq!(
      state.error(),
      Some(&ErrorInfo::new(Some(500), "Internal error"))
    );
    assert_eq!(
      cache.entry_info(&TestKey("broken")).unwrap().status,
      EntryStatus::Rejected
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_refetches_subscribed_entries_before_returning() {
    let cache = QueryCache::new(CacheSettings::default());
    let counter = Arc::new(AtomicU32::new(0));
    let fetcher = counting(counter.clone(), Duration::from_millis(20));

    let mut sub = subscribe(&cache, "list", fetcher);
    sub.settled().await;

    cache.invalidate(&[Tag::list("Products")]).await;

    assert!(sub.poll());
    assert_eq!(sub.state(), &QueryState::Success(2));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_marks_unsubscribed_entries_stale() {
    let settings = CacheSettings {
      stale_after: None,
      ..Default::default()
    };
    let cache = QueryCache::new(settings);
    let counter = Arc::new(AtomicU32::new(0));
    let fetcher = counting(counter.clone(), Duration::from_millis(20));

    let mut sub = subscribe(&cache, "list", fetcher.clone());
    sub.settled().await;
    drop(sub);

    cache.invalidate(&[Tag::list("Products")]).await;
    // Idempotent
    cache.invalidate(&[Tag::list("Products")]).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(cache.entry_info(&TestKey("list")).unwrap().stale);

    let mut again = subscribe(&cache, "list", fetcher);
    assert_eq!(again.state(), &QueryState::Refreshing(1));
    // Subscribers see the invalidation alongside the old data
    assert!(again.is_stale());
    let first_fetch = again.fetched_at().unwrap();
    assert_eq!(again.settled().await, &QueryState::Success(2));
    assert!(!again.is_stale());
    assert!(again.fetched_at().unwrap() >= first_fetch);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_during_fetch_never_serves_old_result() {
    let cache = QueryCache::new(CacheSettings::default());
    let counter = Arc::new(AtomicU32::new(0));
    let fetcher = counting(counter.clone(), Duration::from_millis(100));

    let mut sub = subscribe(&cache, "list", fetcher);
    tokio::time::sleep(Duration::from_millis(10)).await;

    cache.invalidate(&[Tag::list("Products")]).await;
    assert_eq!(sub.settled().await, &QueryState::Success(2));

    // The superseded first fetch lands later and must not overwrite.
    tokio::time::sleep(Duration::from_millis(200)).await;
    sub.poll();
    assert_eq!(sub.state(), &QueryState::Success(2));
  }

  #[tokio::test(start_paused = true)]
  async fn test_unused_entry_evicted_after_retention() {
    let cache = QueryCache::new(CacheSettings::default());
    let counter = Arc::new(AtomicU32::new(0));
    let fetcher = counting(counter.clone(), Duration::from_millis(10));

    let mut sub = subscribe(&cache, "list", fetcher.clone());
    sub.settled().await;
    drop(sub);

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(cache.len(), 1);

    // A new subscriber cancels the pending eviction.
    let sub = subscribe(&cache, "list", fetcher);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(cache.len(), 1);

    drop(sub);
    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(cache.len(), 0);
    assert!(cache.entry_info(&TestKey("list")).is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_unsubscribe_does_not_cancel_fetch() {
    let cache = QueryCache::new(CacheSettings::default());
    let counter = Arc::new(AtomicU32::new(0));
    let fetcher = counting(counter.clone(), Duration::from_millis(50));

    drop(subscribe(&cache, "list", fetcher.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let sub = subscribe(&cache, "list", fetcher);
    assert_eq!(sub.state(), &QueryState::Success(1));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_reset_discards_entries_and_in_flight_results() {
    let cache = QueryCache::new(CacheSettings::default());
    let counter = Arc::new(AtomicU32::new(0));
    let fetcher = counting(counter.clone(), Duration::from_millis(50));

    let mut sub = subscribe(&cache, "list", fetcher);
    cache.reset();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(cache.len(), 0);
    assert!(sub.poll());
    assert!(sub.state().is_error());
  }
}
