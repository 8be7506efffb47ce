//! Product list filters, pagination, and binding them to the list query.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::catalog::types::{Product, ProductListArgs};
use crate::catalog::CachedCatalogClient;
use crate::query::Subscription;

/// Filter and pagination state of the product list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
  pub search_term: String,
  pub category_id: Option<String>,
  pub offset: u32,
  /// Page size; 0 means no limit
  pub limit: u32,
  /// Product picked for detail or deletion
  pub selected_product_id: Option<String>,
}

impl FilterState {
  /// Default snapshot with the given page size.
  pub fn with_limit(limit: u32) -> Self {
    Self {
      search_term: String::new(),
      category_id: None,
      offset: 0,
      limit,
      selected_product_id: None,
    }
  }

  /// Arguments of the list query these filters select.
  pub fn list_args(&self) -> ProductListArgs {
    ProductListArgs {
      offset: self.offset,
      limit: self.limit,
      search: self.search_term.clone(),
      category_id: self.category_id.clone(),
    }
  }

  pub fn has_active_filters(&self, default_limit: u32) -> bool {
    !self.search_term.is_empty() || self.category_id.is_some() || self.limit != default_limit
  }

  /// 1-based page number, if paginated
  pub fn page(&self) -> Option<u32> {
    (self.limit > 0).then(|| self.offset / self.limit + 1)
  }
}

impl Default for FilterState {
  fn default() -> Self {
    Self::with_limit(10)
  }
}

/// Owner of the filter state. Every transition is published to subscribers.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct FilterStore {
  tx: Arc<watch::Sender<FilterState>>,
  default: FilterState,
}

impl FilterStore {
  pub fn new(default: FilterState) -> Self {
    let (tx, _) = watch::channel(default.clone());
    Self {
      tx: Arc::new(tx),
      default,
    }
  }

  pub fn snapshot(&self) -> FilterState {
    self.tx.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<FilterState> {
    self.tx.subscribe()
  }

  pub fn default_limit(&self) -> u32 {
    self.default.limit
  }

  fn update(&self, change: impl FnOnce(&mut FilterState) -> bool) -> bool {
    let changed = self.tx.send_if_modified(change);
    if changed {
      let state = self.snapshot();
      debug!(filters = ?state, "filters changed");
    }
    changed
  }

  /// Commit a search term. Leading and trailing whitespace is ignored.
  pub fn set_search_term(&self, term: &str) -> bool {
    let term = term.trim();
    self.update(|state| {
      if state.search_term == term {
        return false;
      }
      state.search_term = term.to_string();
      true
    })
  }

  /// Filter by category; `None` or an empty id clears the filter.
  pub fn set_category(&self, category_id: Option<&str>) -> bool {
    let category_id = category_id
      .map(str::trim)
      .filter(|id| !id.is_empty())
      .map(String::from);
    self.update(|state| {
      if state.category_id == category_id {
        return false;
      }
      state.category_id = category_id;
      true
    })
  }

  pub fn set_limit(&self, limit: u32) -> bool {
    self.update(|state| {
      if state.limit == limit {
        return false;
      }
      state.limit = limit;
      true
    })
  }

  pub fn set_offset(&self, offset: u32) -> bool {
    self.update(|state| {
      if state.offset == offset {
        return false;
      }
      state.offset = offset;
      true
    })
  }

  /// Move one page forward. No-op without a page size.
  pub fn next_page(&self) -> bool {
    self.update(|state| {
      if state.limit == 0 {
        return false;
      }
      state.offset = state.offset.saturating_add(state.limit);
      true
    })
  }

  /// Move one page back, stopping at the first page.
  pub fn prev_page(&self) -> bool {
    self.update(|state| {
      if state.limit == 0 || state.offset == 0 {
        return false;
      }
      state.offset = state.offset.saturating_sub(state.limit);
      true
    })
  }

  pub fn select_product(&self, id: Option<&str>) -> bool {
    let id = id.map(String::from);
    self.update(|state| {
      if state.selected_product_id == id {
        return false;
      }
      state.selected_product_id = id;
      true
    })
  }

  /// Reset every filter to the default snapshot in one step.
  pub fn clear_all(&self) {
    self.tx.send_replace(self.default.clone());
    debug!("filters cleared");
  }
}

/// Keeps the product list subscription in step with the filters.
pub struct ProductListBinding {
  api: CachedCatalogClient,
  args: ProductListArgs,
  subscription: Subscription<Vec<Product>>,
}

impl ProductListBinding {
  pub fn new(api: CachedCatalogClient, state: &FilterState) -> Self {
    let args = state.list_args();
    let subscription = api.products(args.clone());
    Self {
      api,
      args,
      subscription,
    }
  }

  /// Rebind if `state` selects a different query. Returns `true` on rebind.
  pub fn sync(&mut self, state: &FilterState) -> bool {
    let args = state.list_args();
    if args == self.args {
      return false;
    }
    // Subscribe before releasing the old entry so a page flip back stays warm.
    let subscription = self.api.products(args.clone());
    self.subscription = subscription;
    self.args = args;
    debug!(query = self.subscription.describe(), "product list rebound");
    true
  }

  pub fn args(&self) -> &ProductListArgs {
    &self.args
  }

  pub fn subscription(&self) -> &Subscription<Vec<Product>> {
    &self.subscription
  }

  pub fn subscription_mut(&mut self) -> &mut Subscription<Vec<Product>> {
    &mut self.subscription
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSettings, QueryCache};
  use crate::catalog::CatalogClient;
  use crate::config::ApiConfig;
  use crate::debounce::Debouncer;
  use crate::session::{Session, SessionHandle};
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[test]
  fn test_clear_all_restores_default_snapshot() {
    let store = FilterStore::new(FilterState::default());
    store.set_search_term("lamp");
    store.set_category(Some("c1"));
    store.set_limit(25);
    store.set_offset(50);
    store.select_product(Some("p1"));

    store.clear_all();
    let state = store.snapshot();
    assert_eq!(state.search_term, "");
    assert_eq!(state.category_id, None);
    assert_eq!(state.offset, 0);
    assert_eq!(state.limit, 10);
    assert_eq!(state.selected_product_id, None);
  }

  #[test]
  fn test_setters_report_changes() {
    let store = FilterStore::new(FilterState::default());
    let mut rx = store.subscribe();

    assert!(store.set_search_term("  lamp "));
    assert_eq!(store.snapshot().search_term, "lamp");
    assert!(!store.set_search_term("lamp"));
    assert!(rx.has_changed().unwrap());
    rx.borrow_and_update();

    assert!(!store.set_category(Some("")));
    assert!(!rx.has_changed().unwrap());
    assert!(store.set_category(Some("c1")));
    assert!(store.set_category(None));
    assert_eq!(store.snapshot().category_id, None);
  }

  #[test]
  fn test_pagination() {
    let store = FilterStore::new(FilterState::default());
    assert!(!store.prev_page());
    assert!(store.next_page());
    assert!(store.next_page());
    assert_eq!(store.snapshot().offset, 20);
    assert_eq!(store.snapshot().page(), Some(3));

    store.set_offset(5);
    assert!(store.prev_page());
    assert_eq!(store.snapshot().offset, 0);

    store.set_limit(0);
    assert!(!store.next_page());
    assert_eq!(store.snapshot().page(), None);
  }

  #[test]
  fn test_active_filters() {
    let mut state = FilterState::default();
    assert!(!state.has_active_filters(10));
    state.limit = 20;
    assert!(state.has_active_filters(10));
    state.limit = 10;
    state.category_id = Some("c1".into());
    assert!(state.has_active_filters(10));
  }

  #[test]
  fn test_list_args_follow_state() {
    let state = FilterState {
      search_term: "lamp".into(),
      category_id: Some("c1".into()),
      offset: 20,
      limit: 0,
      selected_product_id: Some("p1".into()),
    };
    assert_eq!(
      state.list_args(),
      ProductListArgs {
        offset: 20,
        limit: 0,
        search: "lamp".into(),
        category_id: Some("c1".into()),
      }
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_debounced_search_rebinds_list_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/products"))
      .and(query_param("searchedText", "lamp"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/products"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .with_priority(10)
      .mount(&server)
      .await;

    let session = SessionHandle::default();
    session.replace(Session::new("t1", "user@example.com"));
    let config = ApiConfig {
      url: server.uri(),
      ..Default::default()
    };
    let api = CachedCatalogClient::from_parts(
      CatalogClient::new(&config, session).unwrap(),
      QueryCache::new(CacheSettings::default()),
    );

    let store = FilterStore::new(FilterState::default());
    let mut binding = ProductListBinding::new(api, &store.snapshot());

    let committer = store.clone();
    let mut debouncer = Debouncer::new(Duration::from_millis(500), move |term: String| {
      committer.set_search_term(&term);
    });
    for term in ["l", "la", "lam", "lamp"] {
      debouncer.input(term.to_string());
      tokio::time::sleep(Duration::from_millis(100)).await;
      assert!(!binding.sync(&store.snapshot()));
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    // Real time from here on so the HTTP timeout cannot fire early.
    tokio::time::resume();
    assert!(binding.sync(&store.snapshot()));
    assert_eq!(binding.args().search, "lamp");
    assert!(binding.subscription_mut().settled().await.is_success());
  }
}
