//! Cached catalog client that wraps CatalogClient with the query cache.

use color_eyre::Result;
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::cache::{Fetcher, QueryCache, QueryKey, Tag};
use crate::config::Config;
use crate::error::{CatalogError, ErrorInfo};
use crate::query::Subscription;
use crate::session::SessionHandle;

use super::cache::{CatalogQueryKey, CATEGORIES, PRODUCTS};
use super::client::CatalogClient;
use super::types::{
  Category, CreateCategoryRequest, CreateProductRequest, MessageResponse, Product,
  ProductListArgs, UpdateCategoryRequest, UpdateProductRequest,
};

/// Catalog client with a shared query cache.
///
/// Reads return live subscriptions backed by the cache. Writes go straight to
/// the backend and, once they succeed, invalidate the tags they affect; they
/// return after the affected subscribed queries have been refetched.
#[derive(Clone)]
pub struct CachedCatalogClient {
  inner: CatalogClient,
  cache: QueryCache,
}

impl CachedCatalogClient {
  pub fn new(config: &Config, session: SessionHandle) -> Result<Self> {
    let inner = CatalogClient::new(&config.api, session)?;
    let cache = QueryCache::new(config.cache.settings());
    Ok(Self::from_parts(inner, cache))
  }

  pub fn from_parts(inner: CatalogClient, cache: QueryCache) -> Self {
    Self { inner, cache }
  }

  /// Uncached client, for requests that must not touch the cache.
  pub fn client(&self) -> &CatalogClient {
    &self.inner
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  /// Drop every cached query.
  pub fn reset(&self) {
    self.cache.reset();
  }

  fn subscribe<T>(&self, key: &CatalogQueryKey, fetcher: Fetcher) -> Subscription<T>
  where
    T: serde::de::DeserializeOwned,
  {
    self.cache.query(key, key.provides(), fetcher)
  }

  /// Products matching `args`.
  pub fn products(&self, args: ProductListArgs) -> Subscription<Vec<Product>> {
    let inner = self.inner.clone();
    let key = CatalogQueryKey::Products(args.clone());
    self.subscribe(
      &key,
      fetcher(move || {
        let inner = inner.clone();
        let args = args.clone();
        async move { inner.list_products(&args).await }
      }),
    )
  }

  pub fn product(&self, id: &str) -> Subscription<Product> {
    let inner = self.inner.clone();
    let id = id.to_string();
    let key = CatalogQueryKey::Product { id: id.clone() };
    self.subscribe(
      &key,
      fetcher(move || {
        let inner = inner.clone();
        let id = id.clone();
        async move { inner.get_product(&id).await }
      }),
    )
  }

  pub fn categories(&self) -> Subscription<Vec<Category>> {
    let inner = self.inner.clone();
    self.subscribe(
      &CatalogQueryKey::Categories,
      fetcher(move || {
        let inner = inner.clone();
        async move { inner.list_categories().await }
      }),
    )
  }

  pub fn category(&self, id: &str) -> Subscription<Category> {
    let inner = self.inner.clone();
    let id = id.to_string();
    let key = CatalogQueryKey::Category { id: id.clone() };
    self.subscribe(
      &key,
      fetcher(move || {
        let inner = inner.clone();
        let id = id.clone();
        async move { inner.get_category(&id).await }
      }),
    )
  }

  pub async fn create_product(&self, request: &CreateProductRequest) -> Result<Product, CatalogError> {
    let product = self.inner.create_product(request).await?;
    info!(id = %product.id, name = %product.name, "product created");
    self.cache.invalidate(&[Tag::list(PRODUCTS)]).await;
    Ok(product)
  }

  pub async fn update_product(
    &self,
    id: &str,
    request: &UpdateProductRequest,
  ) -> Result<Product, CatalogError> {
    let product = self.inner.update_product(id, request).await?;
    info!(id, "product updated");
    self
      .cache
      .invalidate(&[Tag::id(PRODUCTS, id), Tag::list(PRODUCTS)])
      .await;
    Ok(product)
  }

  pub async fn delete_product(&self, id: &str) -> Result<MessageResponse, CatalogError> {
    let response = self.inner.delete_product(id).await?;
    info!(id, "product deleted");
    self
      .cache
      .invalidate(&[Tag::id(PRODUCTS, id), Tag::list(PRODUCTS)])
      .await;
    Ok(response)
  }

  // Products embed their category, so category writes also refresh product lists.

  pub async fn create_category(
    &self,
    request: &CreateCategoryRequest,
  ) -> Result<Category, CatalogError> {
    let category = self.inner.create_category(request).await?;
    info!(id = %category.id, name = %category.name, "category created");
    self
      .cache
      .invalidate(&[Tag::list(CATEGORIES), Tag::list(PRODUCTS)])
      .await;
    Ok(category)
  }

  pub async fn update_category(
    &self,
    id: &str,
    request: &UpdateCategoryRequest,
  ) -> Result<Category, CatalogError> {
    let category = self.inner.update_category(id, request).await?;
    info!(id, "category updated");
    self
      .cache
      .invalidate(&[
        Tag::id(CATEGORIES, id),
        Tag::list(CATEGORIES),
        Tag::list(PRODUCTS),
      ])
      .await;
    Ok(category)
  }

  pub async fn delete_category(&self, id: &str) -> Result<MessageResponse, CatalogError> {
    let response = self.inner.delete_category(id).await?;
    info!(id, "category deleted");
    self
      .cache
      .invalidate(&[
        Tag::id(CATEGORIES, id),
        Tag::list(CATEGORIES),
        Tag::list(PRODUCTS),
      ])
      .await;
    Ok(response)
  }
}

/// Adapt a typed request into a cache fetcher.
fn fetcher<T, F, Fut>(request: F) -> Fetcher
where
  T: Serialize,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<T, CatalogError>> + Send + 'static,
{
  Arc::new(move || {
    let pending = request();
    async move {
      let data = pending.await.map_err(ErrorInfo::from)?;
      serde_json::to_value(&data)
        .map_err(|e| ErrorInfo::new(None, format!("Failed to encode response: {}", e)))
    }
    .boxed()
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSettings;
  use crate::config::ApiConfig;
  use crate::query::QueryState;
  use crate::session::Session;
  use serde_json::{json, Value};
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn product_json(id: &str, name: &str, category_id: &str) -> Value {
    json!({
      "id": id,
      "name": name,
      "price": 10.0,
      "description": "A product used in tests",
      "category": { "id": category_id, "name": "Tools" },
      "images": []
    })
  }

  fn api(server: &MockServer) -> CachedCatalogClient {
    let session = SessionHandle::default();
    session.replace(Session::new("t1", "user@example.com"));
    let config = ApiConfig {
      url: server.uri(),
      ..Default::default()
    };
    let inner = CatalogClient::new(&config, session).unwrap();
    CachedCatalogClient::from_parts(inner, QueryCache::new(CacheSettings::default()))
  }

  fn widget_request() -> CreateProductRequest {
    CreateProductRequest {
      name: "Widget".into(),
      price: 10.0,
      description: "A product used in tests".into(),
      category_id: "c1".into(),
      images: vec![],
    }
  }

  #[tokio::test]
  async fn test_identical_queries_issue_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/products"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([product_json("p1", "Lamp", "c1")])))
      .expect(1)
      .mount(&server)
      .await;

    let api = api(&server);
    let mut a = api.products(ProductListArgs::default());
    let mut b = api.products(ProductListArgs::default());

    assert_eq!(a.settled().await.data().map(Vec::len), Some(1));
    assert_eq!(b.settled().await.data().map(Vec::len), Some(1));
  }

  #[tokio::test]
  async fn test_create_refreshes_matching_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/products"))
      .and(query_param("categoryId", "c1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .up_to_n_times(1)
      .with_priority(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/products"))
      .and(query_param("categoryId", "c1"))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(json!([product_json("p9", "Widget", "c1")])),
      )
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/products"))
      .respond_with(ResponseTemplate::new(201).set_body_json(product_json("p9", "Widget", "c1")))
      .expect(1)
      .mount(&server)
      .await;

    let api = api(&server);
    let mut list = api.products(ProductListArgs {
      category_id: Some("c1".into()),
      ..Default::default()
    });
    assert_eq!(list.settled().await.data(), Some(&vec![]));

    let created = api.create_product(&widget_request()).await.unwrap();
    assert_eq!(created.name, "Widget");

    // The refetch finished before the mutation returned.
    list.poll();
    let names: Vec<&str> = list
      .state()
      .data()
      .unwrap()
      .iter()
      .map(|p| p.name.as_str())
      .collect();
    assert_eq!(names, vec!["Widget"]);
  }

  #[tokio::test]
  async fn test_delete_turns_detail_into_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/products/p1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(product_json("p1", "Lamp", "c1")))
      .up_to_n_times(1)
      .with_priority(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/products/p1"))
      .respond_with(
        ResponseTemplate::new(404).set_body_json(json!({ "message": "Product not found" })),
      )
      .mount(&server)
      .await;
    Mock::given(method("DELETE"))
      .and(path("/products/p1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Product deleted" })))
      .expect(1)
      .mount(&server)
      .await;

    let api = api(&server);
    let mut detail = api.product("p1");
    assert!(detail.settled().await.is_success());

    let response = api.delete_product("p1").await.unwrap();
    assert_eq!(response.message, "Product deleted");

    detail.poll();
    assert!(detail.state().error().is_some_and(|e| e.is_not_found()));
  }

  #[tokio::test]
  async fn test_failed_mutation_leaves_cache_alone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/products"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/products"))
      .respond_with(
        ResponseTemplate::new(400).set_body_json(json!({ "message": ["price must be positive"] })),
      )
      .mount(&server)
      .await;

    let api = api(&server);
    let mut list = api.products(ProductListArgs::default());
    list.settled().await;

    let err = api.create_product(&widget_request()).await.unwrap_err();
    assert_eq!(
      err,
      CatalogError::Http {
        status: 400,
        message: "price must be positive".into()
      }
    );
    assert!(!list.poll());
    assert_eq!(list.state(), &QueryState::Success(vec![]));
  }

  #[tokio::test]
  async fn test_category_update_refreshes_categories_and_products() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/categories"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "c1", "name": "Tools" }])))
      .expect(2)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/products"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([product_json("p1", "Lamp", "c1")])))
      .expect(2)
      .mount(&server)
      .await;
    Mock::given(method("PUT"))
      .and(path("/categories/c1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "c1", "name": "Hardware" })))
      .expect(1)
      .mount(&server)
      .await;

    let api = api(&server);
    let mut categories = api.categories();
    let mut products = api.products(ProductListArgs::default());
    categories.settled().await;
    products.settled().await;

    let request = UpdateCategoryRequest {
      name: Some("Hardware".into()),
      description: None,
    };
    let updated = api.update_category("c1", &request).await.unwrap();
    assert_eq!(updated.name, "Hardware");
  }

  #[tokio::test]
  async fn test_reset_cancels_subscriptions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/categories"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .mount(&server)
      .await;

    let api = api(&server);
    let mut categories = api.categories();
    categories.settled().await;

    api.reset();
    assert_eq!(api.cache().len(), 0);
    assert!(categories.poll());
    assert!(categories.state().is_error());
  }
}
