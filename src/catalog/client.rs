use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::error::CatalogError;
use crate::session::SessionHandle;

use super::types::{
  AuthResponse, Category, CreateCategoryRequest, CreateProductRequest, LoginRequest,
  MessageResponse, Product, ProductListArgs, UpdateCategoryRequest, UpdateProductRequest,
};

/// Catalog REST API client
#[derive(Clone)]
pub struct CatalogClient {
  http: reqwest::Client,
  base_url: Url,
  session: SessionHandle,
  read_retries: u32,
}

impl CatalogClient {
  pub fn new(config: &ApiConfig, session: SessionHandle) -> Result<Self> {
    let base_url =
      Url::parse(&config.url).map_err(|e| eyre!("Invalid API url {}: {}", config.url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("Invalid API url {}: not a base url", config.url));
    }

    let http = reqwest::Client::builder()
      .timeout(config.timeout())
      .user_agent(concat!("catadm/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      session,
      read_retries: config.retries,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Exchange an email for a bearer token
  pub async fn authenticate(&self, email: &str) -> Result<String, CatalogError> {
    let body = LoginRequest {
      email: email.to_string(),
    };
    let response: AuthResponse = self
      .send(Method::POST, self.endpoint(&["auth"], &[]), Some(encode(&body)?), false)
      .await
      .map_err(|e| match e {
        // Any client-side rejection of the credentials is an auth failure
        CatalogError::Http { status, message } if (400..500).contains(&status) => {
          CatalogError::Auth(message)
        }
        CatalogError::NotFound(message) => CatalogError::Auth(message),
        other => other,
      })?;

    Ok(response.token)
  }

  /// List products matching the filters
  pub async fn list_products(&self, args: &ProductListArgs) -> Result<Vec<Product>, CatalogError> {
    let url = self.endpoint(&["products"], &args.query_pairs());
    self.send(Method::GET, url, None, true).await
  }

  /// Get a single product by id
  pub async fn get_product(&self, id: &str) -> Result<Product, CatalogError> {
    let url = self.endpoint(&["products", id], &[]);
    self.send(Method::GET, url, None, true).await
  }

  pub async fn create_product(&self, request: &CreateProductRequest) -> Result<Product, CatalogError> {
    let url = self.endpoint(&["products"], &[]);
    self.send(Method::POST, url, Some(encode(request)?), true).await
  }

  pub async fn update_product(
    &self,
    id: &str,
    request: &UpdateProductRequest,
  ) -> Result<Product, CatalogError> {
    let url = self.endpoint(&["products", id], &[]);
    self.send(Method::PUT, url, Some(encode(request)?), true).await
  }

  pub async fn delete_product(&self, id: &str) -> Result<MessageResponse, CatalogError> {
    let url = self.endpoint(&["products", id], &[]);
    self.send(Method::DELETE, url, None, true).await
  }

  /// Get all categories
  pub async fn list_categories(&self) -> Result<Vec<Category>, CatalogError> {
    let url = self.endpoint(&["categories"], &[]);
    self.send(Method::GET, url, None, true).await
  }

  pub async fn get_category(&self, id: &str) -> Result<Category, CatalogError> {
    let url = self.endpoint(&["categories", id], &[]);
    self.send(Method::GET, url, None, true).await
  }

  pub async fn create_category(
    &self,
    request: &CreateCategoryRequest,
  ) -> Result<Category, CatalogError> {
    let url = self.endpoint(&["categories"], &[]);
    self.send(Method::POST, url, Some(encode(request)?), true).await
  }

  pub async fn update_category(
    &self,
    id: &str,
    request: &UpdateCategoryRequest,
  ) -> Result<Category, CatalogError> {
    let url = self.endpoint(&["categories", id], &[]);
    self.send(Method::PUT, url, Some(encode(request)?), true).await
  }

  pub async fn delete_category(&self, id: &str) -> Result<MessageResponse, CatalogError> {
    let url = self.endpoint(&["categories", id], &[]);
    self.send(Method::DELETE, url, None, true).await
  }

  fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Url {
    let mut url = self.base_url.clone();
    // Checked in `new`: the base url always has path segments
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    if !query.is_empty() {
      url
        .query_pairs_mut()
        .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    }
    url
  }

  async fn send<T: DeserializeOwned>(
    &self,
    method: Method,
    url: Url,
    body: Option<Value>,
    authenticated: bool,
  ) -> Result<T, CatalogError> {
    let token = if authenticated {
      let token = self
        .session
        .token()
        .ok_or_else(|| CatalogError::Auth("Not signed in".to_string()))?;
      Some(token)
    } else {
      None
    };

    // Only reads are safe to repeat
    let attempts = if method == Method::GET {
      1 + self.read_retries
    } else {
      1
    };

    // A read counts as transported only once its body has arrived
    let mut attempt = 0;
    let (status, text) = loop {
      attempt += 1;
      let mut request = self.http.request(method.clone(), url.clone());
      if let Some(token) = &token {
        request = request.bearer_auth(token);
      }
      if let Some(body) = &body {
        request = request.json(body);
      }

      match exchange(request).await {
        Ok(exchanged) => break exchanged,
        Err(e) if attempt < attempts => {
          warn!(%method, path = url.path(), attempt, error = %e, "request failed, retrying");
        }
        Err(e) => {
          warn!(%method, path = url.path(), error = %e, "request failed");
          return Err(CatalogError::Network(transport_message(&e)));
        }
      }
    };

    debug!(%method, path = url.path(), status = status.as_u16(), "response");

    if !status.is_success() {
      return Err(CatalogError::from_status(
        status.as_u16(),
        backend_message(&text),
      ));
    }

    let parsed = if text.trim().is_empty() {
      serde_json::from_value(Value::Object(Default::default()))
    } else {
      serde_json::from_str(&text)
    };
    parsed.map_err(|e| CatalogError::InvalidResponse(format!("{} {}: {}", method, url.path(), e)))
  }
}

async fn exchange(request: reqwest::RequestBuilder) -> reqwest::Result<(StatusCode, String)> {
  let response = request.send().await?;
  let status = response.status();
  let text = response.text().await?;
  Ok((status, text))
}

fn encode<B: Serialize>(body: &B) -> Result<Value, CatalogError> {
  serde_json::to_value(body)
    .map_err(|e| CatalogError::InvalidResponse(format!("Failed to encode request: {}", e)))
}

fn transport_message(err: &reqwest::Error) -> String {
  if err.is_timeout() {
    "Request timed out".to_string()
  } else if err.is_connect() {
    "Could not connect to the catalog API".to_string()
  } else {
    err.to_string()
  }
}

/// The backend reports failures as `{"message": "..."}` or `{"message": ["...", ...]}`.
fn backend_message(body: &str) -> Option<String> {
  let value: Value = serde_json::from_str(body).ok()?;
  match value.get("message")? {
    Value::String(message) => Some(message.clone()),
    Value::Array(items) => Some(
      items
        .iter()
        .filter_map(Value::as_str)
        .collect::<Vec<_>>()
        .join(", "),
    ),
    _ => None,
  }
}
