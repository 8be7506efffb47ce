//! Catalog records and request/response bodies as the backend speaks them.

use serde::{Deserialize, Serialize};

/// Product category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<String>,
}

/// Product record, with its category embedded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  pub id: String,
  pub name: String,
  pub price: f64,
  #[serde(default)]
  pub description: String,
  pub category: Category,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image: Option<String>,
  #[serde(default)]
  pub images: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub slug: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stock: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
  pub name: String,
  pub price: f64,
  pub description: String,
  pub category_id: String,
  pub images: Vec<String>,
}

/// Partial product update; absent fields are left untouched by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub price: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub images: Option<Vec<String>>,
}

impl UpdateProductRequest {
  pub fn is_empty(&self) -> bool {
    self == &Self::default()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateCategoryRequest {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateCategoryRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

/// Arguments of the product list endpoint.
///
/// `limit == 0` asks the backend for every match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductListArgs {
  pub offset: u32,
  pub limit: u32,
  pub search: String,
  pub category_id: Option<String>,
}

impl Default for ProductListArgs {
  fn default() -> Self {
    Self {
      offset: 0,
      limit: 10,
      search: String::new(),
      category_id: None,
    }
  }
}

impl ProductListArgs {
  /// Query string pairs in the order the backend documents them.
  pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
      ("offset", self.offset.to_string()),
      ("limit", self.limit.to_string()),
    ];
    if !self.search.is_empty() {
      pairs.push(("searchedText", self.search.clone()));
    }
    if let Some(category_id) = &self.category_id {
      pairs.push(("categoryId", category_id.clone()));
    }
    pairs
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
  pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
  pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageResponse {
  #[serde(default)]
  pub message: String,
}
