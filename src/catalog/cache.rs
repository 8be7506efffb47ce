//! Query keys and cache tags for catalog endpoints.

use sha2::{Digest, Sha256};

use crate::cache::{QueryKey, Tag};

use super::types::ProductListArgs;

/// Tag kind carried by product queries
pub const PRODUCTS: &str = "Products";
/// Tag kind carried by category queries
pub const CATEGORIES: &str = "Categories";

/// Query key types for catalog API calls.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CatalogQueryKey {
  /// Filtered, paginated product list
  Products(ProductListArgs),
  /// Get a single product by id
  Product { id: String },
  /// All categories
  Categories,
  /// Get a single category by id
  Category { id: String },
}

impl QueryKey for CatalogQueryKey {
  fn cache_hash(&self) -> String {
    let input = match self {
      // Field order of ProductListArgs is fixed, so the JSON form is canonical.
      Self::Products(args) => format!(
        "products:{}",
        serde_json::to_string(args).unwrap_or_default()
      ),
      Self::Product { id } => format!("product:{}", id),
      Self::Categories => "categories:".to_string(),
      Self::Category { id } => format!("category:{}", id),
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    match self {
      Self::Products(args) => {
        let mut parts = vec![format!("offset {}", args.offset), format!("limit {}", args.limit)];
        if !args.search.is_empty() {
          parts.push(format!("search '{}'", args.search));
        }
        if let Some(category_id) = &args.category_id {
          parts.push(format!("category {}", category_id));
        }
        format!("products ({})", parts.join(", "))
      }
      Self::Product { id } => format!("product {}", id),
      Self::Categories => "all categories".to_string(),
      Self::Category { id } => format!("category {}", id),
    }
  }

  fn provides(&self) -> Vec<Tag> {
    match self {
      Self::Products(_) => vec![Tag::list(PRODUCTS)],
      Self::Product { id } => vec![Tag::id(PRODUCTS, id.clone())],
      Self::Categories => vec![Tag::list(CATEGORIES)],
      Self::Category { id } => vec![Tag::id(CATEGORIES, id.clone())],
    }
  }
}
