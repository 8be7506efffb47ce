//! Client-side form constraints, checked before anything reaches the network.

use std::fmt;
use url::Url;

use crate::catalog::types::{
  CreateCategoryRequest, CreateProductRequest, UpdateCategoryRequest, UpdateProductRequest,
};

const MIN_NAME_LEN: usize = 2;
const MIN_DESCRIPTION_LEN: usize = 10;

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
  pub field: &'static str,
  pub message: String,
}

/// All rejected fields of one form, in form order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
  pub errors: Vec<FieldError>,
}

impl ValidationErrors {
  fn push(&mut self, field: &'static str, message: impl Into<String>) {
    self.errors.push(FieldError {
      field,
      message: message.into(),
    });
  }

  pub fn is_empty(&self) -> bool {
    self.errors.is_empty()
  }

  fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
    if self.is_empty() {
      Ok(value)
    } else {
      Err(self)
    }
  }
}

impl fmt::Display for ValidationErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let parts: Vec<String> = self
      .errors
      .iter()
      .map(|e| format!("{}: {}", e.field, e.message))
      .collect();
    write!(f, "Invalid input ({})", parts.join("; "))
  }
}

impl std::error::Error for ValidationErrors {}

/// Raw product form input. Price stays textual until validated.
#[derive(Debug, Clone, Default)]
pub struct ProductForm {
  pub name: String,
  pub price: String,
  pub description: String,
  pub category: String,
  pub images: Vec<String>,
}

/// Raw partial product input for edits.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
  pub name: Option<String>,
  pub price: Option<String>,
  pub description: Option<String>,
  pub category: Option<String>,
  pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryForm {
  pub name: String,
  pub description: Option<String>,
}

fn check_name(errors: &mut ValidationErrors, name: &str, required: &str) {
  if name.trim().is_empty() {
    errors.push("name", required);
  } else if name.trim().chars().count() < MIN_NAME_LEN {
    errors.push("name", "Name must be at least 2 characters");
  }
}

fn check_price(errors: &mut ValidationErrors, price: &str) -> Option<f64> {
  let price = price.trim();
  if price.is_empty() {
    errors.push("price", "Price is required");
    return None;
  }
  match price.parse::<f64>() {
    Ok(p) if p.is_finite() && p > 0.0 => Some(p),
    _ => {
      errors.push("price", "Price must be a positive number");
      None
    }
  }
}

fn check_description(errors: &mut ValidationErrors, description: &str) {
  if description.trim().is_empty() {
    errors.push("description", "Description is required");
  } else if description.trim().chars().count() < MIN_DESCRIPTION_LEN {
    errors.push("description", "Description must be at least 10 characters");
  }
}

fn check_category(errors: &mut ValidationErrors, category: &str) {
  if category.trim().is_empty() {
    errors.push("category", "Category is required");
  }
}

/// Blank entries are dropped; every other entry must be an absolute URL.
fn check_images(errors: &mut ValidationErrors, images: &[String]) -> Vec<String> {
  let images: Vec<String> = images
    .iter()
    .map(|i| i.trim())
    .filter(|i| !i.is_empty())
    .map(String::from)
    .collect();
  if let Some(bad) = images.iter().find(|i| Url::parse(i).is_err()) {
    errors.push("images", format!("Invalid image URL: {}", bad));
  }
  images
}

/// Same shape the login form accepts: `local@domain.tld`, no whitespace, one `@`.
fn is_valid_email(email: &str) -> bool {
  let Some((local, domain)) = email.split_once('@') else {
    return false;
  };
  let clean = |part: &str| {
    !part.is_empty() && !part.contains('@') && !part.chars().any(char::is_whitespace)
  };
  clean(local)
    && clean(domain)
    && domain
      .char_indices()
      .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

pub fn validate_product_form(form: &ProductForm) -> Result<CreateProductRequest, ValidationErrors> {
  let mut errors = ValidationErrors::default();
  check_name(&mut errors, &form.name, "Product name is required");
  let price = check_price(&mut errors, &form.price);
  check_description(&mut errors, &form.description);
  check_category(&mut errors, &form.category);
  let images = check_images(&mut errors, &form.images);

  errors.into_result(CreateProductRequest {
    name: form.name.trim().to_string(),
    price: price.unwrap_or_default(),
    description: form.description.trim().to_string(),
    category_id: form.category.trim().to_string(),
    images,
  })
}

/// Validate only the fields present in the patch.
pub fn validate_product_patch(patch: &ProductPatch) -> Result<UpdateProductRequest, ValidationErrors> {
  let mut errors = ValidationErrors::default();
  if let Some(name) = &patch.name {
    check_name(&mut errors, name, "Product name is required");
  }
  let price = patch.price.as_deref().and_then(|p| check_price(&mut errors, p));
  if let Some(description) = &patch.description {
    check_description(&mut errors, description);
  }
  if let Some(category) = &patch.category {
    check_category(&mut errors, category);
  }
  let images = patch
    .images
    .as_deref()
    .map(|images| check_images(&mut errors, images));

  errors.into_result(UpdateProductRequest {
    name: patch.name.as_ref().map(|n| n.trim().to_string()),
    price,
    description: patch.description.as_ref().map(|d| d.trim().to_string()),
    category_id: patch.category.as_ref().map(|c| c.trim().to_string()),
    images,
  })
}

pub fn validate_category_form(form: &CategoryForm) -> Result<CreateCategoryRequest, ValidationErrors> {
  let mut errors = ValidationErrors::default();
  check_name(&mut errors, &form.name, "Category name is required");

  errors.into_result(CreateCategoryRequest {
    name: form.name.trim().to_string(),
    description: non_blank(form.description.as_deref()),
  })
}

pub fn validate_category_patch(
  name: Option<&str>,
  description: Option<&str>,
) -> Result<UpdateCategoryRequest, ValidationErrors> {
  let mut errors = ValidationErrors::default();
  if let Some(name) = name {
    check_name(&mut errors, name, "Category name is required");
  }

  errors.into_result(UpdateCategoryRequest {
    name: name.map(|n| n.trim().to_string()),
    description: non_blank(description),
  })
}

pub fn validate_email(email: &str) -> Result<String, ValidationErrors> {
  let mut errors = ValidationErrors::default();
  let email = email.trim();
  if email.is_empty() {
    errors.push("email", "Email is required");
  } else if !is_valid_email(email) {
    errors.push("email", "Please enter a valid email");
  }
  errors.into_result(email.to_string())
}

fn non_blank(s: Option<&str>) -> Option<String> {
  s.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}
