//! Plain-text rendering of catalog data for the terminal.

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::cache::EntryInfo;
use crate::catalog::types::{Category, Product};
use crate::commands::COMMANDS;
use crate::error::ErrorInfo;
use crate::filters::FilterState;
use crate::query::QueryState;
use crate::session::Session;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

pub fn price(value: f64) -> String {
  format!("${:.2}", value)
}

pub fn product_table(products: &[Product]) -> String {
  if products.is_empty() {
    return "No products found.\n".to_string();
  }

  let mut out = String::new();
  let _ = writeln!(out, "{:<26} {:<32} {:>10}  {:<20}", "ID", "NAME", "PRICE", "CATEGORY");
  for product in products {
    let _ = writeln!(
      out,
      "{:<26} {:<32} {:>10}  {:<20}",
      truncate(&product.id, 26),
      truncate(&product.name, 32),
      price(product.price),
      truncate(&product.category.name, 20)
    );
  }
  out
}

pub fn product_detail(product: &Product) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{} ({})", product.name, product.id);
  let _ = writeln!(out, "  Price:       {}", price(product.price));
  let _ = writeln!(
    out,
    "  Category:    {} ({})",
    product.category.name, product.category.id
  );
  if let Some(stock) = product.stock {
    let _ = writeln!(out, "  Stock:       {}", stock);
  }
  let _ = writeln!(out, "  Description: {}", product.description);
  for image in &product.images {
    let _ = writeln!(out, "  Image:       {}", image);
  }
  if let Some(updated) = product.updated_at.as_deref().or(product.created_at.as_deref()) {
    let _ = writeln!(out, "  Updated:     {}", updated);
  }
  out
}

pub fn category_table(categories: &[Category]) -> String {
  if categories.is_empty() {
    return "No categories found.\n".to_string();
  }

  let mut out = String::new();
  let _ = writeln!(out, "{:<26} {:<24} {}", "ID", "NAME", "DESCRIPTION");
  for category in categories {
    let _ = writeln!(
      out,
      "{:<26} {:<24} {}",
      truncate(&category.id, 26),
      truncate(&category.name, 24),
      truncate(category.description.as_deref().unwrap_or(""), 40)
    );
  }
  out
}

pub fn category_detail(category: &Category) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{} ({})", category.name, category.id);
  if let Some(description) = &category.description {
    let _ = writeln!(out, "  Description: {}", description);
  }
  out
}

/// One-line summary of the active filters, e.g. `search 'lamp' | page 2 (10/page) | filtered`.
pub fn filter_summary(state: &FilterState, default_limit: u32) -> String {
  let mut parts = Vec::new();
  if !state.search_term.is_empty() {
    parts.push(format!("search '{}'", state.search_term));
  }
  if let Some(category_id) = &state.category_id {
    parts.push(format!("category {}", category_id));
  }
  match state.page() {
    Some(page) => parts.push(format!("page {} ({}/page)", page, state.limit)),
    None => parts.push("all results".to_string()),
  }
  if state.has_active_filters(default_limit) {
    parts.push("filtered, `clear` to reset".to_string());
  }
  parts.join(" | ")
}

/// How current the data on display is, e.g. `fetched 14:02:11`.
pub fn freshness(fetched_at: Option<DateTime<Utc>>, stale: bool) -> Option<String> {
  match (fetched_at, stale) {
    (_, true) => Some("stale, refetching".to_string()),
    (Some(at), false) => Some(format!("fetched {}", at.format("%H:%M:%S"))),
    (None, false) => None,
  }
}

pub fn entry_info(info: Option<&EntryInfo>) -> String {
  let Some(info) = info else {
    return "Not cached.\n".to_string();
  };
  let tags: Vec<String> = info.tags.iter().map(ToString::to_string).collect();
  let mut out = String::new();
  let _ = writeln!(out, "  Query:       {}", info.description);
  let _ = writeln!(out, "  Status:      {:?}", info.status);
  let _ = writeln!(out, "  Subscribers: {}", info.subscribers);
  let _ = writeln!(out, "  Stale:       {}", if info.stale { "yes" } else { "no" });
  let _ = writeln!(out, "  Tags:        {}", tags.join(", "));
  out
}

pub fn session_line(session: &Session) -> String {
  match (&session.identity, session.is_authenticated()) {
    (Some(identity), true) => format!("Signed in as {}", identity),
    _ => "Not signed in".to_string(),
  }
}

pub fn error_line(error: &ErrorInfo) -> String {
  if error.is_not_found() {
    format!("Not found: {}", error.message)
  } else {
    format!("Error: {}", error)
  }
}

/// Render a query state, delegating loaded data to `render`.
pub fn query_state<T>(state: &QueryState<T>, render: impl Fn(&T) -> String) -> String {
  match state {
    QueryState::Loading => "Loading...\n".to_string(),
    QueryState::Success(data) => render(data),
    QueryState::Refreshing(data) => format!("{}(refreshing)\n", render(data)),
    QueryState::Error(e) => format!("{}\n", error_line(e)),
  }
}

pub fn help() -> String {
  let mut out = String::new();
  for cmd in COMMANDS {
    let aliases = if cmd.aliases.is_empty() {
      String::new()
    } else {
      format!(" ({})", cmd.aliases.join(", "))
    };
    let _ = writeln!(out, "  {:<18} {}{}", cmd.usage, cmd.description, aliases);
  }
  out
}
