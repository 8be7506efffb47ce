//! Error types shared by the catalog client, the query cache and the CLI.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::validation::ValidationErrors;

/// Fallback shown when the backend does not say what went wrong.
pub const GENERIC_FAILURE: &str = "Operation failed";

/// Failures surfaced by catalog operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
  /// Form input rejected before anything was sent.
  #[error(transparent)]
  Validation(#[from] ValidationErrors),
  /// Credentials rejected, or no session to send.
  #[error("Authentication failed: {0}")]
  Auth(String),
  /// Transport failure or timeout.
  #[error("Network error: {0}")]
  Network(String),
  /// Non-2xx response other than 401/403/404.
  #[error("HTTP {status}: {message}")]
  Http { status: u16, message: String },
  /// The referenced entity does not exist.
  #[error("Not found: {0}")]
  NotFound(String),
  /// The backend answered with a body we could not decode.
  #[error("Unexpected response: {0}")]
  InvalidResponse(String),
  /// Durable client storage could not be read or written.
  #[error("Storage error: {0}")]
  Storage(String),
}

impl CatalogError {
  /// HTTP status attached to this error, if any.
  pub fn http_status(&self) -> Option<u16> {
    match self {
      CatalogError::Http { status, .. } => Some(*status),
      CatalogError::NotFound(_) => Some(404),
      CatalogError::Auth(_) => Some(401),
      _ => None,
    }
  }

  /// Classify a non-2xx response.
  pub fn from_status(status: u16, message: Option<String>) -> Self {
    let message = message
      .filter(|m| !m.trim().is_empty())
      .unwrap_or_else(|| GENERIC_FAILURE.to_string());
    match status {
      401 | 403 => CatalogError::Auth(message),
      404 => CatalogError::NotFound(message),
      _ => CatalogError::Http { status, message },
    }
  }
}

/// Error captured in a rejected cache entry.
///
/// Kept serialisable and cloneable so every subscriber of an entry can
/// observe the same failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
  pub http_status: Option<u16>,
  pub message: String,
}

impl ErrorInfo {
  pub fn new(http_status: Option<u16>, message: impl Into<String>) -> Self {
    Self {
      http_status,
      message: message.into(),
    }
  }

  pub fn is_not_found(&self) -> bool {
    self.http_status == Some(404)
  }
}

impl fmt::Display for ErrorInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.http_status {
      Some(status) => write!(f, "{} (HTTP {})", self.message, status),
      None => f.write_str(&self.message),
    }
  }
}

impl From<&CatalogError> for ErrorInfo {
  fn from(err: &CatalogError) -> Self {
    let message = match err {
      CatalogError::Auth(m)
      | CatalogError::Network(m)
      | CatalogError::NotFound(m)
      | CatalogError::InvalidResponse(m)
      | CatalogError::Storage(m) => m.clone(),
      CatalogError::Http { message, .. } => message.clone(),
      CatalogError::Validation(v) => v.to_string(),
    };
    ErrorInfo::new(err.http_status(), message)
  }
}

impl From<CatalogError> for ErrorInfo {
  fn from(err: CatalogError) -> Self {
    ErrorInfo::from(&err)
  }
}

impl From<ErrorInfo> for CatalogError {
  fn from(info: ErrorInfo) -> Self {
    match info.http_status {
      Some(status) => CatalogError::from_status(status, Some(info.message)),
      None => CatalogError::Network(info.message),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_classification() {
    assert!(matches!(
      CatalogError::from_status(404, None),
      CatalogError::NotFound(_)
    ));
    assert!(matches!(
      CatalogError::from_status(401, Some("bad email".into())),
      CatalogError::Auth(m) if m == "bad email"
    ));
    assert_eq!(
      CatalogError::from_status(500, Some("  ".into())),
      CatalogError::Http {
        status: 500,
        message: GENERIC_FAILURE.to_string()
      }
    );
  }

  #[test]
  fn test_error_info_keeps_status() {
    let info = ErrorInfo::from(CatalogError::NotFound("Product not found".into()));
    assert_eq!(info.http_status, Some(404));
    assert!(info.is_not_found());

    let back = CatalogError::from(info);
    assert_eq!(back, CatalogError::NotFound("Product not found".into()));
  }

  #[test]
  fn test_network_error_has_no_status() {
    let info = ErrorInfo::from(CatalogError::Network("connection refused".into()));
    assert_eq!(info.http_status, None);
    assert_eq!(info.to_string(), "connection refused");
  }
}
