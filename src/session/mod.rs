//! Auth/session state: the bearer token and identity, mirrored to durable storage.

pub mod store;

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

use crate::catalog::CatalogClient;
use crate::error::CatalogError;
use crate::validation::validate_email;
use store::{ClientStore, EntryAttributes};

pub const TOKEN_ENTRY: &str = "auth_token";
pub const IDENTITY_ENTRY: &str = "auth_email";

/// How long a persisted session stays valid.
pub fn session_max_age() -> chrono::Duration {
  chrono::Duration::days(30)
}

/// Current session. Authenticated exactly when a token is held.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
  pub token: Option<String>,
  pub identity: Option<String>,
}

impl Session {
  pub fn new(token: impl Into<String>, identity: impl Into<String>) -> Self {
    Self {
      token: Some(token.into()),
      identity: Some(identity.into()),
    }
  }

  pub fn is_authenticated(&self) -> bool {
    self.token.is_some()
  }
}

/// Shared, read-mostly view of the session used to authorize requests.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle(Arc<RwLock<Session>>);

impl SessionHandle {
  pub fn get(&self) -> Session {
    self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  pub fn token(&self) -> Option<String> {
    self
      .0
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .token
      .clone()
  }

  pub(crate) fn replace(&self, session: Session) {
    *self.0.write().unwrap_or_else(PoisonError::into_inner) = session;
  }
}

/// Owns the session lifecycle: rehydrate, authenticate, logout.
pub struct SessionManager {
  store: Arc<dyn ClientStore>,
  handle: SessionHandle,
  attributes: EntryAttributes,
  initialized: AtomicBool,
}

impl SessionManager {
  pub fn new(store: Arc<dyn ClientStore>, production: bool) -> Self {
    Self {
      store,
      handle: SessionHandle::default(),
      attributes: EntryAttributes::session(production),
      initialized: AtomicBool::new(false),
    }
  }

  pub fn handle(&self) -> SessionHandle {
    self.handle.clone()
  }

  pub fn session(&self) -> Session {
    self.handle.get()
  }

  /// Rehydrate the session from storage. Runs once; later calls return the current session.
  pub fn initialize_auth(&self) -> Result<Session, CatalogError> {
    if self.initialized.swap(true, Ordering::SeqCst) {
      return Ok(self.session());
    }

    let token = self.store.get(TOKEN_ENTRY).map_err(storage_error)?;
    let identity = self.store.get(IDENTITY_ENTRY).map_err(storage_error)?;

    match (token, identity) {
      (Some(token), Some(identity)) => {
        info!(identity = %identity, "session restored");
        self.handle.replace(Session::new(token, identity));
      }
      (None, None) => {}
      _ => {
        // One half expired or went missing; treat as signed out.
        warn!("discarding incomplete persisted session");
        self.clear_persisted()?;
      }
    }
    Ok(self.session())
  }

  /// Exchange an email for a token and start a session.
  ///
  /// A rejected login leaves the current session untouched.
  pub async fn authenticate(
    &self,
    client: &CatalogClient,
    email: &str,
  ) -> Result<Session, CatalogError> {
    let email = validate_email(email)?;
    let token = client.authenticate(&email).await?;

    let max_age = session_max_age();
    self
      .store
      .set(TOKEN_ENTRY, &token, max_age, &self.attributes)
      .map_err(storage_error)?;
    if let Err(e) = self
      .store
      .set(IDENTITY_ENTRY, &email, max_age, &self.attributes)
    {
      // Never leave a token without its identity behind.
      if let Err(cleanup) = self.store.remove(TOKEN_ENTRY) {
        warn!(error = %cleanup, "failed to remove orphaned token");
      }
      return Err(storage_error(e));
    }

    let session = Session::new(token, email);
    self.handle.replace(session.clone());
    self.initialized.store(true, Ordering::SeqCst);
    info!(identity = ?session.identity, "signed in");
    Ok(session)
  }

  /// Clear the session in memory and in storage.
  pub fn logout(&self) -> Result<(), CatalogError> {
    let previous = self.session();
    self.handle.replace(Session::default());
    self.clear_persisted()?;
    info!(identity = ?previous.identity, "signed out");
    Ok(())
  }

  fn clear_persisted(&self) -> Result<(), CatalogError> {
    self.store.remove(TOKEN_ENTRY).map_err(storage_error)?;
    self.store.remove(IDENTITY_ENTRY).map_err(storage_error)?;
    Ok(())
  }
}

fn storage_error(err: color_eyre::Report) -> CatalogError {
  CatalogError::Storage(err.to_string())
}
