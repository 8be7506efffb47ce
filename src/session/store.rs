//! Durable client storage: named values with an expiry, SQLite-backed.
//!
//! Entries carry the same attributes a browser cookie would (path, secure,
//! same-site), so the session persisted here keeps the policy the backend
//! expects even though nothing here is sent automatically.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Same-site restriction of a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
  Strict,
  Lax,
  None,
}

impl SameSite {
  pub fn as_str(&self) -> &'static str {
    match self {
      SameSite::Strict => "strict",
      SameSite::Lax => "lax",
      SameSite::None => "none",
    }
  }

  fn parse(s: &str) -> Self {
    match s {
      "lax" => SameSite::Lax,
      "none" => SameSite::None,
      _ => SameSite::Strict,
    }
  }
}

/// Scope and transport policy of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryAttributes {
  pub path: String,
  /// Only ever transmitted over secure channels
  pub secure: bool,
  pub same_site: SameSite,
}

impl EntryAttributes {
  /// Path `/`, same-site strict, secure in production.
  pub fn session(production: bool) -> Self {
    Self {
      path: "/".to_string(),
      secure: production,
      same_site: SameSite::Strict,
    }
  }
}

/// A stored entry, expired or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
  pub value: String,
  pub expires_at: DateTime<Utc>,
  pub attributes: EntryAttributes,
}

impl StoredEntry {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expires_at <= now
  }
}

/// Trait for durable client storage backends.
pub trait ClientStore: Send + Sync {
  /// Read a raw entry, including expired ones.
  fn entry(&self, name: &str) -> Result<Option<StoredEntry>>;

  /// Store `value` under `name`, expiring at `expires_at`.
  fn put(&self, name: &str, entry: StoredEntry) -> Result<()>;

  /// Delete an entry. Missing entries are not an error.
  fn remove(&self, name: &str) -> Result<()>;

  /// Read a live value. Expired entries are purged and read as absent.
  fn get(&self, name: &str) -> Result<Option<String>> {
    match self.entry(name)? {
      Some(entry) if entry.is_expired(Utc::now()) => {
        debug!(name, "stored entry expired");
        self.remove(name)?;
        Ok(None)
      }
      Some(entry) => Ok(Some(entry.value)),
      None => Ok(None),
    }
  }

  /// Store `value` for `max_age` from now.
  fn set(&self, name: &str, value: &str, max_age: Duration, attributes: &EntryAttributes) -> Result<()> {
    self.put(
      name,
      StoredEntry {
        value: value.to_string(),
        expires_at: Utc::now() + max_age,
        attributes: attributes.clone(),
      },
    )
  }
}

/// Storage that lives only as long as the process.
/// Used for `--ephemeral` runs and tests.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl ClientStore for MemoryStore {
  fn entry(&self, name: &str) -> Result<Option<StoredEntry>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.get(name).cloned())
  }

  fn put(&self, name: &str, entry: StoredEntry) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert(name.to_string(), entry);
    Ok(())
  }

  fn remove(&self, name: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.remove(name);
    Ok(())
  }
}

/// SQLite-based client storage.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open or create the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open client storage at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("catadm").join("session.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORAGE_SCHEMA)
      .map_err(|e| eyre!("Failed to run storage migrations: {}", e))?;

    Ok(())
  }
}

const STORAGE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS client_storage (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    path TEXT NOT NULL DEFAULT '/',
    secure INTEGER NOT NULL DEFAULT 0,
    same_site TEXT NOT NULL DEFAULT 'strict',
    stored_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl ClientStore for SqliteStore {
  fn entry(&self, name: &str) -> Result<Option<StoredEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(String, String, String, bool, String)> = conn
      .query_row(
        "SELECT value, expires_at, path, secure, same_site FROM client_storage WHERE name = ?",
        params![name],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to read stored entry {}: {}", name, e))?;

    match row {
      Some((value, expires_at, path, secure, same_site)) => Ok(Some(StoredEntry {
        value,
        expires_at: parse_datetime(&expires_at)?,
        attributes: EntryAttributes {
          path,
          secure,
          same_site: SameSite::parse(&same_site),
        },
      })),
      None => Ok(None),
    }
  }

  fn put(&self, name: &str, entry: StoredEntry) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO client_storage (name, value, expires_at, path, secure, same_site, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          name,
          entry.value,
          entry.expires_at.to_rfc3339(),
          entry.attributes.path,
          entry.attributes.secure,
          entry.attributes.same_site.as_str(),
        ],
      )
      .map_err(|e| eyre!("Failed to store entry {}: {}", name, e))?;

    Ok(())
  }

  fn remove(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM client_storage WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to remove entry {}: {}", name, e))?;

    Ok(())
  }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
