//! Tracing setup: log lines go to a daily-rotated file, never to the terminal.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;

/// Environment variable holding a filter directive, e.g. `catadm=debug`
pub const LOG_ENV: &str = "CATADM_LOG";

/// Install the global subscriber. Keep the guard alive until exit so
/// buffered lines are flushed.
pub fn init(config: &Config) -> Result<WorkerGuard> {
  let dir = config.log_dir()?;
  init_in(&dir, &config.log.level)
}

pub fn init_in(dir: &Path, level: &str) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(dir, "catadm.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let _ = tracing_subscriber::registry()
    .with(filter(level))
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init();

  Ok(guard)
}

/// Prefer the environment, otherwise the configured level.
fn filter(level: &str) -> EnvFilter {
  EnvFilter::try_from_env(LOG_ENV)
    .or_else(|_| EnvFilter::try_new(level))
    .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_init_creates_log_directory() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    let guard = init_in(&logs, "debug").unwrap();
    tracing::info!("hello");
    drop(guard);
    assert!(logs.is_dir());
  }
}
