//! Trailing-edge debounce for rapidly changing input.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

type Commit<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Commits the latest input once no new input has arrived for `window`.
///
/// Each `input` restarts the timer; only the last value of a burst is
/// committed. Must be used from within a tokio runtime.
pub struct Debouncer<T> {
  window: Duration,
  commit: Commit<T>,
  pending: Arc<Mutex<Option<T>>>,
  timer: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
  pub fn new(window: Duration, commit: impl Fn(T) + Send + Sync + 'static) -> Self {
    Self {
      window,
      commit: Arc::new(commit),
      pending: Arc::new(Mutex::new(None)),
      timer: None,
    }
  }

  /// Record a new value and restart the quiescence window.
  pub fn input(&mut self, value: T) {
    self.stop_timer();
    *lock(&self.pending) = Some(value);

    let pending = self.pending.clone();
    let commit = self.commit.clone();
    let window = self.window;
    self.timer = Some(tokio::spawn(async move {
      tokio::time::sleep(window).await;
      let value = lock(&pending).take();
      if let Some(value) = value {
        commit(value);
      }
    }));
  }

  /// Commit the pending value now. Returns `false` if nothing was pending.
  pub fn flush(&mut self) -> bool {
    self.stop_timer();
    let value = lock(&self.pending).take();
    match value {
      Some(value) => {
        (self.commit)(value);
        true
      }
      None => false,
    }
  }

  /// Drop the pending value without committing it.
  pub fn cancel(&mut self) -> Option<T> {
    self.stop_timer();
    lock(&self.pending).take()
  }

  fn stop_timer(&mut self) {
    if let Some(timer) = self.timer.take() {
      timer.abort();
    }
  }
}

impl<T> Drop for Debouncer<T> {
  fn drop(&mut self) {
    if let Some(timer) = self.timer.take() {
      timer.abort();
    }
  }
}

fn lock<T>(slot: &Mutex<Option<T>>) -> std::sync::MutexGuard<'_, Option<T>> {
  slot.lock().unwrap_or_else(PoisonError::into_inner)
}
