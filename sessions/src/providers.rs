//! Session collaborators.
//!
//! This module defines the traits and function types the session manager
//! depends on. They enable dependency injection and make the lifecycle logic
//! testable.
//!
//! ```text
//! ┌──────────────────┐        ┌───────────────────────────┐
//! │ SessionManager   │──────► │ SessionHandler            │
//! │ - start/commit   │        │  EncryptingSessionHandler │
//! │ - regenerate_id  │        │    └─► Memory / Redis     │
//! └───┬─────────┬────┘        └───────────────────────────┘
//!     │         │
//!     ▼         ▼
//!   Clock   SessionCallbacks ──► EncryptionKeyManager (ID change)
//! ```
//!
//! - **Testing**: in-memory handler, `ManualClock`, recording callbacks
//! - **Production**: Redis handler, `SystemClock`

use crate::error::Result;
use crate::state::SessionId;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;

/// Storage backend for session records.
///
/// One handler serves one request: `open` is called when a session starts,
/// `close` when it is committed or destroyed.
///
/// # Implementation Notes
///
/// - `read` of an unknown identifier returns an empty payload, not an error
/// - `write` must not return before the write is confirmed
/// - Failures are returned, never retried internally
pub trait SessionHandler: Send + Sync {
    /// Acquire the store for this request.
    ///
    /// # Errors
    ///
    /// Returns error if the backend is unreachable.
    fn open(&self, scope: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Release the store.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails to release.
    fn close(&self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Read a session record.
    ///
    /// # Returns
    ///
    /// The stored bytes, or an empty vector if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails, or (for encrypting handlers) if
    /// the payload cannot be decrypted.
    fn read(
        &self,
        session_id: &SessionId,
    ) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;

    /// Write a session record.
    ///
    /// # Errors
    ///
    /// Returns error if the write is not confirmed.
    fn write(
        &self,
        session_id: &SessionId,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Delete a session record.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn destroy(
        &self,
        session_id: &SessionId,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Remove records older than `max_lifetime`.
    ///
    /// # Returns
    ///
    /// Number of records removed.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn gc(&self, max_lifetime: Duration)
    -> impl std::future::Future<Output = Result<usize>> + Send;

    /// Whether a record exists for `session_id`.
    ///
    /// Identifiers the store does not recognize are never adopted.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn validate_id(
        &self,
        session_id: &SessionId,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Generate a fresh identifier.
    ///
    /// Backends that can detect collisions should override this.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn create_id(&self) -> impl std::future::Future<Output = Result<SessionId>> + Send {
        async { Ok(SessionId::generate()) }
    }
}

/// Clock trait - abstracts time operations for testability.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Called with `(old_id, new_id)` whenever the live identifier changes.
pub type IdChangeCallback = Arc<dyn Fn(&SessionId, &SessionId) -> anyhow::Result<()> + Send + Sync>;

/// Called with `(session_id, expires_at)` when a record may be collected.
pub type GcNotifyCallback =
    Arc<dyn Fn(&SessionId, DateTime<Utc>) -> anyhow::Result<()> + Send + Sync>;

/// Optional host notifications. Failures are logged and ignored.
#[derive(Clone, Default)]
pub struct SessionCallbacks {
    /// Identifier-change hook (rotation and forwarding).
    pub on_id_change: Option<IdChangeCallback>,

    /// Garbage-collection hook (rotation and destroy).
    pub on_gc_notify: Option<GcNotifyCallback>,
}

impl SessionCallbacks {
    /// No callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identifier-change hook.
    #[must_use]
    pub fn with_id_change(mut self, callback: IdChangeCallback) -> Self {
        self.on_id_change = Some(callback);
        self
    }

    /// Set the garbage-collection hook.
    #[must_use]
    pub fn with_gc_notify(mut self, callback: GcNotifyCallback) -> Self {
        self.on_gc_notify = Some(callback);
        self
    }

    pub(crate) fn notify_id_change(&self, old_id: &SessionId, new_id: &SessionId) {
        if let Some(callback) = &self.on_id_change {
            if let Err(e) = callback(old_id, new_id) {
                tracing::warn!(
                    old_session_id = %old_id,
                    new_session_id = %new_id,
                    error = %e,
                    "Session ID change callback failed"
                );
            }
        }
    }

    pub(crate) fn notify_gc(&self, session_id: &SessionId, expires_at: DateTime<Utc>) {
        if let Some(callback) = &self.on_gc_notify {
            if let Err(e) = callback(session_id, expires_at) {
                tracing::warn!(
                    session_id = %session_id,
                    expires_at = %expires_at,
                    error = %e,
                    "Session GC notification callback failed"
                );
            }
        }
    }
}

impl fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("on_id_change", &self.on_id_change.is_some())
            .field("on_gc_notify", &self.on_gc_notify.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_failing_callbacks_are_swallowed() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let callbacks = SessionCallbacks::new()
            .with_id_change(Arc::new(|_: &SessionId, _: &SessionId| -> anyhow::Result<()> {
                anyhow::bail!("hook down")
            }))
            .with_gc_notify(Arc::new(move |_: &SessionId, _: DateTime<Utc>| -> anyhow::Result<()> {
                if let Ok(mut calls) = counter.lock() {
                    *calls += 1;
                }
                Ok(())
            }));

        let id = SessionId::generate();
        callbacks.notify_id_change(&id, &SessionId::generate());
        callbacks.notify_gc(&id, Utc::now());

        assert_eq!(*calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner), 1);
    }

    #[test]
    fn test_callbacks_debug() {
        let noop: IdChangeCallback =
            Arc::new(|_: &SessionId, _: &SessionId| -> anyhow::Result<()> { Ok(()) });
        let callbacks = SessionCallbacks::new().with_id_change(noop);
        assert_eq!(
            format!("{callbacks:?}"),
            "SessionCallbacks { on_id_change: true, on_gc_notify: false }"
        );
    }
}
