//! Recording host callbacks.

use crate::error::{Result, SessionError};
use crate::providers::SessionCallbacks;
use crate::state::SessionId;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

type Recorded<T> = Arc<Mutex<Vec<T>>>;

/// Callbacks that record every notification.
///
/// With [`RecordingCallbacks::failing`] each callback records its call and
/// then returns an error, to check that failures never abort a transition.
#[derive(Debug, Clone, Default)]
pub struct RecordingCallbacks {
    id_changes: Recorded<(SessionId, SessionId)>,
    gc_notifications: Recorded<(SessionId, DateTime<Utc>)>,
    fail: bool,
}

impl RecordingCallbacks {
    /// Create callbacks that succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create callbacks that record and then fail.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Callback set to hand to a session manager.
    #[must_use]
    pub fn callbacks(&self) -> SessionCallbacks {
        let id_changes = Arc::clone(&self.id_changes);
        let gc_notifications = Arc::clone(&self.gc_notifications);
        let fail_id_change = self.fail;
        let fail_gc = self.fail;

        SessionCallbacks::new()
            .with_id_change(Arc::new(move |old_id: &SessionId, new_id: &SessionId| -> anyhow::Result<()> {
                id_changes
                    .lock()
                    .map_err(|_| anyhow::anyhow!("Mutex lock failed"))?
                    .push((old_id.clone(), new_id.clone()));
                if fail_id_change {
                    anyhow::bail!("injected ID change callback failure");
                }
                Ok(())
            }))
            .with_gc_notify(Arc::new(move |session_id: &SessionId, expires_at: DateTime<Utc>| -> anyhow::Result<()> {
                gc_notifications
                    .lock()
                    .map_err(|_| anyhow::anyhow!("Mutex lock failed"))?
                    .push((session_id.clone(), expires_at));
                if fail_gc {
                    anyhow::bail!("injected GC callback failure");
                }
                Ok(())
            }))
    }

    /// Recorded `(old_id, new_id)` pairs, in call order.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn id_changes(&self) -> Result<Vec<(SessionId, SessionId)>> {
        Ok(self
            .id_changes
            .lock()
            .map_err(|_| SessionError::InternalError("Mutex lock failed".to_string()))?
            .clone())
    }

    /// Recorded `(session_id, expires_at)` pairs, in call order.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn gc_notifications(&self) -> Result<Vec<(SessionId, DateTime<Utc>)>> {
        Ok(self
            .gc_notifications
            .lock()
            .map_err(|_| SessionError::InternalError("Mutex lock failed".to_string()))?
            .clone())
    }
}
