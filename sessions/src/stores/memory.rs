//! In-memory session handler.
//!
//! Records live in a process-local map shared by all clones of the handler.
//! Suitable for tests and single-process deployments.

use crate::error::{Result, SessionError};
use crate::providers::{Clock, SessionHandler, SystemClock};
use crate::state::SessionId;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct StoredRecord {
    data: Vec<u8>,
    updated_at: DateTime<Utc>,
}

/// In-memory session handler.
#[derive(Clone)]
pub struct MemorySessionHandler {
    records: Arc<Mutex<HashMap<SessionId, StoredRecord>>>,
    clock: Arc<dyn Clock>,
}

impl MemorySessionHandler {
    /// Create an empty handler using the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create an empty handler that timestamps writes with `clock`.
    #[must_use]
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            clock: Arc::new(clock),
        }
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<SessionId, StoredRecord>>> {
        self.records
            .lock()
            .map_err(|_| SessionError::InternalError("Mutex lock failed".to_string()))
    }

    /// Get count of stored records (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn record_count(&self) -> Result<usize> {
        Ok(self.records()?.len())
    }

    /// Raw stored bytes for `session_id` (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn raw_record(&self, session_id: &SessionId) -> Result<Option<Vec<u8>>> {
        Ok(self.records()?.get(session_id).map(|record| record.data.clone()))
    }
}

impl Default for MemorySessionHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemorySessionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySessionHandler")
            .field("records", &self.record_count().unwrap_or_default())
            .finish_non_exhaustive()
    }
}

impl SessionHandler for MemorySessionHandler {
    async fn open(&self, _scope: &str) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn read(&self, session_id: &SessionId) -> Result<Vec<u8>> {
        Ok(self.raw_record(session_id)?.unwrap_or_default())
    }

    async fn write(&self, session_id: &SessionId, data: &[u8]) -> Result<()> {
        let record = StoredRecord {
            data: data.to_vec(),
            updated_at: self.clock.now(),
        };
        self.records()?.insert(session_id.clone(), record);
        Ok(())
    }

    async fn destroy(&self, session_id: &SessionId) -> Result<()> {
        self.records()?.remove(session_id);
        Ok(())
    }

    async fn gc(&self, max_lifetime: Duration) -> Result<usize> {
        let cutoff = self.clock.now() - max_lifetime;
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|_, record| record.updated_at >= cutoff);
        let removed = before - records.len();

        tracing::debug!(removed, "Collected expired in-memory sessions");
        Ok(removed)
    }

    async fn validate_id(&self, session_id: &SessionId) -> Result<bool> {
        Ok(self.records()?.contains_key(session_id))
    }

    async fn create_id(&self) -> Result<SessionId> {
        let records = self.records()?;
        loop {
            let candidate = SessionId::generate();
            if !records.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
    }
}
