//! Session handler with injectable failures.

use crate::error::{Result, SessionError};
use crate::providers::SessionHandler;
use crate::state::SessionId;
use chrono::Duration;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Wraps a handler and fails `open` or `write` on demand.
///
/// Clones share the failure switches.
#[derive(Debug, Clone)]
pub struct FlakySessionHandler<H> {
    inner: H,
    fail_open: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl<H: SessionHandler> FlakySessionHandler<H> {
    /// Wrap `inner` with all operations succeeding.
    #[must_use]
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            fail_open: Arc::new(AtomicBool::new(false)),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make `open` fail (or succeed again).
    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make `write` fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Wrapped handler.
    #[must_use]
    pub const fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H: SessionHandler> SessionHandler for FlakySessionHandler<H> {
    fn open(&self, scope: &str) -> impl Future<Output = Result<()>> + Send {
        let fail = self.fail_open.load(Ordering::SeqCst);
        async move {
            if fail {
                return Err(SessionError::Storage("injected open failure".to_string()));
            }
            self.inner.open(scope).await
        }
    }

    fn close(&self) -> impl Future<Output = Result<()>> + Send {
        self.inner.close()
    }

    fn read(&self, session_id: &SessionId) -> impl Future<Output = Result<Vec<u8>>> + Send {
        self.inner.read(session_id)
    }

    fn write(
        &self,
        session_id: &SessionId,
        data: &[u8],
    ) -> impl Future<Output = Result<()>> + Send {
        let fail = self.fail_writes.load(Ordering::SeqCst);
        async move {
            if fail {
                return Err(SessionError::Storage("injected write failure".to_string()));
            }
            self.inner.write(session_id, data).await
        }
    }

    fn destroy(&self, session_id: &SessionId) -> impl Future<Output = Result<()>> + Send {
        self.inner.destroy(session_id)
    }

    fn gc(&self, max_lifetime: Duration) -> impl Future<Output = Result<usize>> + Send {
        self.inner.gc(max_lifetime)
    }

    fn validate_id(&self, session_id: &SessionId) -> impl Future<Output = Result<bool>> + Send {
        self.inner.validate_id(session_id)
    }

    fn create_id(&self) -> impl Future<Output = Result<SessionId>> + Send {
        self.inner.create_id()
    }
}
