//! Encrypting session handler.
//!
//! Wraps any [`SessionHandler`] and encrypts record payloads with the
//! session's own key before they reach the backend. With encryption
//! disabled it is a transparent pass-through.

use crate::error::Result;
use crate::keys::EncryptionKeyManager;
use crate::providers::SessionHandler;
use crate::state::SessionId;
use chrono::Duration;
use std::sync::Arc;

/// Session handler that encrypts payloads with per-session keys.
#[derive(Debug, Clone)]
pub struct EncryptingSessionHandler<H> {
    inner: H,
    keys: Arc<EncryptionKeyManager>,
}

impl<H: SessionHandler> EncryptingSessionHandler<H> {
    /// Wrap `inner`, encrypting when the key manager's configuration says so.
    #[must_use]
    pub const fn new(inner: H, keys: Arc<EncryptionKeyManager>) -> Self {
        Self { inner, keys }
    }

    /// Key manager used by this handler.
    #[must_use]
    pub const fn keys(&self) -> &Arc<EncryptionKeyManager> {
        &self.keys
    }

    /// Wrapped backend.
    #[must_use]
    pub const fn inner(&self) -> &H {
        &self.inner
    }

    fn use_encryption(&self) -> bool {
        self.keys.config().use_encryption
    }
}

impl<H: SessionHandler> SessionHandler for EncryptingSessionHandler<H> {
    async fn open(&self, scope: &str) -> Result<()> {
        self.inner.open(scope).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    async fn read(&self, session_id: &SessionId) -> Result<Vec<u8>> {
        let payload = self.inner.read(session_id).await?;
        if self.use_encryption() {
            self.keys.decrypt(session_id, &payload)
        } else {
            Ok(payload)
        }
    }

    async fn write(&self, session_id: &SessionId, data: &[u8]) -> Result<()> {
        if self.use_encryption() {
            let ciphertext = self.keys.encrypt(session_id, data)?;
            self.inner.write(session_id, &ciphertext).await
        } else {
            self.inner.write(session_id, data).await
        }
    }

    async fn destroy(&self, session_id: &SessionId) -> Result<()> {
        self.inner.destroy(session_id).await?;
        if self.use_encryption() {
            self.keys.delete_key(session_id)?;
        }
        Ok(())
    }

    async fn gc(&self, max_lifetime: Duration) -> Result<usize> {
        self.inner.gc(max_lifetime).await
    }

    async fn validate_id(&self, session_id: &SessionId) -> Result<bool> {
        self.inner.validate_id(session_id).await
    }

    async fn create_id(&self) -> Result<SessionId> {
        self.inner.create_id().await
    }
}
