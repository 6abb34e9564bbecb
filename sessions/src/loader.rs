//! One-call session wiring.
//!
//! [`SessionLoader`] builds a request's [`SessionManager`] with the
//! recommended setup: the backend wrapped in an [`EncryptingSessionHandler`],
//! one cookie jar shared by the manager and the key manager, and (with
//! encryption on) key cookies following every identifier change.

use crate::config::{SessionHandlerConfig, SessionManagerConfig};
use crate::cookies::SharedCookieJar;
use crate::error::Result;
use crate::fingerprint::ClientSignals;
use crate::keys::EncryptionKeyManager;
use crate::manager::SessionManager;
use crate::providers::{IdChangeCallback, SessionCallbacks, SessionHandler};
use crate::state::SessionId;
use crate::stores::EncryptingSessionHandler;
use http::HeaderMap;
use std::sync::Arc;

/// Session manager type produced by [`SessionLoader`].
pub type LoadedSession<H> = SessionManager<EncryptingSessionHandler<H>>;

/// Builds per-request session managers.
///
/// # Example
///
/// ```
/// use hardened_sessions::{SessionHandlerConfig, SessionLoader, SessionManagerConfig};
/// use hardened_sessions::stores::MemorySessionHandler;
/// use http::HeaderMap;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> hardened_sessions::Result<()> {
/// let request_headers = HeaderMap::new();
/// let mut session = SessionLoader::initialize(
///     SessionHandlerConfig::new(true),
///     SessionManagerConfig::default(),
///     MemorySessionHandler::new(),
///     &request_headers,
/// )?;
///
/// session.start_session().await?;
/// session.insert("cart", vec![1, 2, 3])?;
/// session.commit_session().await?;
///
/// let mut response_headers = HeaderMap::new();
/// session.cookies().apply_to(&mut response_headers)?;
/// // Session cookie plus key cookie.
/// assert_eq!(response_headers.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SessionLoader;

impl SessionLoader {
    /// Build a manager from the incoming request's headers.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SessionError::Configuration`] if either
    /// configuration is invalid.
    pub fn initialize<H: SessionHandler>(
        handler_config: SessionHandlerConfig,
        manager_config: SessionManagerConfig,
        backend: H,
        request_headers: &HeaderMap,
    ) -> Result<LoadedSession<H>> {
        Self::initialize_with(
            handler_config,
            manager_config,
            backend,
            SharedCookieJar::from_headers(request_headers),
            ClientSignals::from_headers(request_headers),
            SessionCallbacks::new(),
        )
    }

    /// Build a manager from explicit parts.
    ///
    /// Host callbacks run after the built-in key rotation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SessionError::Configuration`] if either
    /// configuration is invalid.
    pub fn initialize_with<H: SessionHandler>(
        handler_config: SessionHandlerConfig,
        manager_config: SessionManagerConfig,
        backend: H,
        cookies: SharedCookieJar,
        signals: ClientSignals,
        mut callbacks: SessionCallbacks,
    ) -> Result<LoadedSession<H>> {
        let cookie_config = handler_config.cookie.clone();
        let use_encryption = handler_config.use_encryption;
        let keys = Arc::new(EncryptionKeyManager::new(handler_config, cookies.clone())?);

        if use_encryption {
            let host_callback = callbacks.on_id_change.take();
            let key_manager = Arc::clone(&keys);
            let rotate_key: IdChangeCallback =
                Arc::new(move |old_id: &SessionId, new_id: &SessionId| -> anyhow::Result<()> {
                    key_manager.change_key_identifier(old_id, new_id)?;
                    if let Some(host_callback) = &host_callback {
                        host_callback(old_id, new_id)?;
                    }
                    Ok(())
                });
            callbacks.on_id_change = Some(rotate_key);
        }

        tracing::debug!(
            session_name = %manager_config.session_name,
            use_encryption,
            "Initializing session manager"
        );

        let handler = EncryptingSessionHandler::new(backend, keys);
        Ok(SessionManager::new(manager_config, handler, cookies, signals)?
            .with_callbacks(callbacks)
            .with_cookie_config(cookie_config)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mocks::RecordingCallbacks;
    use crate::stores::MemorySessionHandler;

    #[tokio::test]
    async fn test_rotation_moves_key_cookie_and_runs_host_callback() {
        let backend = MemorySessionHandler::new();
        let recorded = RecordingCallbacks::new();
        let cookies = SharedCookieJar::new();
        let mut session = SessionLoader::initialize_with(
            SessionHandlerConfig::new(true),
            SessionManagerConfig::default(),
            backend.clone(),
            cookies.clone(),
            ClientSignals::default(),
            recorded.callbacks(),
        )
        .unwrap();

        session.start_session().await.unwrap();
        session.insert("k", "v").unwrap();
        let old_id = session.session_id().unwrap().clone();
        session.commit_session().await.unwrap();
        assert!(cookies.get(&format!("SESSKEY_{old_id}")).unwrap().is_some());

        // Same request, explicit rotation after re-start.
        let mut session = SessionLoader::initialize_with(
            SessionHandlerConfig::new(true),
            SessionManagerConfig::default(),
            backend.clone(),
            cookies.clone(),
            ClientSignals::default(),
            recorded.callbacks(),
        )
        .unwrap();
        assert!(session.start_session().await.unwrap().is_valid());
        let new_id = session.regenerate_id().await.unwrap();
        session.commit_session().await.unwrap();

        assert_eq!(cookies.get(&format!("SESSKEY_{old_id}")).unwrap(), None);
        assert!(cookies.get(&format!("SESSKEY_{new_id}")).unwrap().is_some());
        assert_eq!(recorded.id_changes().unwrap(), vec![(old_id, new_id)]);
    }

    #[tokio::test]
    async fn test_invalid_handler_config_rejected() {
        let result = SessionLoader::initialize(
            SessionHandlerConfig::new(true).with_key_cookie_prefix("bad prefix"),
            SessionManagerConfig::default(),
            MemorySessionHandler::new(),
            &HeaderMap::new(),
        );
        assert!(result.is_err());
    }
}
