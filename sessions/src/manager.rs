//! Session lifecycle controller.
//!
//! A [`SessionManager`] serves exactly one request. It owns the request's
//! session identifier, security metadata and application data, and drives
//! them through the lifecycle:
//!
//! ```text
//!            start_session()
//!                 │
//!     ┌───────────┼─────────────────┬───────────────┐
//!     ▼           ▼                 ▼               ▼
//!   FRESH       ACTIVE          FORWARDING        INVALID
//! (initialize) (continue or    (switch to the   (clear, destroy,
//!               rotate)         forward target)   report)
//!                 │
//!          regenerate_id()
//!                 │
//!     old ID ─► FORWARDING until expire_data_at
//!     new ID ─► ACTIVE with fresh metadata
//! ```
//!
//! The host calls [`SessionManager::start_session`] before application logic
//! and [`SessionManager::commit_session`] after it, then writes the pending
//! cookie mutations from the shared jar onto the response.
//!
//! # Example
//!
//! ```
//! use hardened_sessions::{
//!     ClientSignals, SessionManager, SessionManagerConfig, SessionStart, SharedCookieJar,
//! };
//! use hardened_sessions::stores::MemorySessionHandler;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> hardened_sessions::Result<()> {
//! let backend = MemorySessionHandler::new();
//! let cookies = SharedCookieJar::new();
//! let mut session = SessionManager::new(
//!     SessionManagerConfig::default(),
//!     backend,
//!     cookies.clone(),
//!     ClientSignals::new(Some("Mozilla/5.0"), None, None),
//! )?;
//!
//! assert_eq!(session.start_session().await?, SessionStart::Initialized);
//! session.insert("user_id", 42)?;
//! session.commit_session().await?;
//!
//! // The session cookie is pending on the response.
//! assert_eq!(cookies.set_cookie_headers()?.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::config::{CookieConfig, SessionManagerConfig};
use crate::cookies::SharedCookieJar;
use crate::error::{Result, SessionError};
use crate::fingerprint::{ClientSignals, fingerprints_match};
use crate::providers::{Clock, SessionCallbacks, SessionHandler, SystemClock};
use crate::state::{SessionData, SessionId, SessionMetadata, SessionRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Outcome of [`SessionManager::start_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStart {
    /// No usable session was presented; a new one was created.
    Initialized,

    /// The presented session was valid and resumed.
    Continued,

    /// The presented session was valid and its identifier was rotated.
    Rotated {
        /// Identifier the client presented (now forwarding).
        previous: SessionId,
    },

    /// The presented identifier was recently rotated; the request was moved
    /// to the identifier it forwards to.
    Forwarded {
        /// Identifier the client presented.
        from: SessionId,
    },

    /// The presented session failed validation and was destroyed.
    ///
    /// The requester must be treated as unauthenticated. The manager is
    /// closed; calling `start_session` again begins a brand-new session.
    Invalidated,
}

impl SessionStart {
    /// Returns `true` unless the session was invalidated.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalidated)
    }
}

/// Per-request session lifecycle controller.
pub struct SessionManager<H, C = SystemClock> {
    config: SessionManagerConfig,
    cookie_config: CookieConfig,
    handler: H,
    clock: C,
    cookies: SharedCookieJar,
    signals: ClientSignals,
    callbacks: SessionCallbacks,
    session_id: Option<SessionId>,
    data: SessionData,
    metadata: Option<SessionMetadata>,
    open: bool,
}

impl<H: SessionHandler> SessionManager<H> {
    /// Create a manager for one request.
    ///
    /// # Arguments
    ///
    /// * `config` - Rotation thresholds and session cookie name
    /// * `handler` - Storage backend (possibly encrypting)
    /// * `cookies` - The request's cookie jar, shared with the key manager
    /// * `signals` - Client attributes used for fingerprinting
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if `config` is invalid.
    pub fn new(
        config: SessionManagerConfig,
        handler: H,
        cookies: SharedCookieJar,
        signals: ClientSignals,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cookie_config: CookieConfig::default(),
            handler,
            clock: SystemClock,
            cookies,
            signals,
            callbacks: SessionCallbacks::default(),
            session_id: None,
            data: SessionData::new(),
            metadata: None,
            open: false,
        })
    }
}

impl<H: SessionHandler, C: Clock> SessionManager<H, C> {
    /// Replace the clock.
    #[must_use]
    pub fn with_clock<C2: Clock>(self, clock: C2) -> SessionManager<H, C2> {
        SessionManager {
            config: self.config,
            cookie_config: self.cookie_config,
            handler: self.handler,
            clock,
            cookies: self.cookies,
            signals: self.signals,
            callbacks: self.callbacks,
            session_id: self.session_id,
            data: self.data,
            metadata: self.metadata,
            open: self.open,
        }
    }

    /// Set host notification callbacks.
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: SessionCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Set session cookie transport attributes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if the attributes are invalid.
    pub fn with_cookie_config(mut self, cookie_config: CookieConfig) -> Result<Self> {
        cookie_config.validate()?;
        self.cookie_config = cookie_config;
        Ok(self)
    }

    // ═══════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════

    /// Load, validate and resume (or create) the request's session.
    ///
    /// # Returns
    ///
    /// How the session was started. [`SessionStart::Invalidated`] is not an
    /// error: the untrustworthy session has been destroyed and the caller
    /// should proceed unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - A session is already started → [`SessionError::AlreadyStarted`]
    /// - The store fails → [`SessionError::Storage`]
    /// - A recognized record (or its forward target) is empty, has no
    ///   metadata, or has undecodable metadata →
    ///   [`SessionError::MetadataMissing`] / [`SessionError::MetadataCorrupt`]
    ///
    /// The store is released before any error is returned.
    pub async fn start_session(&mut self) -> Result<SessionStart> {
        if self.open {
            return Err(SessionError::AlreadyStarted);
        }

        self.handler
            .open(&self.config.session_name)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to open session store"))?;
        self.open = true;

        match self.load().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(error = %e, "Failed to start session");
                self.reset();
                if let Err(close_err) = self.release().await {
                    tracing::warn!(error = %close_err, "Failed to release session store");
                }
                Err(e)
            }
        }
    }

    async fn load(&mut self) -> Result<SessionStart> {
        let now = self.clock.now();
        let fingerprint = self.signals.fingerprint();

        let Some(session_id) = self.presented_session_id().await? else {
            let session_id = self.handler.create_id().await?;
            self.set_session_cookie(&session_id)?;
            return Ok(self.initialize(session_id, now, fingerprint));
        };

        let payload = match self.handler.read(&session_id).await {
            Ok(payload) => payload,
            Err(e) if e.invalidates_session() => {
                return self.invalidate(&session_id, None, &e.to_string()).await;
            }
            Err(e) => return Err(e),
        };
        if payload.is_empty() {
            return Err(SessionError::MetadataMissing {
                session_id: session_id.to_string(),
            });
        }

        let record = SessionRecord::decode(&session_id, &payload)?;
        let Some(mut metadata) = record.metadata else {
            return Err(SessionError::MetadataMissing {
                session_id: session_id.to_string(),
            });
        };

        let fingerprint_valid = fingerprints_match(&metadata.fingerprint, &fingerprint);
        if !fingerprint_valid {
            tracing::warn!(
                session_id = %session_id,
                stored_fingerprint = %metadata.fingerprint,
                computed_fingerprint = %fingerprint,
                "Session fingerprint mismatch"
            );
            return self
                .invalidate(
                    &session_id,
                    Some(&metadata),
                    &SessionError::FingerprintMismatch.to_string(),
                )
                .await;
        }

        if !metadata.is_active {
            return match (&metadata.forward_to_session_id, metadata.expire_data_at) {
                (Some(target), Some(expire_at)) if now < expire_at => {
                    let target = target.clone();
                    self.forward(session_id, &metadata, target, now, fingerprint)
                        .await
                }
                _ => {
                    self.invalidate(&session_id, Some(&metadata), "rotated identifier expired")
                        .await
                }
            };
        }

        self.session_id = Some(session_id.clone());
        self.data = record.data;

        if self.rotation_due(&metadata, now) {
            self.metadata = Some(metadata);
            self.regenerate_id().await?;
            return Ok(SessionStart::Rotated {
                previous: session_id,
            });
        }

        metadata.session_start_count = metadata.session_start_count.saturating_add(1);
        tracing::debug!(
            session_id = %session_id,
            session_start_count = metadata.session_start_count,
            "Continued session"
        );
        self.metadata = Some(metadata);
        self.write_record().await?;
        Ok(SessionStart::Continued)
    }

    /// The identifier from the session cookie, if well-formed and known to
    /// the store. Anything else is never adopted.
    async fn presented_session_id(&self) -> Result<Option<SessionId>> {
        let Some(value) = self.cookies.get(&self.config.session_name)? else {
            return Ok(None);
        };
        let Ok(session_id) = SessionId::parse(&value) else {
            tracing::debug!("Ignoring malformed session ID");
            return Ok(None);
        };
        if self.handler.validate_id(&session_id).await? {
            Ok(Some(session_id))
        } else {
            tracing::debug!(session_id = %session_id, "Ignoring unrecognized session ID");
            Ok(None)
        }
    }

    fn initialize(
        &mut self,
        session_id: SessionId,
        now: DateTime<Utc>,
        fingerprint: String,
    ) -> SessionStart {
        tracing::debug!(session_id = %session_id, "Initialized new session");
        self.metadata = Some(SessionMetadata::new(
            now,
            fingerprint,
            self.config.regen_interval(),
        ));
        self.data = SessionData::new();
        self.session_id = Some(session_id);
        SessionStart::Initialized
    }

    /// Move a request on a rotated identifier to its live successor.
    ///
    /// Only one hop is taken: a target that is gone, empty or itself rotated
    /// invalidates the presented identifier.
    async fn forward(
        &mut self,
        from: SessionId,
        from_metadata: &SessionMetadata,
        target: SessionId,
        now: DateTime<Utc>,
        fingerprint: String,
    ) -> Result<SessionStart> {
        if !self.handler.validate_id(&target).await? {
            return self
                .invalidate(&from, Some(from_metadata), "forward target no longer exists")
                .await;
        }

        // Key material has to follow before the target can be decrypted.
        self.callbacks.notify_id_change(&from, &target);

        let payload = match self.handler.read(&target).await {
            Ok(payload) => payload,
            Err(e) if e.invalidates_session() => {
                return self.invalidate(&from, Some(from_metadata), &e.to_string()).await;
            }
            Err(e) => return Err(e),
        };
        if payload.is_empty() {
            return self
                .invalidate(&from, Some(from_metadata), "forward target has no data")
                .await;
        }

        let record = SessionRecord::decode(&target, &payload)?;
        let Some(target_metadata) = record.metadata else {
            return Err(SessionError::MetadataMissing {
                session_id: target.to_string(),
            });
        };
        if !target_metadata.is_active {
            return self
                .invalidate(&from, Some(from_metadata), "forward target was rotated again")
                .await;
        }

        tracing::info!(
            session_id = %from,
            forward_to_session_id = %target,
            "Forwarding rotated session"
        );
        self.set_session_cookie(&target)?;

        self.session_id = Some(target);
        self.data = record.data;
        self.metadata = Some(SessionMetadata::new(
            now,
            fingerprint,
            self.config.regen_interval(),
        ));
        self.write_record().await?;
        Ok(SessionStart::Forwarded { from })
    }

    /// Thresholds configured as zero never fire.
    fn rotation_due(&self, metadata: &SessionMetadata, now: DateTime<Utc>) -> bool {
        let time_due = self.config.regen_interval().is_some()
            && metadata.regenerate_id_at.is_some_and(|due_at| now >= due_at);
        let count_due = self
            .config
            .regen_count()
            .is_some_and(|threshold| metadata.session_start_count >= threshold);
        time_due || count_due
    }

    async fn invalidate(
        &mut self,
        session_id: &SessionId,
        metadata: Option<&SessionMetadata>,
        reason: &str,
    ) -> Result<SessionStart> {
        self.reset();
        self.handler.destroy(session_id).await?;
        self.callbacks.notify_gc(session_id, self.clock.now());

        tracing::warn!(
            session_id = %session_id,
            reason,
            metadata = %metadata.map_or_else(|| "<unavailable>".to_string(), SessionMetadata::to_json_pretty),
            "Invalidated untrustworthy session"
        );

        self.release().await?;
        Ok(SessionStart::Invalidated)
    }

    /// Replace the live identifier, keeping all session data.
    ///
    /// The old identifier keeps forwarding to the new one for the configured
    /// post-rotation TTL. Callback failures are logged and do not abort the
    /// rotation.
    ///
    /// # Returns
    ///
    /// The new identifier.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - No session is started → [`SessionError::NotStarted`]
    /// - The store fails to persist either record → [`SessionError::Storage`]
    pub async fn regenerate_id(&mut self) -> Result<SessionId> {
        let old_id = self.started_id()?.clone();
        let now = self.clock.now();
        let new_id = self.handler.create_id().await?;
        let expire_data_at = now
            .checked_add_signed(self.config.ttl_after_id_regen())
            .ok_or_else(|| {
                SessionError::InternalError("Forwarding expiry out of range".to_string())
            })?;

        let mut old_metadata = self.metadata.clone().unwrap_or_else(|| {
            SessionMetadata::new(now, self.signals.fingerprint(), self.config.regen_interval())
        });
        old_metadata.is_active = false;
        old_metadata.expire_data_at = Some(expire_data_at);
        old_metadata.forward_to_session_id = Some(new_id.clone());
        let old_record = SessionRecord::encode(&self.data, Some(&old_metadata))?;
        self.handler.write(&old_id, &old_record).await?;
        self.callbacks.notify_gc(&old_id, expire_data_at);

        self.session_id = Some(new_id.clone());
        self.set_session_cookie(&new_id)?;
        self.callbacks.notify_id_change(&old_id, &new_id);

        self.metadata = Some(SessionMetadata::new(
            now,
            self.signals.fingerprint(),
            self.config.regen_interval(),
        ));
        self.write_record().await?;

        tracing::info!(
            old_session_id = %old_id,
            new_session_id = %new_id,
            expire_data_at = %expire_data_at,
            "Rotated session ID"
        );
        Ok(new_id)
    }

    /// Destroy the session: clear data, delete the record, notify GC and
    /// release the store.
    ///
    /// The session cookie is left in place; the identifier it carries is no
    /// longer recognized and will never be adopted again.
    ///
    /// # Errors
    ///
    /// Returns error if no session is started or the store fails.
    pub async fn destroy_session(&mut self) -> Result<()> {
        let session_id = self.started_id()?.clone();
        self.reset();
        self.handler.destroy(&session_id).await?;
        self.callbacks.notify_gc(&session_id, self.clock.now());

        tracing::debug!(session_id = %session_id, "Destroyed session");
        self.release().await
    }

    /// Persist the session and release the store.
    ///
    /// A no-op if no session is started.
    ///
    /// # Errors
    ///
    /// Returns error if the write is not confirmed.
    pub async fn commit_session(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        if self.session_id.is_some() {
            self.write_record().await?;
        }
        self.release().await
    }

    async fn write_record(&self) -> Result<()> {
        let session_id = self.started_id()?;
        let record = SessionRecord::encode(&self.data, self.metadata.as_ref())?;
        self.handler
            .write(session_id, &record)
            .await
            .inspect_err(|e| tracing::error!(session_id = %session_id, error = %e, "Failed to write session"))
    }

    async fn release(&mut self) -> Result<()> {
        self.open = false;
        self.handler.close().await
    }

    fn reset(&mut self) {
        self.session_id = None;
        self.metadata = None;
        self.data.clear();
    }

    fn set_session_cookie(&self, session_id: &SessionId) -> Result<()> {
        self.cookies
            .set(&self.config.session_name, session_id.as_str(), &self.cookie_config)
    }

    fn started_id(&self) -> Result<&SessionId> {
        match &self.session_id {
            Some(session_id) if self.open => Ok(session_id),
            _ => Err(SessionError::NotStarted),
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════

    /// Live session identifier, if a session is started.
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.started_id().ok()
    }

    /// Live metadata, if a session is started.
    #[must_use]
    pub fn metadata(&self) -> Option<&SessionMetadata> {
        self.started_id().ok().and(self.metadata.as_ref())
    }

    /// Whether a session is started and not yet committed or destroyed.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started_id().is_ok()
    }

    /// The request's cookie jar.
    #[must_use]
    pub const fn cookies(&self) -> &SharedCookieJar {
        &self.cookies
    }

    /// Storage backend.
    #[must_use]
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// Read a typed session value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotStarted`] if no session is started, or a
    /// serialization error if the value has a different type.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.started_id()?;
        self.data.get(key)
    }

    /// Store a typed session value, returning whether one was replaced.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotStarted`] if no session is started, or
    /// [`SessionError::ReservedKey`] for the metadata key.
    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<bool> {
        self.started_id()?;
        self.data.insert(key, value)
    }

    /// Remove a session value, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotStarted`] if no session is started.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        self.started_id()?;
        Ok(self.data.remove(key).is_some())
    }

    /// Remove all application data (metadata is kept).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotStarted`] if no session is started.
    pub fn clear(&mut self) -> Result<()> {
        self.started_id()?;
        self.data.clear();
        Ok(())
    }

    /// Application data of the started session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotStarted`] if no session is started.
    pub fn data(&self) -> Result<&SessionData> {
        self.started_id()?;
        Ok(&self.data)
    }
}

impl<H, C> std::fmt::Debug for SessionManager<H, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("session_id", &self.session_id)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}
