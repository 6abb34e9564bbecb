//! Per-session encryption keys.
//!
//! Every session identifier owns one AES-256-GCM key. The key lives with the
//! client in an `HttpOnly` cookie named `{key_cookie_prefix}{session_id}` so
//! that a stolen store record alone cannot be decrypted.
//!
//! # Key lifecycle
//!
//! ```text
//! first write ──► generate ──► cookie `prefix+id`
//! later request ─► recover from cookie (cached for the request)
//! ID rotation ──► same key material moves to cookie `prefix+new_id`
//! destroy ──────► cookie expired
//! ```
//!
//! # Payload format
//!
//! `[nonce (12 bytes)][ciphertext + tag (variable)]`

use crate::config::SessionHandlerConfig;
use crate::cookies::SharedCookieJar;
use crate::error::{Result, SessionError};
use crate::state::SessionId;
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_FORMAT_VERSION: u8 = 1;
const CHECKSUM_LEN: usize = 4;

/// Symmetric key bound to one session identifier.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    /// Generate a new random key from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Serialize to a cookie-safe string: base64url of version, key, checksum.
    #[must_use]
    pub fn to_ascii_safe(&self) -> String {
        let mut raw = Vec::with_capacity(1 + KEY_LEN + CHECKSUM_LEN);
        raw.push(KEY_FORMAT_VERSION);
        raw.extend_from_slice(&self.0);
        let checksum = Sha256::digest(&raw);
        raw.extend_from_slice(&checksum[..CHECKSUM_LEN]);
        let encoded = URL_SAFE_NO_PAD.encode(&raw);
        raw.zeroize();
        encoded
    }

    /// Load a key previously produced by [`SessionKey::to_ascii_safe`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::KeyFormat`] if the value is not base64url, has
    /// the wrong length or version, or fails its checksum.
    pub fn from_ascii_safe(value: &str) -> Result<Self> {
        let mut raw = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|e| SessionError::KeyFormat { reason: e.to_string() })?;
        let result = Self::from_raw(&raw);
        raw.zeroize();
        result
    }

    fn from_raw(raw: &[u8]) -> Result<Self> {
        if raw.len() != 1 + KEY_LEN + CHECKSUM_LEN {
            return Err(SessionError::KeyFormat {
                reason: format!("expected {} bytes, got {}", 1 + KEY_LEN + CHECKSUM_LEN, raw.len()),
            });
        }
        if raw[0] != KEY_FORMAT_VERSION {
            return Err(SessionError::KeyFormat {
                reason: format!("unsupported key version {}", raw[0]),
            });
        }
        let (body, checksum) = raw.split_at(1 + KEY_LEN);
        let expected = Sha256::digest(body);
        if !constant_time_eq::constant_time_eq(checksum, &expected[..CHECKSUM_LEN]) {
            return Err(SessionError::KeyFormat {
                reason: "checksum mismatch".to_string(),
            });
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&body[1..]);
        Ok(Self(bytes))
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.0).map_err(|e| {
            SessionError::InternalError(format!("Failed to initialize AES-256-GCM cipher: {e}"))
        })
    }

    /// Encrypt with a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Encryption`] if the cipher fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()?
            .encrypt(&nonce, plaintext)
            .map_err(|_| SessionError::Encryption)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(payload)
    }

    /// Decrypt a `[nonce][ciphertext]` payload.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Decryption`] if the payload is truncated, was
    /// modified, or was encrypted under a different key.
    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < NONCE_LEN + TAG_LEN {
            return Err(SessionError::Decryption {
                reason: "payload too short".to_string(),
            });
        }
        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        self.cipher()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SessionError::Decryption {
                reason: "wrong key or modified ciphertext".to_string(),
            })
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// Owns creation, lookup, persistence and rotation of per-session keys.
///
/// One manager serves one request: it shares that request's
/// [`SharedCookieJar`] with the session manager and caches resolved keys for
/// the request's duration.
pub struct EncryptionKeyManager {
    config: SessionHandlerConfig,
    cookies: SharedCookieJar,
    keys: Mutex<HashMap<SessionId, SessionKey>>,
}

impl EncryptionKeyManager {
    /// Create a key manager for one request.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if the handler configuration
    /// is invalid.
    pub fn new(config: SessionHandlerConfig, cookies: SharedCookieJar) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cookies,
            keys: Mutex::new(HashMap::new()),
        })
    }

    /// Handler configuration this manager was built with.
    #[must_use]
    pub const fn config(&self) -> &SessionHandlerConfig {
        &self.config
    }

    /// Name of the cookie carrying the key for `session_id`.
    #[must_use]
    pub fn key_cookie_name(&self, session_id: &SessionId) -> String {
        format!("{}{}", self.config.key_cookie_prefix, session_id)
    }

    fn cache(&self) -> Result<MutexGuard<'_, HashMap<SessionId, SessionKey>>> {
        self.keys
            .lock()
            .map_err(|_| SessionError::InternalError("Mutex lock failed".to_string()))
    }

    /// Resolve the key for `session_id`: cache, then cookie, then a new key.
    ///
    /// A newly generated key is written to its key cookie immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::KeyFormat`] if the key cookie holds malformed
    /// key material.
    pub fn get_or_create_key(&self, session_id: &SessionId) -> Result<SessionKey> {
        if let Some(key) = self.cache()?.get(session_id) {
            return Ok(key.clone());
        }

        let cookie_name = self.key_cookie_name(session_id);
        let key = match self.cookies.get(&cookie_name)?.filter(|v| !v.is_empty()) {
            Some(ascii) => SessionKey::from_ascii_safe(&ascii)?,
            None => {
                let key = SessionKey::generate();
                self.set_key_cookie(session_id, &key.to_ascii_safe())?;
                tracing::debug!(session_id = %session_id, "Generated session encryption key");
                key
            }
        };

        self.cache()?.insert(session_id.clone(), key.clone());
        Ok(key)
    }

    /// Write serialized key material to the key cookie for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::KeyFormat`] if `ascii_key` is empty.
    pub fn set_key_cookie(&self, session_id: &SessionId, ascii_key: &str) -> Result<()> {
        if ascii_key.is_empty() {
            return Err(SessionError::KeyFormat {
                reason: "serialized key must be non-empty".to_string(),
            });
        }
        self.cookies
            .set(&self.key_cookie_name(session_id), ascii_key, &self.config.cookie)
    }

    /// Expire the key cookie for `session_id` and forget its cached key.
    ///
    /// # Errors
    ///
    /// Returns error if a lock is poisoned.
    pub fn delete_key(&self, session_id: &SessionId) -> Result<()> {
        self.cache()?.remove(session_id);
        self.cookies
            .expire(&self.key_cookie_name(session_id), &self.config.cookie)
    }

    /// Move the key of `old_id` to `new_id`.
    ///
    /// The old key cookie is expired and the same key material is written
    /// under the new identifier's cookie name.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::KeyFormat`] if the old key cookie is malformed.
    pub fn change_key_identifier(&self, old_id: &SessionId, new_id: &SessionId) -> Result<()> {
        let key = self.get_or_create_key(old_id)?;
        self.delete_key(old_id)?;
        self.set_key_cookie(new_id, &key.to_ascii_safe())?;
        self.cache()?.insert(new_id.clone(), key);

        tracing::debug!(
            old_session_id = %old_id,
            new_session_id = %new_id,
            "Moved session encryption key to new identifier"
        );
        Ok(())
    }

    /// Encrypt a session payload under `session_id`'s key.
    ///
    /// # Errors
    ///
    /// Returns error if the key cannot be resolved or encryption fails.
    pub fn encrypt(&self, session_id: &SessionId, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.get_or_create_key(session_id)?.encrypt(plaintext)
    }

    /// Decrypt a session payload under `session_id`'s key.
    ///
    /// An empty payload (never-written session) is returned unchanged
    /// without touching keys.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Decryption`] or [`SessionError::KeyFormat`]
    /// if the payload cannot be authenticated.
    pub fn decrypt(&self, session_id: &SessionId, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.is_empty() {
            return Ok(Vec::new());
        }
        self.get_or_create_key(session_id)?.decrypt(ciphertext)
    }
}

impl fmt::Debug for EncryptionKeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKeyManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
