//! Session state types.
//!
//! This module defines the identifier, the security metadata record, and the
//! application data map, plus the codec used to persist them together as one
//! store record.

use crate::error::{Result, SessionError};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved key under which [`SessionMetadata`] is embedded in stored data.
pub const METADATA_KEY: &str = "__session_metadata";

/// Number of characters in a session identifier.
pub const SESSION_ID_LENGTH: usize = 48;

/// Identifier alphabet: base32hex, 5 bits per character.
const SESSION_ID_ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Opaque session identifier transported in the session cookie.
///
/// Always 48 characters from `[0-9a-v]` (240 bits of entropy). Values can
/// only be obtained through [`SessionId::generate`] or [`SessionId::parse`],
/// so a malformed identifier never reaches a store or a cookie name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new cryptographically secure random `SessionId`.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = OsRng;
        let id = (0..SESSION_ID_LENGTH)
            .map(|_| char::from(SESSION_ID_ALPHABET[rng.gen_range(0..SESSION_ID_ALPHABET.len())]))
            .collect();
        Self(id)
    }

    /// Parse and validate an identifier presented by a client.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidSessionId`] if the value is not exactly
    /// 48 characters from `[0-9a-v]`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use hardened_sessions::SessionId;
    /// let id = SessionId::generate();
    /// assert_eq!(SessionId::parse(id.as_str()).unwrap(), id);
    /// assert!(SessionId::parse("not-a-session-id").is_err());
    /// ```
    pub fn parse(value: &str) -> Result<Self> {
        let well_formed = value.len() == SESSION_ID_LENGTH
            && value.bytes().all(|b| SESSION_ID_ALPHABET.contains(&b));
        if well_formed {
            Ok(Self(value.to_string()))
        } else {
            Err(SessionError::InvalidSessionId)
        }
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Metadata
// ═══════════════════════════════════════════════════════════════════════

/// Security bookkeeping persisted alongside application data.
///
/// A new instance is created for every identifier; the fingerprint is
/// compared on each start and never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Creation time of this instance.
    pub instantiated_at: DateTime<Utc>,

    /// When a time-based rotation becomes due (`None` = disabled).
    pub regenerate_id_at: Option<DateTime<Utc>>,

    /// Starts since the last rotation (always ≥ 1).
    pub session_start_count: u32,

    /// `true` while this identifier is the live one for the session.
    pub is_active: bool,

    /// After rotation, the instant this identifier's data stops being readable.
    pub expire_data_at: Option<DateTime<Utc>>,

    /// After rotation, the identifier clients are forwarded to.
    pub forward_to_session_id: Option<SessionId>,

    /// Client fingerprint captured when this instance was created.
    pub fingerprint: String,
}

impl SessionMetadata {
    /// Create metadata for a freshly started (or freshly rotated) identifier.
    #[must_use]
    pub fn new(now: DateTime<Utc>, fingerprint: String, regen_interval: Option<Duration>) -> Self {
        Self {
            instantiated_at: now,
            regenerate_id_at: regen_interval
                .and_then(|interval| now.checked_add_signed(interval)),
            fingerprint,
            ..Self::at(now)
        }
    }

    /// Bare metadata: one start, active, nothing scheduled, no fingerprint.
    #[must_use]
    pub const fn at(now: DateTime<Utc>) -> Self {
        Self {
            instantiated_at: now,
            regenerate_id_at: None,
            session_start_count: 1,
            is_active: true,
            expire_data_at: None,
            forward_to_session_id: None,
            fingerprint: String::new(),
        }
    }

    /// Pretty-printed JSON dump used in forensic log events.
    #[must_use]
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("<unserializable: {e}>"))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Application data
// ═══════════════════════════════════════════════════════════════════════

/// Application-level session data: string keys to JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData(BTreeMap<String, serde_json::Value>);

impl SessionData {
    /// Create an empty data map.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Get a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SerializationError`] if the stored value does
    /// not deserialize into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.0
            .get(key)
            .map(|value| {
                serde_json::from_value(value.clone())
                    .map_err(|e| SessionError::SerializationError(e.to_string()))
            })
            .transpose()
    }

    /// Insert a typed value, returning whether a previous value was replaced.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `key` is the reserved metadata key → [`SessionError::ReservedKey`]
    /// - `value` cannot be serialized
    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<bool> {
        let key = key.into();
        if key == METADATA_KEY {
            return Err(SessionError::ReservedKey(key));
        }
        let value = serde_json::to_value(value)
            .map_err(|e| SessionError::SerializationError(e.to_string()))?;
        Ok(self.0.insert(key, value).is_some())
    }

    /// Remove a value, returning the raw JSON if it existed.
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.0.remove(key)
    }

    /// Whether a value is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Record codec
// ═══════════════════════════════════════════════════════════════════════

/// Decoded contents of a store record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRecord {
    /// Application data (never contains [`METADATA_KEY`]).
    pub data: SessionData,

    /// Security metadata, if the record carried any.
    pub metadata: Option<SessionMetadata>,
}

impl SessionRecord {
    /// Encode data and metadata into one JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SerializationError`] if encoding fails.
    pub fn encode(data: &SessionData, metadata: Option<&SessionMetadata>) -> Result<Vec<u8>> {
        let mut object = data.0.clone();
        if let Some(metadata) = metadata {
            let value = serde_json::to_value(metadata)
                .map_err(|e| SessionError::SerializationError(e.to_string()))?;
            object.insert(METADATA_KEY.to_string(), value);
        }
        serde_json::to_vec(&object).map_err(|e| SessionError::SerializationError(e.to_string()))
    }

    /// Decode a store record. Empty bytes decode to an empty record.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The record is not a JSON object → [`SessionError::SerializationError`]
    /// - The metadata entry is present but malformed → [`SessionError::MetadataCorrupt`]
    pub fn decode(session_id: &SessionId, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        let mut object: BTreeMap<String, serde_json::Value> = serde_json::from_slice(bytes)
            .map_err(|e| SessionError::SerializationError(e.to_string()))?;
        let metadata = object
            .remove(METADATA_KEY)
            .map(|value| {
                serde_json::from_value(value).map_err(|e| SessionError::MetadataCorrupt {
                    session_id: session_id.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        Ok(Self {
            data: SessionData(object),
            metadata,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_well_formed_and_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_eq!(a.as_str().len(), SESSION_ID_LENGTH);
        assert!(SessionId::parse(a.as_str()).is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_rejects_malformed_ids() {
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse(&"w".repeat(SESSION_ID_LENGTH)).is_err());
        assert!(SessionId::parse(&"A".repeat(SESSION_ID_LENGTH)).is_err());
        assert!(SessionId::parse(&"a".repeat(SESSION_ID_LENGTH - 1)).is_err());
        // Legacy 64-hex identifiers are not accepted.
        assert!(SessionId::parse(&"f".repeat(64)).is_err());
    }

    #[test]
    fn test_session_id_deserialize_validates() {
        let err = serde_json::from_str::<SessionId>(r#""../../etc/passwd""#);
        assert!(err.is_err());
    }

    #[test]
    fn test_default_metadata() {
        let now = Utc::now();
        let metadata = SessionMetadata::at(now);
        assert_eq!(metadata.instantiated_at, now);
        assert_eq!(metadata.regenerate_id_at, None);
        assert_eq!(metadata.session_start_count, 1);
        assert!(metadata.is_active);
        assert_eq!(metadata.expire_data_at, None);
        assert_eq!(metadata.forward_to_session_id, None);
        assert_eq!(metadata.fingerprint, "");
    }

    #[test]
    fn test_metadata_schedules_rotation() {
        let now = Utc::now();
        let metadata = SessionMetadata::new(now, "fp".to_string(), Some(Duration::minutes(15)));
        assert_eq!(metadata.regenerate_id_at, Some(now + Duration::minutes(15)));

        let metadata = SessionMetadata::new(now, "fp".to_string(), None);
        assert_eq!(metadata.regenerate_id_at, None);
    }

    #[test]
    fn test_metadata_json_dump_round_trips() {
        let metadata = SessionMetadata::new(Utc::now(), "abc".to_string(), None);
        let json = metadata.to_json_pretty();
        let parsed: SessionMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, metadata);
    }

    #[test]
    fn test_data_rejects_reserved_key() {
        let mut data = SessionData::new();
        let err = data.insert(METADATA_KEY, 1).unwrap_err();
        assert_eq!(err, SessionError::ReservedKey(METADATA_KEY.to_string()));
    }

    #[test]
    fn test_record_embeds_metadata_under_reserved_key() {
        let id = SessionId::generate();
        let mut data = SessionData::new();
        data.insert("user", "alice").unwrap();
        let metadata = SessionMetadata::new(Utc::now(), "fp".to_string(), None);

        let bytes = SessionRecord::encode(&data, Some(&metadata)).unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(raw.get(METADATA_KEY).is_some());

        let record = SessionRecord::decode(&id, &bytes).unwrap();
        assert_eq!(record.data.get::<String>("user").unwrap().as_deref(), Some("alice"));
        assert!(!record.data.contains_key(METADATA_KEY));
        assert_eq!(record.metadata, Some(metadata));
    }

    #[test]
    fn test_empty_record_decodes_to_fresh() {
        let id = SessionId::generate();
        let record = SessionRecord::decode(&id, b"").unwrap();
        assert!(record.data.is_empty());
        assert!(record.metadata.is_none());
    }

    #[test]
    fn test_corrupt_metadata_is_reported() {
        let id = SessionId::generate();
        let bytes = format!(r#"{{"{METADATA_KEY}": ""}}"#);
        let err = SessionRecord::decode(&id, bytes.as_bytes()).unwrap_err();
        assert!(matches!(err, SessionError::MetadataCorrupt { .. }));
    }
}
