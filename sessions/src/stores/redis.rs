//! Redis-based session handler.
//!
//! # Architecture
//!
//! Records are stored in Redis with:
//! - **Key**: `session:{session_id}` → raw (possibly encrypted) record bytes
//! - **TTL**: every write refreshes the expiry to the configured maximum
//!   lifetime, so Redis performs garbage collection itself
//!
//! # Example
//!
//! ```no_run
//! use hardened_sessions::stores::RedisSessionHandler;
//! use chrono::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handler = RedisSessionHandler::new("redis://127.0.0.1:6379", Duration::hours(24)).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SessionError};
use crate::providers::SessionHandler;
use crate::state::SessionId;
use chrono::Duration;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

/// Maximum attempts to find an unused identifier.
const MAX_CREATE_ID_ATTEMPTS: usize = 8;

/// Redis-based session handler with TTL-based expiration.
#[derive(Clone)]
pub struct RedisSessionHandler {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,

    /// Expiry applied on every write.
    max_lifetime: Duration,
}

impl RedisSessionHandler {
    /// Create a new Redis session handler.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    /// * `max_lifetime` - Expiry applied to each record on write
    ///
    /// # Errors
    ///
    /// Returns error if connection to Redis fails or `max_lifetime` is not
    /// positive.
    pub async fn new(redis_url: &str, max_lifetime: Duration) -> Result<Self> {
        if max_lifetime <= Duration::zero() {
            return Err(SessionError::Configuration {
                field: "max_lifetime",
                reason: "must be positive".to_string(),
            });
        }

        let client = Client::open(redis_url)
            .map_err(|e| SessionError::Storage(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            SessionError::Storage(format!("Failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self {
            conn_manager,
            max_lifetime,
        })
    }

    /// Get the Redis key for a session.
    fn session_key(session_id: &SessionId) -> String {
        format!("session:{session_id}")
    }

    #[allow(clippy::cast_sign_loss)]
    fn ttl_seconds(&self) -> u64 {
        self.max_lifetime.num_seconds().max(1) as u64
    }
}

impl SessionHandler for RedisSessionHandler {
    async fn open(&self, _scope: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await.map_err(|e| {
            tracing::error!(error = %e, "Redis session store unreachable");
            SessionError::Storage(format!("Failed to open Redis session store: {e}"))
        })?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn read(&self, session_id: &SessionId) -> Result<Vec<u8>> {
        let mut conn = self.conn_manager.clone();
        let bytes: Option<Vec<u8>> = conn
            .get(Self::session_key(session_id))
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to read session from Redis: {e}")))?;
        Ok(bytes.unwrap_or_default())
    }

    async fn write(&self, session_id: &SessionId, data: &[u8]) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let ttl_seconds = self.ttl_seconds();
        let _: () = conn
            .set_ex(Self::session_key(session_id), data, ttl_seconds)
            .await
            .map_err(|e| {
                tracing::error!(session_id = %session_id, error = %e, "Redis session write failed");
                SessionError::Storage(format!("Failed to write session to Redis: {e}"))
            })?;

        tracing::debug!(session_id = %session_id, ttl_seconds, "Wrote session to Redis");
        Ok(())
    }

    async fn destroy(&self, session_id: &SessionId) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .del(Self::session_key(session_id))
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to delete session from Redis: {e}")))?;
        Ok(())
    }

    async fn gc(&self, _max_lifetime: Duration) -> Result<usize> {
        // Expiry is enforced by the TTL set on every write.
        Ok(0)
    }

    async fn validate_id(&self, session_id: &SessionId) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        conn.exists(Self::session_key(session_id))
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to check session existence: {e}")))
    }

    async fn create_id(&self) -> Result<SessionId> {
        for _ in 0..MAX_CREATE_ID_ATTEMPTS {
            let candidate = SessionId::generate();
            if !self.validate_id(&candidate).await? {
                return Ok(candidate);
            }
            tracing::warn!("Generated session ID already exists in Redis, retrying");
        }
        Err(SessionError::Storage(
            "Failed to generate an unused session ID".to_string(),
        ))
    }
}
