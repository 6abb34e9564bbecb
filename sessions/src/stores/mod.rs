//! Session handler implementations.
//!
//! - **Memory** - process-local records, timestamp-based GC
//! - **Redis** - shared records with TTL-based expiration
//! - **Encrypting** - wraps either backend with per-session AES-256-GCM

pub mod encrypted;
pub mod memory;
pub mod redis;

// Re-exports
pub use encrypted::EncryptingSessionHandler;
pub use memory::MemorySessionHandler;
pub use self::redis::RedisSessionHandler;
