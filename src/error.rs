//! Error types for the shardkv crate.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when server or cache configuration is invalid
//!   (e.g. zero or oversized capacity, zero TTL, a malformed config line, a shard index out
//!   of range). Always fatal at startup.
//! - [`InvariantError`]: Returned by `check_invariants` methods when an
//!   internal data-structure invariant is violated (a key present in two
//!   queues, a dangling index handle, ...).
//!
//! A cache miss is never an error: lookups return `Option`.
//!
//! ## Example Usage
//!
//! ```
//! use shardkv::config::ServerConfig;
//! use shardkv::error::ConfigError;
//!
//! let err = ServerConfig::parse_str("capacity=0").unwrap_err();
//! assert!(matches!(err, ConfigError::ZeroCapacity));
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when configuration parameters are invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Capacity was configured as zero.
    #[error("capacity must be > 0")]
    ZeroCapacity,

    /// Capacity exceeds the largest entry budget a server accepts.
    #[error("capacity {capacity} exceeds the maximum of {max}")]
    CapacityTooLarge { capacity: usize, max: usize },

    /// TTL was configured as zero seconds.
    #[error("ttl must be > 0 seconds")]
    ZeroTtl,

    /// A policy name that is not one of `lru|lfu|arc|2q|random`.
    #[error("unknown eviction policy: {0}")]
    UnknownPolicy(String),

    /// A config value failed to parse.
    #[error("invalid value for `{key}`: {value:?}")]
    InvalidValue { key: String, value: String },

    /// The requested shard index is not present in the shard list.
    #[error("shard index {index} out of range ({count} shards configured)")]
    ShardOutOfRange { index: usize, count: usize },

    /// Reading the config file failed.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache invariants are violated.
///
/// Produced by `check_invariants` methods on the policies and the hash table.
/// Carries a human-readable description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Returns `Err(InvariantError)` with `msg` unless `cond` holds.
#[inline]
pub(crate) fn ensure(cond: bool, msg: impl FnOnce() -> String) -> Result<(), InvariantError> {
    if cond {
        Ok(())
    } else {
        Err(InvariantError::new(msg()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- InvariantError ---------------------------------------------------

    #[test]
    fn invariant_display_shows_message() {
        let err = InvariantError::new("queue length mismatch");
        assert_eq!(err.to_string(), "queue length mismatch");
        assert_eq!(err.message(), "queue length mismatch");
    }

    #[test]
    fn ensure_passes_and_fails() {
        assert!(ensure(true, || "unused".into()).is_ok());
        let err = ensure(false, || "key in two queues".into()).unwrap_err();
        assert_eq!(err.message(), "key in two queues");
    }

    // -- ConfigError ------------------------------------------------------

    #[test]
    fn config_display_shows_field() {
        assert_eq!(ConfigError::ZeroCapacity.to_string(), "capacity must be > 0");
        let err = ConfigError::InvalidValue {
            key: "ttl".into(),
            value: "abc".into(),
        };
        assert!(err.to_string().contains("ttl"));
    }

    #[test]
    fn config_io_keeps_source() {
        use std::error::Error as _;
        let err = ConfigError::Io {
            path: PathBuf::from("missing.cfg"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("missing.cfg"));
    }
}
