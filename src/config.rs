//! Server configuration.
//!
//! The config file is a flat list of `key=value` lines. Lines without `=`,
//! blank lines and lines starting with `#` are ignored; keys and values are
//! trimmed. Later lines override earlier ones.
//!
//! | Key                    | Meaning                                  | Default |
//! |------------------------|------------------------------------------|---------|
//! | `capacity`             | entry budget of the policy               | 1000    |
//! | `ttl`                  | entry time-to-live in seconds            | 36000   |
//! | `algo` / `policy`      | `lru`, `lfu`, `arc`, `2q`, `random`      | `lru`   |
//! | `shard0` .. `shardN`   | shard addresses, read until the first gap| -       |
//! | `reclaim_interval_ms`  | pause between reclamation cycles         | 3000    |
//! | `reclaim_max_attempts` | eviction bound per cycle                 | 4000    |
//! | `memory_limit_kib`     | switch the budget to resident memory     | -       |
//!
//! An unknown policy name falls back to `lru` with a warning; every other
//! malformed value is a [`ConfigError`].
//!
//! ```
//! use std::time::Duration;
//! use shardkv::builder::PolicyKind;
//! use shardkv::config::ServerConfig;
//!
//! let config = ServerConfig::parse_str(
//!     "capacity=64\nttl=5\nalgo=2q\nshard0=127.0.0.1:7001\nshard1=127.0.0.1:7002\n",
//! )
//! .unwrap();
//! assert_eq!(config.capacity, 64);
//! assert_eq!(config.ttl, Duration::from_secs(5));
//! assert_eq!(config.policy, PolicyKind::TwoQ);
//! assert_eq!(config.router(1).unwrap().local_addr(), "127.0.0.1:7002");
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::builder::{CacheBuilder, DEFAULT_TTL, PolicyKind};
use crate::ds::ShardRouter;
use crate::error::{ConfigError, ConfigResult};
use crate::storage::{BudgetTrigger, ReclaimConfig, StorageGateway};

/// Entry budget used when `capacity` is absent.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Largest accepted `capacity`.
pub const MAX_CAPACITY: usize = u32::MAX as usize;

/// Parsed and validated server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub capacity: usize,
    pub ttl: Duration,
    pub policy: PolicyKind,
    /// Shard addresses indexed by shard number.
    pub shards: Vec<String>,
    pub reclaim: ReclaimConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: DEFAULT_TTL,
            policy: PolicyKind::default(),
            shards: Vec::new(),
            reclaim: ReclaimConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads and parses the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse_str(&text)?;
        debug!(path = %path.display(), ?config, "configuration loaded");
        Ok(config)
    }

    /// Parses `key=value` lines and validates the result.
    pub fn parse_str(text: &str) -> ConfigResult<Self> {
        let entries: HashMap<&str, &str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim(), value.trim()))
            .collect();

        let mut config = Self::default();
        if let Some(value) = entries.get("capacity") {
            config.capacity = parse_value("capacity", value)?;
        }
        if let Some(value) = entries.get("ttl") {
            config.ttl = Duration::from_secs(parse_value("ttl", value)?);
        }
        if let Some(value) = entries.get("policy").or_else(|| entries.get("algo")) {
            config.policy = PolicyKind::parse_lenient(value);
        }
        config.shards = (0..)
            .map_while(|i| entries.get(format!("shard{i}").as_str()))
            .map(|addr| addr.to_string())
            .collect();

        if let Some(value) = entries.get("reclaim_interval_ms") {
            config.reclaim.interval = Duration::from_millis(parse_value("reclaim_interval_ms", value)?);
        }
        if let Some(value) = entries.get("reclaim_max_attempts") {
            config.reclaim.max_attempts = parse_value("reclaim_max_attempts", value)?;
        }
        if let Some(value) = entries.get("memory_limit_kib") {
            config.reclaim.trigger = BudgetTrigger::Memory {
                max_rss_kib: parse_value("memory_limit_kib", value)?,
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects a zero or oversized capacity, a zero TTL and a zero
    /// reclamation interval.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.capacity > MAX_CAPACITY {
            return Err(ConfigError::CapacityTooLarge {
                capacity: self.capacity,
                max: MAX_CAPACITY,
            });
        }
        if self.ttl.is_zero() {
            return Err(ConfigError::ZeroTtl);
        }
        if self.reclaim.interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "reclaim_interval_ms".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Router for the process serving shard `local`.
    ///
    /// With no shards configured the router holds a single placeholder
    /// shard, so only `local == 0` is accepted.
    pub fn router(&self, local: usize) -> ConfigResult<ShardRouter> {
        if self.shards.is_empty() {
            return match local {
                0 => Ok(ShardRouter::single("local")),
                index => Err(ConfigError::ShardOutOfRange { index, count: 0 }),
            };
        }
        ShardRouter::new(self.shards.clone(), local)
    }

    pub fn builder(&self) -> CacheBuilder {
        CacheBuilder::new(self.capacity).ttl(self.ttl)
    }

    /// Builds the configured policy behind a gateway. Reclamation is not started.
    pub fn gateway(&self) -> StorageGateway {
        StorageGateway::new(self.builder().build(self.policy), self.reclaim)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_empty() {
        let config = ServerConfig::parse_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.ttl, Duration::from_secs(36_000));
        assert_eq!(config.policy, PolicyKind::Lru);
    }

    #[test]
    fn test_parses_all_keys() {
        let text = "\
# cache
capacity = 10
ttl=60
algo=arc

shard0=10.0.0.1:8000
shard1=10.0.0.2:8000
shard3=10.0.0.4:8000
reclaim_interval_ms=250
reclaim_max_attempts=12
memory_limit_kib=4096
not a setting
";
        let config = ServerConfig::parse_str(text).unwrap();
        assert_eq!(config.capacity, 10);
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert_eq!(config.policy, PolicyKind::Arc);
        // shard3 follows a gap and is ignored
        assert_eq!(config.shards, vec!["10.0.0.1:8000", "10.0.0.2:8000"]);
        assert_eq!(config.reclaim.interval, Duration::from_millis(250));
        assert_eq!(config.reclaim.max_attempts, 12);
        assert_eq!(config.reclaim.trigger, BudgetTrigger::Memory { max_rss_kib: 4096 });
    }

    #[test]
    fn test_policy_key_wins_over_algo() {
        let config = ServerConfig::parse_str("algo=lfu\npolicy=random").unwrap();
        assert_eq!(config.policy, PolicyKind::Random);
    }

    #[test]
    fn test_unknown_policy_falls_back() {
        let config = ServerConfig::parse_str("algo=clock").unwrap();
        assert_eq!(config.policy, PolicyKind::Lru);
    }

    #[test]
    fn test_rejects_zero_and_malformed_values() {
        assert!(matches!(
            ServerConfig::parse_str("capacity=0"),
            Err(ConfigError::ZeroCapacity)
        ));
        assert!(matches!(ServerConfig::parse_str("ttl=0"), Err(ConfigError::ZeroTtl)));
        assert!(matches!(
            ServerConfig::parse_str("capacity=-5"),
            Err(ConfigError::InvalidValue { key, .. }) if key == "capacity"
        ));
        assert!(matches!(
            ServerConfig::parse_str("reclaim_interval_ms=0"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_rejects_oversized_capacity() {
        assert!(matches!(
            ServerConfig::parse_str("capacity=18446744073709551615"),
            Err(ConfigError::CapacityTooLarge { max: MAX_CAPACITY, .. })
        ));
        let config = ServerConfig::parse_str(&format!("capacity={MAX_CAPACITY}")).unwrap();
        assert_eq!(config.capacity, MAX_CAPACITY);
    }

    #[test]
    fn test_router_checks_shard_index() {
        let config = ServerConfig::parse_str("shard0=a:1\nshard1=b:2").unwrap();
        assert_eq!(config.router(1).unwrap().local_addr(), "b:2");
        assert!(matches!(
            config.router(2),
            Err(ConfigError::ShardOutOfRange { index: 2, count: 2 })
        ));

        let unsharded = ServerConfig::default();
        assert_eq!(unsharded.router(0).unwrap().shard_count(), 1);
        assert!(unsharded.router(1).is_err());
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let path = std::env::temp_dir().join(format!("shardkv-config-{}.cfg", std::process::id()));
        {
            let mut file = fs::File::create(&path).unwrap();
            writeln!(file, "capacity=7\nalgo=lfu").unwrap();
        }
        let config = ServerConfig::load(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config.capacity, 7);
        assert_eq!(config.policy, PolicyKind::Lfu);

        assert!(matches!(ServerConfig::load(&path), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_gateway_uses_configured_policy() {
        let config = ServerConfig::parse_str("capacity=3\nalgo=2q").unwrap();
        let gateway = config.gateway();
        assert_eq!(gateway.policy(), PolicyKind::TwoQ);
        assert_eq!(gateway.capacity(), 3);
        assert!(!gateway.is_reclaiming());
    }
}
