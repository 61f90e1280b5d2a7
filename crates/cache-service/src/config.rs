//! Top-level cache service configuration.
//!
//! A single `Config` struct with a `Default` impl matching the documented
//! defaults, plus a builder-style `with_*` API — the same shape as the
//! condition engine's `EvaluationOptions`.

use std::time::Duration;

/// Full configuration surface for [`crate::CacheService`].
#[derive(Debug, Clone)]
pub struct Config {
    pub key_prefix: String,

    pub pool_size: u32,
    pub min_idle: u32,
    pub max_conn_age: Duration,
    pub pool_timeout: Duration,
    pub idle_timeout: Duration,

    pub max_retries: u32,
    pub retry_delay: Duration,

    pub enable_compression: bool,
    pub compression_level: u32,

    pub batch_delete_size: usize,

    pub enable_circuit_breaker: bool,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout: Duration,

    pub require_tenant_context: bool,
    pub allow_global_operations: bool,

    pub enable_memory_cache: bool,
    pub memory_cache_max_size: usize,
    pub memory_cache_default_ttl: Duration,
    pub memory_cache_cleanup_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_prefix: "cache".into(),

            pool_size: 10,
            min_idle: 1,
            max_conn_age: Duration::from_secs(30 * 60),
            pool_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(10 * 60),

            max_retries: 3,
            retry_delay: Duration::from_millis(100),

            enable_compression: true,
            compression_level: 6,

            batch_delete_size: 1_000,

            enable_circuit_breaker: true,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(30),

            require_tenant_context: true,
            allow_global_operations: true,

            enable_memory_cache: true,
            memory_cache_max_size: 1_000,
            memory_cache_default_ttl: Duration::from_secs(300),
            memory_cache_cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_compression(mut self, enabled: bool, level: u32) -> Self {
        self.enable_compression = enabled;
        self.compression_level = level.clamp(1, 9);
        self
    }

    pub fn with_circuit_breaker(mut self, enabled: bool, threshold: u32, timeout: Duration) -> Self {
        self.enable_circuit_breaker = enabled;
        self.circuit_breaker_threshold = threshold;
        self.circuit_breaker_timeout = timeout;
        self
    }

    pub fn with_tenant_enforcement(mut self, require_tenant_context: bool, allow_global_operations: bool) -> Self {
        self.require_tenant_context = require_tenant_context;
        self.allow_global_operations = allow_global_operations;
        self
    }

    pub fn with_memory_cache(
        mut self,
        enabled: bool,
        max_size: usize,
        default_ttl: Duration,
        cleanup_interval: Duration,
    ) -> Self {
        self.enable_memory_cache = enabled;
        self.memory_cache_max_size = max_size;
        self.memory_cache_default_ttl = default_ttl;
        self.memory_cache_cleanup_interval = cleanup_interval;
        self
    }

    pub fn with_batch_delete_size(mut self, size: usize) -> Self {
        self.batch_delete_size = size;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.batch_delete_size, 1_000);
        assert_eq!(cfg.circuit_breaker_threshold, 5);
        assert_eq!(cfg.circuit_breaker_timeout, Duration::from_secs(30));
        assert_eq!(cfg.memory_cache_max_size, 1_000);
        assert!(cfg.require_tenant_context);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = Config::default()
            .with_key_prefix("myapp")
            .with_compression(false, 9);
        assert_eq!(cfg.key_prefix, "myapp");
        assert!(!cfg.enable_compression);
        assert_eq!(cfg.compression_level, 9);
    }
}
