//! The public cache service: wires key-building, serialization, the
//! circuit breaker, the memory tiers, and a [`RemoteStore`] together behind
//! the operation set in [`crate::remote::RemoteStore`].

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::key::{KeyBuilder, TenantId};
use crate::memory::{MemoryCaches, MemoryConfig};
use crate::remote::RemoteStore;
use crate::serializer::{Serializer, SerializerConfig};
use crate::stats::{CacheStats, CacheStatsSnapshot};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tenant scoping for a single call.
///
/// `None` means "operate on the global namespace" — only accepted when
/// [`Config::allow_global_operations`] is set.
pub type Tenant<'a> = Option<&'a TenantId>;

/// Composed cache service: the public entry point applications depend on.
pub struct CacheService {
    config: Config,
    keys: KeyBuilder,
    serializer: Serializer,
    breaker: Option<CircuitBreaker>,
    memory: Option<Arc<MemoryCaches>>,
    stats: CacheStats,
    remote: Arc<dyn RemoteStore>,
}

impl CacheService {
    pub fn new(config: Config, remote: Arc<dyn RemoteStore>) -> Self {
        let keys = KeyBuilder::new(config.key_prefix.clone());
        let serializer = Serializer::new(SerializerConfig {
            enable_compression: config.enable_compression,
            compression_level: config.compression_level,
        });
        let breaker = config.enable_circuit_breaker.then(|| {
            CircuitBreaker::new(BreakerConfig {
                failure_threshold: config.circuit_breaker_threshold,
                cooldown: config.circuit_breaker_timeout,
            })
        });
        let memory = config.enable_memory_cache.then(|| {
            MemoryCaches::new(MemoryConfig {
                enabled: true,
                max_size: config.memory_cache_max_size,
                default_ttl: config.memory_cache_default_ttl,
                cleanup_interval: config.memory_cache_cleanup_interval,
            })
        });

        Self {
            config,
            keys,
            serializer,
            breaker,
            memory,
            stats: CacheStats::new(),
            remote,
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// A call with no tenant is rejected if tenant context is required, or
    /// if the config simply doesn't permit global-scoped operations.
    fn require_tenant_for_scoped_op(&self, tenant: Tenant<'_>, key: &str) -> Result<()> {
        if tenant.is_none() && (self.config.require_tenant_context || !self.config.allow_global_operations) {
            return Err(CacheError::NoTenantContext { key: key.to_string() });
        }
        Ok(())
    }

    fn build_key(&self, tenant: Tenant<'_>, namespace: Option<&str>, key: &str) -> Result<String> {
        match tenant {
            Some(t) => self.keys.tenant_key(t, namespace, key),
            None => self.keys.global_key(namespace, key),
        }
    }

    fn memory_namespaced_key(namespace: Option<&str>, key: &str) -> String {
        match namespace {
            Some(ns) => format!("{ns}:{key}"),
            None => key.to_string(),
        }
    }

    fn memory_get(&self, tenant: Tenant<'_>, namespace: Option<&str>, key: &str) -> Option<Vec<u8>> {
        let memory = self.memory.as_ref()?;
        let mkey = Self::memory_namespaced_key(namespace, key);
        match tenant {
            Some(t) => memory.get_tenant(t, &mkey),
            None => memory.get_global(&mkey),
        }
    }

    fn memory_set(&self, tenant: Tenant<'_>, namespace: Option<&str>, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let Some(memory) = self.memory.as_ref() else {
            return;
        };
        let mkey = Self::memory_namespaced_key(namespace, key);
        match tenant {
            Some(t) => memory.set_tenant(t, &mkey, value, ttl),
            None => memory.set_global(&mkey, value, ttl),
        }
    }

    fn memory_delete(&self, tenant: Tenant<'_>, namespace: Option<&str>, key: &str) {
        let Some(memory) = self.memory.as_ref() else {
            return;
        };
        let mkey = Self::memory_namespaced_key(namespace, key);
        match tenant {
            Some(t) => memory.delete_tenant(t, &mkey),
            None => memory.delete_global(&mkey),
        }
    }

    /// Run `f` with circuit-breaker admission, retry-with-delay on remote
    /// faults (never on a miss), and statistics recording.
    async fn with_resilience<F, Fut, R>(&self, operation: &str, f: F) -> Result<R>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            if let Some(breaker) = &self.breaker {
                breaker.before_call()?;
            }

            match f().await {
                Ok(value) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_success();
                    }
                    self.stats.record_operation(started.elapsed());
                    return Ok(value);
                }
                Err(err) if err.is_miss() => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_success();
                    }
                    self.stats.record_operation(started.elapsed());
                    return Err(err);
                }
                Err(err) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_failure();
                    }
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        self.stats.record_error(err.to_string());
                        self.stats.record_operation(started.elapsed());
                        return Err(err);
                    }
                    tracing::debug!(operation, attempt, error = %err, "cache operation failed, retrying");
                    tokio::time::sleep(self.config.retry_delay * attempt).await;
                }
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, tenant: Tenant<'_>, namespace: Option<&str>, key: &str) -> Result<T> {
        self.require_tenant_for_scoped_op(tenant, key)?;
        let full_key = self.build_key(tenant, namespace, key)?;

        if let Some(bytes) = self.memory_get(tenant, namespace, key) {
            self.stats.record_hit();
            return self.serializer.decode(&bytes);
        }

        let remote = self.remote.clone();
        let result = self
            .with_resilience("get", || {
                let remote = remote.clone();
                let full_key = full_key.clone();
                async move { remote.get(&full_key).await }
            })
            .await;

        match result {
            Ok(bytes) => {
                self.stats.record_hit();
                self.memory_set(tenant, namespace, key, bytes.clone(), None);
                self.serializer.decode(&bytes)
            }
            Err(err) if err.is_miss() => {
                self.stats.record_miss();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn set<T: Serialize + Sync>(
        &self,
        tenant: Tenant<'_>,
        namespace: Option<&str>,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.require_tenant_for_scoped_op(tenant, key)?;
        let full_key = self.build_key(tenant, namespace, key)?;
        let encoded = self.serializer.encode(value)?;

        let remote = self.remote.clone();
        let payload = encoded.clone();
        self.with_resilience("set", || {
            let remote = remote.clone();
            let full_key = full_key.clone();
            let payload = payload.clone();
            async move { remote.set(&full_key, payload, ttl).await }
        })
        .await?;

        self.memory_set(tenant, namespace, key, encoded, ttl);
        self.stats.record_set();
        Ok(())
    }

    pub async fn delete(&self, tenant: Tenant<'_>, namespace: Option<&str>, key: &str) -> Result<()> {
        self.require_tenant_for_scoped_op(tenant, key)?;
        let full_key = self.build_key(tenant, namespace, key)?;

        let remote = self.remote.clone();
        self.with_resilience("delete", || {
            let remote = remote.clone();
            let full_key = full_key.clone();
            async move { remote.delete(&full_key).await }
        })
        .await?;

        self.memory_delete(tenant, namespace, key);
        self.stats.record_delete();
        Ok(())
    }

    /// Delete every key belonging to `tenant`. Always tenant-scoped: there
    /// is no global flush.
    pub async fn flush(&self, tenant: &TenantId) -> Result<u64> {
        let pattern = self.keys.tenant_flush_pattern(tenant);
        let batch_size = self.config.batch_delete_size;
        let remote = self.remote.clone();
        let deleted = self
            .with_resilience("flush", || {
                let remote = remote.clone();
                let pattern = pattern.clone();
                async move { remote.delete_pattern(&pattern, batch_size).await }
            })
            .await?;
        if let Some(memory) = &self.memory {
            memory.clear_tenant(tenant);
        }
        Ok(deleted)
    }

    pub async fn mget<T: DeserializeOwned>(
        &self,
        tenant: Tenant<'_>,
        namespace: Option<&str>,
        keys: &[String],
    ) -> Result<Vec<Option<T>>> {
        self.require_tenant_for_scoped_op(tenant, "mget")?;
        let mut full_keys = Vec::with_capacity(keys.len());
        for key in keys {
            full_keys.push(self.build_key(tenant, namespace, key)?);
        }

        let remote = self.remote.clone();
        let raw = self
            .with_resilience("mget", || {
                let remote = remote.clone();
                let full_keys = full_keys.clone();
                async move { remote.mget(&full_keys).await }
            })
            .await?;

        raw.into_iter()
            .map(|slot| match slot {
                Some(bytes) => {
                    self.stats.record_hit();
                    self.serializer.decode(&bytes).map(Some)
                }
                None => {
                    self.stats.record_miss();
                    Ok(None)
                }
            })
            .collect()
    }

    pub async fn mset<T: Serialize + Sync>(
        &self,
        tenant: Tenant<'_>,
        namespace: Option<&str>,
        entries: &[(String, T)],
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.require_tenant_for_scoped_op(tenant, "mset")?;
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let full_key = self.build_key(tenant, namespace, key)?;
            encoded.push((full_key, self.serializer.encode(value)?));
        }

        let remote = self.remote.clone();
        self.with_resilience("mset", || {
            let remote = remote.clone();
            let encoded = encoded.clone();
            async move { remote.mset(&encoded, ttl).await }
        })
        .await?;

        for ((_, value), (key, _)) in encoded.iter().zip(entries.iter()) {
            self.memory_set(tenant, namespace, key, value.clone(), ttl);
        }
        self.stats.record_set();
        Ok(())
    }

    pub async fn mdelete(&self, tenant: Tenant<'_>, namespace: Option<&str>, keys: &[String]) -> Result<()> {
        self.require_tenant_for_scoped_op(tenant, "mdelete")?;
        for key in keys {
            self.delete(tenant, namespace, key).await?;
        }
        Ok(())
    }

    pub async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let batch_size = self.config.batch_delete_size;
        let remote = self.remote.clone();
        let deleted = self
            .with_resilience("delete-pattern", || {
                let remote = remote.clone();
                let pattern = pattern.to_string();
                async move { remote.delete_pattern(&pattern, batch_size).await }
            })
            .await?;
        // An arbitrary remote pattern can't be mapped back to the memory
        // tier's own `<type>-<id>:<key>` keying, so drop both tiers entirely
        // rather than risk leaving a stale entry behind.
        if let Some(memory) = &self.memory {
            memory.clear_all();
        }
        Ok(deleted)
    }

    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let remote = self.remote.clone();
        self.with_resilience("keys", || {
            let remote = remote.clone();
            let pattern = pattern.to_string();
            async move { remote.keys(&pattern).await }
        })
        .await
    }

    pub async fn exists(&self, tenant: Tenant<'_>, namespace: Option<&str>, key: &str) -> Result<bool> {
        self.require_tenant_for_scoped_op(tenant, key)?;
        let full_key = self.build_key(tenant, namespace, key)?;
        let remote = self.remote.clone();
        self.with_resilience("exists", || {
            let remote = remote.clone();
            let full_key = full_key.clone();
            async move { remote.exists(&full_key).await }
        })
        .await
    }

    /// `-1`: exists with no expiry. `-2`: key does not exist.
    pub async fn ttl(&self, tenant: Tenant<'_>, namespace: Option<&str>, key: &str) -> Result<i64> {
        self.require_tenant_for_scoped_op(tenant, key)?;
        let full_key = self.build_key(tenant, namespace, key)?;
        let remote = self.remote.clone();
        self.with_resilience("ttl", || {
            let remote = remote.clone();
            let full_key = full_key.clone();
            async move { remote.ttl(&full_key).await }
        })
        .await
    }

    pub async fn expire(&self, tenant: Tenant<'_>, namespace: Option<&str>, key: &str, ttl: Duration) -> Result<bool> {
        self.require_tenant_for_scoped_op(tenant, key)?;
        let full_key = self.build_key(tenant, namespace, key)?;
        let remote = self.remote.clone();
        self.with_resilience("expire", || {
            let remote = remote.clone();
            let full_key = full_key.clone();
            async move { remote.expire(&full_key, ttl).await }
        })
        .await
    }

    pub async fn ping(&self) -> Result<()> {
        let remote = self.remote.clone();
        self.with_resilience("ping", || {
            let remote = remote.clone();
            async move { remote.ping().await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::FakeRemoteStore;
    use serde_json::json;

    fn service(config: Config) -> CacheService {
        CacheService::new(config, Arc::new(FakeRemoteStore::new()))
    }

    fn tenant() -> TenantId {
        TenantId::Slug("acme".into())
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let svc = service(Config::default());
        svc.set(Some(&tenant()), None, "k", &json!({"a": 1}), None).await.unwrap();
        let value: serde_json::Value = svc.get(Some(&tenant()), None, "k").await.unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[tokio::test]
    async fn miss_does_not_increment_error_stats() {
        let svc = service(Config::default());
        let err = svc.get::<serde_json::Value>(Some(&tenant()), None, "absent").await.unwrap_err();
        assert!(err.is_miss());
        assert_eq!(svc.stats().errors, 0);
        assert_eq!(svc.stats().misses, 1);
    }

    #[tokio::test]
    async fn missing_tenant_context_fails_when_required() {
        let svc = service(Config::default());
        let err = svc.get::<serde_json::Value>(None, None, "k").await.unwrap_err();
        assert!(matches!(err, CacheError::NoTenantContext { .. }));
    }

    #[tokio::test]
    async fn global_operations_allowed_when_tenant_not_required() {
        let svc = service(Config::default().with_tenant_enforcement(false, true));
        svc.set(None, None, "k", &json!(1), None).await.unwrap();
        let value: serde_json::Value = svc.get(None, None, "k").await.unwrap();
        assert_eq!(value, json!(1));
    }

    #[tokio::test]
    async fn flush_only_removes_keys_for_that_tenant() {
        let svc = service(Config::default());
        let other = TenantId::Slug("globex".into());
        svc.set(Some(&tenant()), None, "a", &json!(1), None).await.unwrap();
        svc.set(Some(&other), None, "a", &json!(1), None).await.unwrap();

        svc.flush(&tenant()).await.unwrap();

        assert!(svc.get::<serde_json::Value>(Some(&tenant()), None, "a").await.is_err());
        assert!(svc.get::<serde_json::Value>(Some(&other), None, "a").await.is_ok());
    }

    #[tokio::test]
    async fn ttl_reflects_remote_semantics() {
        let svc = service(Config::default());
        svc.set(Some(&tenant()), None, "k", &json!(1), None).await.unwrap();
        assert_eq!(svc.ttl(Some(&tenant()), None, "k").await.unwrap(), -1);
        assert_eq!(svc.ttl(Some(&tenant()), None, "missing").await.unwrap(), -2);
    }

    #[tokio::test]
    async fn compression_round_trips_through_the_facade() {
        let svc = service(Config::default());
        let big = json!({"data": "x".repeat(4096)});
        svc.set(Some(&tenant()), None, "big", &big, None).await.unwrap();
        let round_tripped: serde_json::Value = svc.get(Some(&tenant()), None, "big").await.unwrap();
        assert_eq!(round_tripped, big);
    }
}
