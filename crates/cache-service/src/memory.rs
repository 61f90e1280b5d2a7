//! In-process two-tier memory cache: a tenant-aware tier and a global tier,
//! each with a size cap and a background expiry sweeper.
//!
//! The sweeper follows the same shutdown-signal-plus-join shape as the
//! condition engine's background task scheduler: an `AtomicBool` tells the
//! thread to stop, a `Condvar` wakes it early so teardown doesn't wait out
//! a full sweep interval.

use crate::key::TenantId;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Memory-tier configuration.
#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub max_size: usize,
    pub default_ttl: Duration,
    pub cleanup_interval: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 1_000,
            default_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

struct Entry {
    value: Vec<u8>,
    /// `None` means the entry never expires (a zero or omitted TTL).
    expires_at: Option<Instant>,
}

/// A single capped, TTL-aware map.
struct Tier {
    entries: DashMap<String, Entry>,
    max_size: usize,
}

impl Tier {
    fn new(max_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_size,
        }
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entry = self.entries.get(key)?;
        if entry.expires_at.is_some_and(|at| at <= Instant::now()) {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    fn set(&self, key: String, value: Vec<u8>, ttl: Duration) {
        if self.entries.len() >= self.max_size && !self.entries.contains_key(&key) {
            // Full: evict any one entry to make room. Not LRU — any victim
            // is acceptable, so a full scan for the oldest isn't needed.
            if let Some(victim) = self.entries.iter().next().map(|e| e.key().clone()) {
                self.entries.remove(&victim);
            }
        }
        let expires_at = if ttl.is_zero() { None } else { Some(Instant::now() + ttl) };
        self.entries.insert(key, Entry { value, expires_at });
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn sweep(&self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.expires_at.is_some_and(|at| at <= now))
            .map(|e| e.key().clone())
            .collect();
        for key in &expired {
            self.entries.remove(key);
        }
        expired.len()
    }

    /// Remove every entry whose key starts with `prefix`, for tenant-scoped
    /// invalidation.
    fn remove_prefix(&self, prefix: &str) {
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        for key in &matching {
            self.entries.remove(key);
        }
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

fn tenant_key(tenant: &TenantId, key: &str) -> String {
    format!("{}{}", tenant_prefix(tenant), key)
}

fn tenant_prefix(tenant: &TenantId) -> String {
    format!("{}-{}:", type_str(tenant), identifier(tenant))
}

fn type_str(tenant: &TenantId) -> &'static str {
    match tenant {
        TenantId::Id(_) => "id",
        TenantId::Slug(_) => "slug",
        TenantId::Subdomain(_) => "subdomain",
    }
}

fn identifier(tenant: &TenantId) -> String {
    match tenant {
        TenantId::Id(id) => id.to_string(),
        TenantId::Slug(s) | TenantId::Subdomain(s) => s.clone(),
    }
}

struct SweeperHandle {
    shutdown: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

/// Two in-process memory tiers, backed by a background expiry sweeper.
pub struct MemoryCaches {
    tenant: Arc<Tier>,
    global: Arc<Tier>,
    config: MemoryConfig,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl MemoryCaches {
    /// Build the tiers and start the background sweeper, unless the
    /// config disables the memory cache entirely.
    pub fn new(config: MemoryConfig) -> Arc<Self> {
        let caches = Arc::new(Self {
            tenant: Arc::new(Tier::new(config.max_size)),
            global: Arc::new(Tier::new(config.max_size)),
            config,
            sweeper: Mutex::new(None),
        });

        if config.enabled {
            caches.start_sweeper();
        }

        caches
    }

    fn start_sweeper(self: &Arc<Self>) {
        let shutdown = Arc::new((Mutex::new(false), Condvar::new()));
        let tenant = self.tenant.clone();
        let global = self.global.clone();
        let interval = self.config.cleanup_interval;
        let shutdown_clone = shutdown.clone();

        let thread = std::thread::Builder::new()
            .name("cache-memory-sweeper".into())
            .spawn(move || {
                let (lock, cond) = &*shutdown_clone;
                let mut guard = lock.lock();
                loop {
                    let timed_out = cond.wait_for(&mut guard, interval).timed_out();
                    if *guard {
                        return;
                    }
                    if timed_out {
                        let now = Instant::now();
                        let removed = tenant.sweep(now) + global.sweep(now);
                        if removed > 0 {
                            tracing::debug!(removed, "memory cache sweeper removed expired entries");
                        }
                    }
                }
            })
            .expect("failed to spawn memory cache sweeper thread");

        *self.sweeper.lock() = Some(SweeperHandle {
            shutdown,
            thread: Some(thread),
        });
    }

    /// Signal the sweeper to stop and join it. Idempotent.
    pub fn stop(&self) {
        let Some(mut handle) = self.sweeper.lock().take() else {
            return;
        };
        {
            let (lock, cond) = &*handle.shutdown;
            *lock.lock() = true;
            cond.notify_all();
        }
        if let Some(thread) = handle.thread.take() {
            let _ = thread.join();
        }
    }

    fn ttl_or_default(&self, ttl: Option<Duration>) -> Duration {
        ttl.unwrap_or(self.config.default_ttl)
    }

    pub fn get_tenant(&self, tenant: &TenantId, key: &str) -> Option<Vec<u8>> {
        self.tenant.get(&tenant_key(tenant, key))
    }

    pub fn set_tenant(&self, tenant: &TenantId, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        self.tenant.set(tenant_key(tenant, key), value, self.ttl_or_default(ttl));
    }

    pub fn delete_tenant(&self, tenant: &TenantId, key: &str) {
        self.tenant.delete(&tenant_key(tenant, key));
    }

    pub fn get_global(&self, key: &str) -> Option<Vec<u8>> {
        self.global.get(key)
    }

    pub fn set_global(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        self.global.set(key.to_string(), value, self.ttl_or_default(ttl));
    }

    pub fn delete_global(&self, key: &str) {
        self.global.delete(key);
    }

    /// Drop every tenant-tier entry under `tenant`, for a tenant-scoped flush.
    pub fn clear_tenant(&self, tenant: &TenantId) {
        self.tenant.remove_prefix(&tenant_prefix(tenant));
    }

    /// Drop every entry in both tiers, for an unscoped pattern delete where
    /// the pattern can't be reliably mapped back to the tier's own keying.
    pub fn clear_all(&self) {
        self.tenant.clear();
        self.global.clear();
    }

    /// Total entries currently held across both tiers, for statistics.
    pub fn len(&self) -> usize {
        self.tenant.len() + self.global.len()
    }
}

impl Drop for MemoryCaches {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId::Slug("acme".into())
    }

    #[test]
    fn set_then_get_within_ttl() {
        let caches = MemoryCaches::new(MemoryConfig {
            enabled: false,
            ..MemoryConfig::default()
        });
        caches.set_tenant(&tenant(), "k", b"v".to_vec(), Some(Duration::from_secs(60)));
        assert_eq!(caches.get_tenant(&tenant(), "k"), Some(b"v".to_vec()));
    }

    #[test]
    fn expired_entry_is_absent() {
        let caches = MemoryCaches::new(MemoryConfig {
            enabled: false,
            ..MemoryConfig::default()
        });
        caches.set_tenant(&tenant(), "k", b"v".to_vec(), Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(caches.get_tenant(&tenant(), "k"), None);
    }

    #[test]
    fn zero_ttl_never_expires() {
        let caches = MemoryCaches::new(MemoryConfig {
            enabled: false,
            ..MemoryConfig::default()
        });
        caches.set_tenant(&tenant(), "k", b"v".to_vec(), Some(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(caches.get_tenant(&tenant(), "k"), Some(b"v".to_vec()));
    }

    #[test]
    fn clear_tenant_removes_only_that_tenants_entries() {
        let caches = MemoryCaches::new(MemoryConfig {
            enabled: false,
            ..MemoryConfig::default()
        });
        let other = TenantId::Slug("globex".into());
        caches.set_tenant(&tenant(), "k", b"a".to_vec(), None);
        caches.set_tenant(&other, "k", b"b".to_vec(), None);
        caches.clear_tenant(&tenant());
        assert_eq!(caches.get_tenant(&tenant(), "k"), None);
        assert_eq!(caches.get_tenant(&other, "k"), Some(b"b".to_vec()));
    }

    #[test]
    fn clear_all_empties_both_tiers() {
        let caches = MemoryCaches::new(MemoryConfig {
            enabled: false,
            ..MemoryConfig::default()
        });
        caches.set_tenant(&tenant(), "k", b"v".to_vec(), None);
        caches.set_global("k", b"v".to_vec(), None);
        caches.clear_all();
        assert_eq!(caches.len(), 0);
    }

    #[test]
    fn tenant_and_global_tiers_are_isolated() {
        let caches = MemoryCaches::new(MemoryConfig {
            enabled: false,
            ..MemoryConfig::default()
        });
        caches.set_tenant(&tenant(), "k", b"tenant-value".to_vec(), None);
        caches.set_global("k", b"global-value".to_vec(), None);
        assert_eq!(caches.get_tenant(&tenant(), "k"), Some(b"tenant-value".to_vec()));
        assert_eq!(caches.get_global("k"), Some(b"global-value".to_vec()));
    }

    #[test]
    fn eviction_keeps_tier_at_capacity() {
        let caches = MemoryCaches::new(MemoryConfig {
            enabled: false,
            max_size: 4,
            ..MemoryConfig::default()
        });
        for i in 0..20 {
            caches.set_global(&format!("k{i}"), b"v".to_vec(), None);
        }
        assert!(caches.len() <= 4);
    }

    #[test]
    fn sweeper_removes_expired_entries_in_background() {
        let caches = MemoryCaches::new(MemoryConfig {
            enabled: true,
            cleanup_interval: Duration::from_millis(20),
            ..MemoryConfig::default()
        });
        caches.set_global("k", b"v".to_vec(), Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(caches.len(), 0);
        caches.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let caches = MemoryCaches::new(MemoryConfig::default());
        caches.stop();
        caches.stop();
    }
}
