//! Multi-tenant caching service fronting a remote key-value store.
//!
//! A [`CacheService`] composes tenant-namespaced key building, structural
//! serialization with optional gzip, a circuit breaker around the remote
//! store, two in-process memory tiers, and call statistics. The remote
//! store itself is abstracted behind [`RemoteStore`] so the rest of the
//! stack can be exercised against [`FakeRemoteStore`] without Redis.
//!
//! ```no_run
//! use cache_service::{CacheService, Config, FakeRemoteStore, TenantId};
//! use std::sync::Arc;
//!
//! # async fn run() -> cache_service::Result<()> {
//! let svc = CacheService::new(Config::default(), Arc::new(FakeRemoteStore::new()));
//! let tenant = TenantId::Slug("acme".into());
//! svc.set(Some(&tenant), None, "greeting", &"hello", None).await?;
//! let value: String = svc.get(Some(&tenant), None, "greeting").await?;
//! assert_eq!(value, "hello");
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod config;
pub mod error;
pub mod facade;
pub mod key;
pub mod memory;
pub mod remote;
pub mod serializer;
pub mod stats;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use config::Config;
pub use error::{CacheError, Result};
pub use facade::CacheService;
pub use key::{KeyBuilder, TenantId};
pub use memory::{MemoryCaches, MemoryConfig};
pub use remote::{FakeRemoteStore, RedisStore, RemoteStore};
pub use serializer::{Serializer, SerializerConfig};
pub use stats::{CacheStats, CacheStatsSnapshot};
