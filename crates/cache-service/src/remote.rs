//! The remote key-value store abstraction: one production implementation
//! over Redis, one in-memory test double.
//!
//! The façade in [`crate::facade`] only depends on [`RemoteStore`], so
//! circuit-breaker, statistics, and key-building logic can be exercised
//! without a live Redis instance.

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::{Duration, Instant};

/// Backing store contract the cache façade drives.
///
/// A missing key on `get`/`ttl` is represented by `-2`/[`CacheError::Miss`],
/// never folded into the generic error channel.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;
    async fn mset(&self, entries: &[(String, Vec<u8>)], ttl: Option<Duration>) -> Result<()>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
    async fn delete_pattern(&self, pattern: &str, batch_size: usize) -> Result<u64>;
    async fn exists(&self, key: &str) -> Result<bool>;
    /// `-1`: exists, no expiry. `-2`: does not exist.
    async fn ttl(&self, key: &str) -> Result<i64>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;
    async fn ping(&self) -> Result<()>;
}

/// Production [`RemoteStore`] backed by Redis.
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| CacheError::remote("connect", e))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::remote("connect", e))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(|e| CacheError::remote("get", e))?;
        value.ok_or_else(|| CacheError::Miss { key: key.to_string() })
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                .await
                .map_err(|e| CacheError::remote("set", e)),
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| CacheError::remote("set", e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(|e| CacheError::remote("delete", e))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(vec![]);
        }
        let mut conn = self.conn.clone();
        conn.mget(keys).await.map_err(|e| CacheError::remote("mget", e))
    }

    async fn mset(&self, entries: &[(String, Vec<u8>)], ttl: Option<Duration>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            match ttl {
                Some(ttl) => {
                    pipe.set_ex(key, value, ttl.as_secs().max(1));
                }
                None => {
                    pipe.set(key, value);
                }
            }
        }
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| CacheError::remote("mset", e))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut out = Vec::new();
        let mut iter: redis::AsyncIter<String> = conn
            .scan_match(pattern)
            .await
            .map_err(|e| CacheError::remote("keys", e))?;
        while let Some(key) = iter.next_item().await {
            out.push(key);
        }
        Ok(out)
    }

    async fn delete_pattern(&self, pattern: &str, batch_size: usize) -> Result<u64> {
        let matched = self.keys(pattern).await?;
        let mut deleted = 0u64;
        let mut conn = self.conn.clone();
        for chunk in matched.chunks(batch_size.max(1)) {
            let count: u64 = conn
                .del(chunk)
                .await
                .map_err(|e| CacheError::remote("delete_pattern", e))?;
            deleted += count;
        }
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(|e| CacheError::remote("exists", e))
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.ttl(key).await.map_err(|e| CacheError::remote("ttl", e))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.expire(key, ttl.as_secs().max(1) as i64)
            .await
            .map_err(|e| CacheError::remote("expire", e))
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| CacheError::remote("ping", e))
    }
}

struct FakeEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

/// In-memory [`RemoteStore`] test double — exercises the façade's
/// key-building, circuit-breaker, and statistics logic without Redis.
#[derive(Default)]
pub struct FakeRemoteStore {
    data: DashMap<String, FakeEntry>,
}

impl FakeRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(entry: &FakeEntry) -> bool {
        entry.expires_at.is_none_or(|exp| exp > Instant::now())
    }
}

#[async_trait]
impl RemoteStore for FakeRemoteStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        match self.data.get(key) {
            Some(entry) if Self::is_live(&entry) => Ok(entry.value.clone()),
            _ => Err(CacheError::Miss { key: key.to_string() }),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.data.insert(
            key.to_string(),
            FakeEntry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        Ok(keys
            .iter()
            .map(|k| match self.data.get(k.as_str()) {
                Some(entry) if Self::is_live(&entry) => Some(entry.value.clone()),
                _ => None,
            })
            .collect())
    }

    async fn mset(&self, entries: &[(String, Vec<u8>)], ttl: Option<Duration>) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value.clone(), ttl).await?;
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let glob = glob_to_prefix_suffix(pattern);
        Ok(self
            .data
            .iter()
            .filter(|e| Self::is_live(e.value()) && glob.matches(e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn delete_pattern(&self, pattern: &str, batch_size: usize) -> Result<u64> {
        let matched = self.keys(pattern).await?;
        for chunk in matched.chunks(batch_size.max(1)) {
            for key in chunk {
                self.data.remove(key);
            }
        }
        Ok(matched.len() as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(matches!(self.data.get(key), Some(entry) if Self::is_live(&entry)))
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        match self.data.get(key) {
            Some(entry) if Self::is_live(&entry) => match entry.expires_at {
                Some(exp) => Ok(exp.saturating_duration_since(Instant::now()).as_secs() as i64),
                None => Ok(-1),
            },
            _ => Ok(-2),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        match self.data.get_mut(key) {
            Some(mut entry) if Self::is_live(&entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// A minimal glob matcher supporting the single trailing `*` shape the
/// façade's `flush` pattern and `delete-pattern` calls produce
/// (`prefix:*`). Not a general glob engine — Redis's `SCAN MATCH` handles
/// the real wildcard syntax; the fake only needs to match what this crate
/// itself generates.
struct SimpleGlob {
    prefix: String,
    suffix: String,
}

impl SimpleGlob {
    fn matches(&self, candidate: &str) -> bool {
        candidate.len() >= self.prefix.len() + self.suffix.len()
            && candidate.starts_with(&self.prefix)
            && candidate.ends_with(&self.suffix)
    }
}

fn glob_to_prefix_suffix(pattern: &str) -> SimpleGlob {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => SimpleGlob {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        },
        None => SimpleGlob {
            prefix: pattern.to_string(),
            suffix: String::new(),
        },
    }
}
