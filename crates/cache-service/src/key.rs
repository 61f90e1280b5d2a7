//! Tenant-namespaced cache key construction.
//!
//! ## Contract
//!
//! - Keys are `:`-joined segments: `<prefix>:tenant:<type>-<id>[:<namespace>]:<key>`
//!   for a tenant-scoped key, or `<prefix>:global[:<namespace>]:<key>` for the
//!   global namespace.
//! - An empty `key` segment is rejected.
//! - A key whose assembled form exceeds 250 bytes is rewritten as
//!   `<prefix-portion>:<hex-sha256>` when hashing is enabled (the default),
//!   truncating the prefix portion to leave room for the 64-character digest
//!   plus separator.

use crate::error::{CacheError, Result};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Maximum key length in bytes before the hashing fallback kicks in.
pub const MAX_KEY_BYTES: usize = 250;

/// Length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// How a tenant is identified, in priority order when resolving from a
/// request context: `Id` first, then `Slug`, then `Subdomain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantId {
    Id(Uuid),
    Slug(String),
    Subdomain(String),
}

impl TenantId {
    fn type_str(&self) -> &'static str {
        match self {
            TenantId::Id(_) => "id",
            TenantId::Slug(_) => "slug",
            TenantId::Subdomain(_) => "subdomain",
        }
    }

    fn identifier(&self) -> String {
        match self {
            TenantId::Id(id) => id.to_string(),
            TenantId::Slug(s) | TenantId::Subdomain(s) => s.clone(),
        }
    }
}

/// Builds remote-store keys for a configured key prefix.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
    hash_if_too_long: bool,
}

impl KeyBuilder {
    /// Create a key builder under `prefix` with hashing-on-overflow enabled
    /// (the default).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            hash_if_too_long: true,
        }
    }

    /// Disable the hash-fallback for over-length keys; such keys are
    /// returned as-is instead.
    pub fn without_hash_fallback(mut self) -> Self {
        self.hash_if_too_long = false;
        self
    }

    /// Build a tenant-scoped key.
    pub fn tenant_key(&self, tenant: &TenantId, namespace: Option<&str>, key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        let tenant_segment = format!("tenant:{}-{}", tenant.type_str(), tenant.identifier());
        let mut segments = vec![self.prefix.as_str(), tenant_segment.as_str()];
        if let Some(ns) = namespace {
            segments.push(ns);
        }
        segments.push(key);
        Ok(self.finish(segments.join(":")))
    }

    /// Build a global (non-tenant-scoped) key.
    pub fn global_key(&self, namespace: Option<&str>, key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        let mut segments = vec![self.prefix.as_str(), "global"];
        if let Some(ns) = namespace {
            segments.push(ns);
        }
        segments.push(key);
        Ok(self.finish(segments.join(":")))
    }

    /// The glob pattern matching every key under a tenant, used by `flush`.
    pub fn tenant_flush_pattern(&self, tenant: &TenantId) -> String {
        format!(
            "{}:tenant:{}-{}:*",
            self.prefix,
            tenant.type_str(),
            tenant.identifier()
        )
    }

    fn finish(&self, assembled: String) -> String {
        if !self.hash_if_too_long || assembled.len() <= MAX_KEY_BYTES {
            return assembled;
        }

        let digest = hex::encode(Sha256::digest(assembled.as_bytes()));
        debug_assert_eq!(digest.len(), DIGEST_HEX_LEN);

        let budget = MAX_KEY_BYTES.saturating_sub(DIGEST_HEX_LEN + 1);
        let prefix_portion = truncate_at_char_boundary(&assembled, budget);
        format!("{prefix_portion}:{digest}")
    }
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_key_shape() {
        let kb = KeyBuilder::new("app");
        let tenant = TenantId::Slug("acme".into());
        let key = kb.tenant_key(&tenant, None, "settings").unwrap();
        assert_eq!(key, "app:tenant:slug-acme:settings");
    }

    #[test]
    fn tenant_key_with_namespace() {
        let kb = KeyBuilder::new("app");
        let tenant = TenantId::Subdomain("acme".into());
        let key = kb.tenant_key(&tenant, Some("flags"), "beta").unwrap();
        assert_eq!(key, "app:tenant:subdomain-acme:flags:beta");
    }

    #[test]
    fn global_key_shape() {
        let kb = KeyBuilder::new("app");
        let key = kb.global_key(None, "version").unwrap();
        assert_eq!(key, "app:global:version");
    }

    #[test]
    fn empty_key_rejected() {
        let kb = KeyBuilder::new("app");
        let tenant = TenantId::Slug("acme".into());
        assert!(kb.tenant_key(&tenant, None, "").is_err());
        assert!(kb.global_key(None, "").is_err());
    }

    #[test]
    fn over_length_key_is_hashed() {
        let kb = KeyBuilder::new("app");
        let tenant = TenantId::Slug("acme".into());
        let long_key = "x".repeat(400);
        let key = kb.tenant_key(&tenant, None, &long_key).unwrap();
        assert!(key.len() <= MAX_KEY_BYTES);
        assert!(key.contains(':'));
        let digest = key.rsplit(':').next().unwrap();
        assert_eq!(digest.len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn hashing_disabled_leaves_long_key_untouched() {
        let kb = KeyBuilder::new("app").without_hash_fallback();
        let tenant = TenantId::Slug("acme".into());
        let long_key = "x".repeat(400);
        let key = kb.tenant_key(&tenant, None, &long_key).unwrap();
        assert!(key.len() > MAX_KEY_BYTES);
    }

    #[test]
    fn id_tenant_uses_canonical_uuid_string() {
        let kb = KeyBuilder::new("app");
        let uuid = Uuid::nil();
        let tenant = TenantId::Id(uuid);
        let key = kb.tenant_key(&tenant, None, "x").unwrap();
        assert_eq!(key, format!("app:tenant:id-{uuid}:x"));
    }

    #[test]
    fn flush_pattern_matches_all_tenant_keys() {
        let kb = KeyBuilder::new("app");
        let tenant = TenantId::Slug("acme".into());
        assert_eq!(kb.tenant_flush_pattern(&tenant), "app:tenant:slug-acme:*");
    }
}
