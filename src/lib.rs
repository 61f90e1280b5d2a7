//! # Backoffice Core
//!
//! Two independently usable cores for the back-office platform:
//!
//! - [`condition_engine`] — rule/group tree evaluation for feature flags,
//!   attribute-based access control, and customer workflows.
//! - [`cache_service`] — a multi-tenant cache fronting a remote key-value
//!   store with in-process memory tiers.
//!
//! Neither core depends on the other. This crate only re-exports them for
//! callers that want a single dependency; the HTML component library, CLI
//! tooling, HTTP handlers, database schemas, and example business domains
//! that consume these cores live outside this workspace.

pub use cache_service;
pub use condition_engine;
