//! # Resource Keys
//!
//! Canonical identity for cached resources.
//!
//! ## Canonicalization
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Key Canonicalization                               │
//! │                                                                         │
//! │  load("orders", {status: pending, page: 2})                            │
//! │  load("orders", {page: 2, status: pending})                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ResourceKey "orders?status=pending&page=2"                            │
//! │                                                                         │
//! │  Filters are held in a BTreeMap, so two parameter sets that are        │
//! │  equal as sets produce byte-identical canonical forms - and therefore  │
//! │  the same cache slot, the same in-flight join, the same subscribers.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A key with an entity id addresses a single record (`orders/42`); without
//! one it addresses a filtered collection.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Query Parameters
// =============================================================================

/// Parameters identifying one view of a resource.
///
/// Filters are sorted by construction (BTreeMap), so insertion order never
/// leaks into the canonical form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    /// Entity id for single-record keys (`orders/42`). None for collections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    /// Filter name/value pairs (`status=pending`).
    #[serde(default)]
    pub filters: BTreeMap<String, String>,

    /// Page number (1-based).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Page size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
}

impl QueryParams {
    /// Empty parameter set (the resource's default collection view).
    pub fn none() -> Self {
        QueryParams::default()
    }

    /// Parameters addressing a single entity.
    pub fn entity(id: impl Into<String>) -> Self {
        QueryParams {
            entity: Some(id.into()),
            ..Default::default()
        }
    }

    /// Adds a filter pair, replacing any previous value for the name.
    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    /// Sets pagination.
    pub fn with_page(mut self, page: u32, per_page: u32) -> Self {
        self.page = Some(page);
        self.per_page = Some(per_page);
        self
    }

    /// Returns true if this addresses a single record rather than a
    /// collection.
    pub fn is_entity(&self) -> bool {
        self.entity.is_some()
    }

    /// Query pairs in canonical (sorted) order, pagination last.
    ///
    /// This is what the transport appends to the request URL, so the wire
    /// form and the cache key agree by construction.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(page) = self.page {
            pairs.push(("page".to_string(), page.to_string()));
        }
        if let Some(per_page) = self.per_page {
            pairs.push(("per_page".to_string(), per_page.to_string()));
        }
        pairs
    }
}

// =============================================================================
// Resource Key
// =============================================================================

/// Canonical identifier for a cached resource view.
///
/// Two `ResourceKey`s compare equal iff they name the same resource type and
/// an equal parameter set. The key is the unit of caching, deduplication,
/// and subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    resource: String,
    canonical: String,
}

impl ResourceKey {
    /// Builds a key from a resource type and its parameters.
    pub fn new(resource: impl Into<String>, params: &QueryParams) -> Self {
        let resource = resource.into();
        let canonical = Self::canonicalize(&resource, params);
        ResourceKey {
            resource,
            canonical,
        }
    }

    /// The resource type this key belongs to (`orders`, `users`, ...).
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The full canonical form. Stable across processes.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// True if this key caches a view of the given resource type.
    ///
    /// Used by `invalidate(resource, all)` and by post-mutation invalidation
    /// to find every affected entry.
    pub fn is_for_resource(&self, resource: &str) -> bool {
        self.resource == resource
    }

    fn canonicalize(resource: &str, params: &QueryParams) -> String {
        let mut out = String::with_capacity(resource.len() + 16);
        out.push_str(resource);
        if let Some(entity) = &params.entity {
            out.push('/');
            out.push_str(entity);
        }
        let pairs = params.query_pairs();
        if !pairs.is_empty() {
            out.push('?');
            for (i, (k, v)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push('&');
                }
                out.push_str(k);
                out.push('=');
                out.push_str(v);
            }
        }
        out
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)
    }
}
