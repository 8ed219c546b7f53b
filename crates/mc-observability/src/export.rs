//! Bounded insertion-order ring of exported resources, with a small
//! term-based selector grammar for `Collect`.
//!
//! Grounded on `mc_queue::JobQueue`'s `VecDeque`-backed history trim
//! (oldest evicted on overflow) behind a single `RwLock`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use mc_core::clock::Clock;
use mc_core::id::IdGenerator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 5000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedResource {
    pub id: String,
    pub resource_type: String,
    pub host: Option<String>,
    pub resource_id: Option<String>,
    pub source: String,
    pub attributes: BTreeMap<String, Value>,
    pub exported_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ExportResource {
    pub resource_type: String,
    pub host: Option<String>,
    pub resource_id: Option<String>,
    pub source: String,
    pub attributes: BTreeMap<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    #[error("selector term missing '=': {0}")]
    MissingEquals(String),
}

/// A single `key=value` term from a parsed selector. `attrs.` / `attr.`
/// prefixed keys always match into `attributes`; a bare key matches a
/// well-known field if it is one, otherwise falls back to `attributes`.
/// Both `key` and `value` are stored already lowercased, so matching is
/// a plain comparison.
#[derive(Debug, Clone)]
struct Term {
    key: String,
    value: String,
}

/// Strips a single matched pair of leading/trailing `'` or `"` quote
/// characters, if present.
fn strip_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'\'' || first == b'"') && bytes[bytes.len() - 1] == first {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Grammar (spec.md §6): `term ( ("," | " and ") term )*`, each term
/// `key "=" value`. Both sides are trimmed; values may be quoted.
/// Comparisons are case-insensitive, so both sides are lowercased here.
fn parse_selector(selector: &str) -> std::result::Result<Vec<Term>, SelectorError> {
    let normalized = selector.replace(" and ", ",");
    normalized
        .split(',')
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            let (key, value) = raw
                .split_once('=')
                .ok_or_else(|| SelectorError::MissingEquals(raw.to_string()))?;
            Ok(Term {
                key: key.trim().to_lowercase(),
                value: strip_quotes(value.trim()).to_lowercase(),
            })
        })
        .collect()
}

fn matches_term(resource: &ExportedResource, term: &Term) -> bool {
    let attr_key = term
        .key
        .strip_prefix("attrs.")
        .or_else(|| term.key.strip_prefix("attr."));
    if let Some(attr_key) = attr_key {
        return attribute_equals(resource, attr_key, &term.value);
    }

    match term.key.as_str() {
        "type" => resource.resource_type.eq_ignore_ascii_case(&term.value),
        "host" => resource.host.as_deref().is_some_and(|h| h.eq_ignore_ascii_case(&term.value)),
        "resource_id" => resource.resource_id.as_deref().is_some_and(|r| r.eq_ignore_ascii_case(&term.value)),
        "source" => resource.source.eq_ignore_ascii_case(&term.value),
        key => attribute_equals(resource, key, &term.value),
    }
}

/// `key` and `value` are already lowercased; attribute map keys/string
/// values are compared case-insensitively against them.
fn attribute_equals(resource: &ExportedResource, key: &str, value: &str) -> bool {
    resource.attributes.iter().any(|(k, v)| {
        if !k.eq_ignore_ascii_case(key) {
            return false;
        }
        match v {
            Value::String(s) => s.eq_ignore_ascii_case(value),
            other => other.to_string().trim_matches('"').eq_ignore_ascii_case(value),
        }
    })
}

pub struct ExportedResourceStore {
    ring: RwLock<VecDeque<ExportedResource>>,
    capacity: usize,
    clock: std::sync::Arc<dyn Clock>,
    ids: IdGenerator,
}

impl ExportedResourceStore {
    pub fn new(clock: std::sync::Arc<dyn Clock>) -> Self {
        Self::with_capacity(clock, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(clock: std::sync::Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            ring: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            clock,
            ids: IdGenerator::new("xres"),
        }
    }

    pub fn export(&self, input: ExportResource) -> ExportedResource {
        let resource = ExportedResource {
            id: self.ids.next(),
            resource_type: input.resource_type,
            host: input.host,
            resource_id: input.resource_id,
            source: input.source,
            attributes: input.attributes,
            exported_at: self.clock.now(),
        };

        let mut ring = self.ring.write().expect("export ring lock poisoned");
        if ring.len() >= self.capacity {
            ring.pop_front();
            debug!("exported resource ring at capacity, evicted oldest");
        }
        ring.push_back(resource.clone());
        resource
    }

    /// Scans newest-first and returns up to `limit` resources matching every
    /// term in `selector` (AND semantics).
    pub fn collect(&self, selector: &str, limit: usize) -> std::result::Result<Vec<ExportedResource>, SelectorError> {
        let terms = parse_selector(selector)?;
        let ring = self.ring.read().expect("export ring lock poisoned");
        let matches = ring
            .iter()
            .rev()
            .filter(|resource| terms.iter().all(|term| matches_term(resource, term)))
            .take(limit)
            .cloned()
            .collect();
        Ok(matches)
    }

    pub fn len(&self) -> usize {
        self.ring.read().expect("export ring lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_core::clock::SystemClock;
    use std::sync::Arc;

    fn store(capacity: usize) -> ExportedResourceStore {
        ExportedResourceStore::with_capacity(Arc::new(SystemClock), capacity)
    }

    fn node(host: &str, region: &str) -> ExportResource {
        let mut attributes = BTreeMap::new();
        attributes.insert("region".to_string(), Value::String(region.to_string()));
        ExportResource {
            resource_type: "node".to_string(),
            host: Some(host.to_string()),
            resource_id: Some(host.to_string()),
            source: "inventory-sync".to_string(),
            attributes,
        }
    }

    #[test]
    fn overflow_evicts_oldest_insertion_order() {
        let store = store(2);
        store.export(node("a", "us-east"));
        store.export(node("b", "us-east"));
        store.export(node("c", "us-east"));

        assert_eq!(store.len(), 2);
        let all = store.collect("type=node", 10).unwrap();
        let hosts: Vec<_> = all.iter().map(|r| r.host.clone().unwrap()).collect();
        assert_eq!(hosts, vec!["c", "b"]);
    }

    #[test]
    fn collect_matches_well_known_and_attribute_terms() {
        let store = store(10);
        store.export(node("web-1", "us-east"));
        store.export(node("web-2", "us-west"));

        let east = store.collect("type=node and attrs.region=us-east", 10).unwrap();
        assert_eq!(east.len(), 1);
        assert_eq!(east[0].host.as_deref(), Some("web-1"));

        let bare = store.collect("region=us-west", 10).unwrap();
        assert_eq!(bare.len(), 1);
        assert_eq!(bare[0].host.as_deref(), Some("web-2"));
    }

    #[test]
    fn collect_supports_comma_separated_terms() {
        let store = store(10);
        store.export(node("web-1", "us-east"));
        store.export(node("web-2", "us-west"));

        let east = store.collect("type=node,attrs.region=us-east", 10).unwrap();
        assert_eq!(east.len(), 1);
        assert_eq!(east[0].host.as_deref(), Some("web-1"));
    }

    #[test]
    fn collect_strips_quotes_and_ignores_case() {
        let store = store(10);
        store.export(node("web-1", "us-east"));

        let quoted = store.collect(r#"TYPE="node" and ATTRS.REGION='US-EAST'"#, 10).unwrap();
        assert_eq!(quoted.len(), 1);
        assert_eq!(quoted[0].host.as_deref(), Some("web-1"));
    }

    #[test]
    fn collect_respects_limit_newest_first() {
        let store = store(10);
        for host in ["a", "b", "c"] {
            store.export(node(host, "us-east"));
        }
        let top = store.collect("type=node", 2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].host.as_deref(), Some("c"));
        assert_eq!(top[1].host.as_deref(), Some("b"));
    }

    #[test]
    fn selector_term_without_equals_is_rejected() {
        let store = store(10);
        assert!(matches!(store.collect("type", 10), Err(SelectorError::MissingEquals(_))));
    }
}
