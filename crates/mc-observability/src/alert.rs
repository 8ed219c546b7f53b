//! Fingerprint-deduplicated alert ingestion with severity promotion and
//! suppression-window gating.
//!
//! Grounded on the DashMap-per-key store shape of `mc_queue::JobQueue`,
//! narrowed to key by a computed fingerprint instead of a minted id.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mc_core::clock::Clock;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    ChatOps,
    Pager,
    Log,
}

impl Severity {
    fn route(&self) -> Route {
        match self {
            Severity::Critical | Severity::High => Route::Pager,
            Severity::Medium => Route::ChatOps,
            Severity::Low => Route::Log,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertItem {
    pub fingerprint: String,
    pub event_type: String,
    pub message: String,
    pub severity: Severity,
    pub fields: std::collections::BTreeMap<String, String>,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub route: Route,
}

#[derive(Debug, Clone)]
pub struct IngestAlert {
    pub fingerprint: Option<String>,
    pub event_type: String,
    pub message: String,
    pub severity: Severity,
    pub fields: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub suppressed: bool,
    pub deduplicated: bool,
    pub item: Option<AlertItem>,
}

/// Computes `eventType|k1=v1|...|msg=message` with fields sorted by key.
pub fn default_fingerprint(event_type: &str, fields: &std::collections::BTreeMap<String, String>, message: &str) -> String {
    let mut parts = vec![event_type.to_string()];
    for (k, v) in fields {
        parts.push(format!("{k}={v}"));
    }
    parts.push(format!("msg={message}"));
    parts.join("|")
}

const ALERT_EVENT_PREFIX: &str = "external.alert.";
const ALERT_SUFFIX_PATTERNS: &[&str] = &[".saturation.predicted", ".degraded", ".failure"];

/// Whether an event's type alone marks it as alert-worthy.
pub fn is_alert_worthy(event_type: &str) -> bool {
    if event_type.starts_with(ALERT_EVENT_PREFIX) {
        return true;
    }
    ALERT_SUFFIX_PATTERNS.iter().any(|suffix| event_type.ends_with(suffix))
}

pub struct AlertInbox {
    items: DashMap<String, AlertItem>,
    suppressions: RwLock<std::collections::HashMap<String, (DateTime<Utc>, String)>>,
    clock: std::sync::Arc<dyn Clock>,
}

impl AlertInbox {
    pub fn new(clock: std::sync::Arc<dyn Clock>) -> Self {
        Self {
            items: DashMap::new(),
            suppressions: RwLock::new(std::collections::HashMap::new()),
            clock,
        }
    }

    pub fn suppress(&self, fingerprint: impl Into<String>, until: DateTime<Utc>, reason: impl Into<String>) {
        self.suppressions
            .write()
            .expect("suppressions lock poisoned")
            .insert(fingerprint.into(), (until, reason.into()));
    }

    /// Only `IngestEvent`-style callers need `is_alert_worthy` gating;
    /// direct `Ingest` calls always attempt to create/update an item.
    pub fn ingest(&self, alert: IngestAlert) -> IngestOutcome {
        let fingerprint = alert
            .fingerprint
            .clone()
            .unwrap_or_else(|| default_fingerprint(&alert.event_type, &alert.fields, &alert.message));

        let now = self.clock.now();
        if let Some((until, _)) = self.suppressions.read().expect("suppressions lock poisoned").get(&fingerprint) {
            if now < *until {
                return IngestOutcome {
                    suppressed: true,
                    deduplicated: false,
                    item: None,
                };
            }
        }

        use dashmap::mapref::entry::Entry;
        let (item, deduplicated) = match self.items.entry(fingerprint.clone()) {
            Entry::Occupied(mut occ) => {
                let existing = occ.get_mut();
                existing.count += 1;
                existing.last_seen = now;
                existing.severity = existing.severity.max(alert.severity);
                existing.route = existing.severity.route();
                (existing.clone(), true)
            }
            Entry::Vacant(vac) => {
                let item = AlertItem {
                    fingerprint: fingerprint.clone(),
                    event_type: alert.event_type,
                    message: alert.message,
                    severity: alert.severity,
                    fields: alert.fields,
                    count: 1,
                    first_seen: now,
                    last_seen: now,
                    route: alert.severity.route(),
                };
                vac.insert(item.clone());
                (item, false)
            }
        };

        info!(fingerprint = %fingerprint, severity = ?item.severity, count = item.count, "alert ingested");
        IngestOutcome {
            suppressed: false,
            deduplicated,
            item: Some(item),
        }
    }

    /// Infers alert-worthiness from the event type before ingesting.
    /// Returns `None` if the event type is not alert-worthy.
    pub fn ingest_event(&self, alert: IngestAlert) -> Option<IngestOutcome> {
        if !is_alert_worthy(&alert.event_type) {
            return None;
        }
        Some(self.ingest(alert))
    }

    pub fn get(&self, fingerprint: &str) -> Option<AlertItem> {
        self.items.get(fingerprint).map(|e| e.clone())
    }
}
