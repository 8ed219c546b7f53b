//! Drift policy: scoped suppression and allowlist windows layered over
//! drift-detection output.
//!
//! Grounded on `mc_schedule::association`'s revisioned-entry shape (append-
//! only records behind an `RwLock<HashMap<..>>`), narrowed here to two
//! parallel kinds of scoped window instead of one revisioned binding.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use mc_core::clock::Clock;
use mc_core::id::IdGenerator;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftWindowKind {
    Suppression,
    Allowlist,
}

/// Mirrors `mc_catalog::maintenance::MaintenanceScopeKind`: the dimension a
/// window's `scope_value` is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftScopeKind {
    Host,
    Cluster,
    Environment,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftWindow {
    pub id: String,
    pub kind: DriftWindowKind,
    pub scope_type: DriftScopeKind,
    pub scope_value: Option<String>,
    pub until: DateTime<Utc>,
    pub reason: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub cleared: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DriftPolicyError {
    #[error("drift window not found: {0}")]
    NotFound(String),
    #[error("scope of type 'all' must not carry a scope value")]
    AllForbidsScopeValue,
    #[error("scoped drift window requires a non-empty scope value")]
    ScopeValueRequired,
}

pub type Result<T> = std::result::Result<T, DriftPolicyError>;

/// Matches a suppression/allowlist scope against a concrete host, command,
/// or resource identifier. No pattern (the `all` scope) matches anything;
/// otherwise exact or a `scope/` prefix match (mirrors the RBAC scope rule
/// in `mc_security::rbac`).
fn scope_matches(pattern: Option<&str>, value: &str) -> bool {
    let Some(pattern) = pattern else {
        return true;
    };
    pattern == value || value.starts_with(&format!("{pattern}/"))
}

pub struct DriftPolicyStore {
    windows: RwLock<HashMap<String, DriftWindow>>,
    clock: std::sync::Arc<dyn Clock>,
    ids: IdGenerator,
}

impl DriftPolicyStore {
    pub fn new(clock: std::sync::Arc<dyn Clock>) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            clock,
            ids: IdGenerator::new("drift"),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn suppress(
        &self,
        scope_type: DriftScopeKind,
        scope_value: Option<String>,
        until: DateTime<Utc>,
        reason: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Result<String> {
        self.insert(DriftWindowKind::Suppression, scope_type, scope_value, until, reason.into(), created_by.into())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn allow(
        &self,
        scope_type: DriftScopeKind,
        scope_value: Option<String>,
        until: DateTime<Utc>,
        reason: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Result<String> {
        self.insert(DriftWindowKind::Allowlist, scope_type, scope_value, until, reason.into(), created_by.into())
    }

    #[allow(clippy::too_many_arguments)]
    fn insert(
        &self,
        kind: DriftWindowKind,
        scope_type: DriftScopeKind,
        scope_value: Option<String>,
        until: DateTime<Utc>,
        reason: String,
        created_by: String,
    ) -> Result<String> {
        if scope_type == DriftScopeKind::All {
            if scope_value.is_some() {
                return Err(DriftPolicyError::AllForbidsScopeValue);
            }
        } else if scope_value.as_deref().unwrap_or("").is_empty() {
            return Err(DriftPolicyError::ScopeValueRequired);
        }

        let id = self.ids.next();
        let window = DriftWindow {
            id: id.clone(),
            kind,
            scope_type,
            scope_value,
            until,
            reason,
            created_by,
            created_at: self.clock.now(),
            cleared: false,
        };
        info!(drift_window_id = %id, kind = ?window.kind, scope_type = ?window.scope_type, scope_value = ?window.scope_value, "drift window created");
        self.windows.write().expect("drift windows lock poisoned").insert(id.clone(), window);
        Ok(id)
    }

    pub fn clear_suppression(&self, id: &str) -> Result<bool> {
        let mut windows = self.windows.write().expect("drift windows lock poisoned");
        let window = windows.get_mut(id).ok_or_else(|| DriftPolicyError::NotFound(id.to_string()))?;
        if window.cleared {
            return Ok(false);
        }
        window.cleared = true;
        Ok(true)
    }

    /// True if any active, unexpired suppression matches `value` under
    /// `scope`, and no matching allowlist entry overrides it. An allowlist
    /// entry always wins over a covering suppression: an explicit allow is
    /// a stronger operator signal than a blanket suppression.
    pub fn is_suppressed(&self, scope_type: DriftScopeKind, value: &str) -> bool {
        let now = self.clock.now();
        let windows = self.windows.read().expect("drift windows lock poisoned");

        let active = |w: &&DriftWindow| {
            !w.cleared
                && w.until > now
                && (w.scope_type == DriftScopeKind::All || w.scope_type == scope_type)
                && scope_matches(w.scope_value.as_deref(), value)
        };

        let allowed = windows
            .values()
            .filter(|w| w.kind == DriftWindowKind::Allowlist)
            .any(|w| active(&w));
        if allowed {
            return false;
        }

        windows
            .values()
            .filter(|w| w.kind == DriftWindowKind::Suppression)
            .any(|w| active(&w))
    }

    pub fn get(&self, id: &str) -> Option<DriftWindow> {
        self.windows.read().expect("drift windows lock poisoned").get(id).cloned()
    }
}
