//! Maintenance windows: scoped time ranges during which a target is
//! treated as "in maintenance" (same scope shape as the drift allowlist).

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use mc_core::id::IdGenerator;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceScopeKind {
    Host,
    Cluster,
    Environment,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub id: String,
    pub scope_type: MaintenanceScopeKind,
    pub scope_value: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reason: String,
    pub created_by: String,
}

#[derive(Debug, Clone)]
pub struct CreateMaintenanceWindow {
    pub scope_type: MaintenanceScopeKind,
    pub scope_value: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reason: String,
    pub created_by: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    #[error("maintenance window end must be after start")]
    EndNotAfterStart,
    #[error("scope of type 'all' must not carry a scope value")]
    AllForbidsScopeValue,
    #[error("scoped maintenance window requires a non-empty scope value")]
    ScopeValueRequired,
}

pub type Result<T> = std::result::Result<T, MaintenanceError>;

pub struct MaintenanceWindowStore {
    windows: RwLock<HashMap<String, MaintenanceWindow>>,
    ids: IdGenerator,
}

impl Default for MaintenanceWindowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MaintenanceWindowStore {
    pub fn new() -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            ids: IdGenerator::new("maint"),
        }
    }

    pub fn create(&self, input: CreateMaintenanceWindow) -> Result<MaintenanceWindow> {
        if input.end <= input.start {
            return Err(MaintenanceError::EndNotAfterStart);
        }
        if input.scope_type == MaintenanceScopeKind::All {
            if input.scope_value.is_some() {
                return Err(MaintenanceError::AllForbidsScopeValue);
            }
        } else if input.scope_value.as_deref().unwrap_or("").is_empty() {
            return Err(MaintenanceError::ScopeValueRequired);
        }

        let window = MaintenanceWindow {
            id: self.ids.next(),
            scope_type: input.scope_type,
            scope_value: input.scope_value,
            start: input.start,
            end: input.end,
            reason: input.reason,
            created_by: input.created_by,
        };
        self.windows.write().expect("maintenance lock poisoned").insert(window.id.clone(), window.clone());
        Ok(window)
    }

    /// A target is in maintenance iff `now` falls in `[start, end)` for any
    /// window whose scope matches `scope_type`/`scope_value`.
    pub fn in_maintenance(&self, scope_type: MaintenanceScopeKind, scope_value: &str, now: DateTime<Utc>) -> bool {
        let windows = self.windows.read().expect("maintenance lock poisoned");
        windows.values().any(|w| {
            let scope_matches = w.scope_type == MaintenanceScopeKind::All
                || (w.scope_type == scope_type && w.scope_value.as_deref() == Some(scope_value));
            scope_matches && now >= w.start && now < w.end
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(store: &MaintenanceWindowStore, scope_type: MaintenanceScopeKind, scope_value: Option<&str>, start_offset_h: i64, end_offset_h: i64) -> MaintenanceWindow {
        let now = Utc::now();
        store
            .create(CreateMaintenanceWindow {
                scope_type,
                scope_value: scope_value.map(|s| s.to_string()),
                start: now + chrono::Duration::hours(start_offset_h),
                end: now + chrono::Duration::hours(end_offset_h),
                reason: "patching".to_string(),
                created_by: "operator".to_string(),
            })
            .unwrap()
    }

    #[test]
    fn active_window_matches_exact_scope() {
        let store = MaintenanceWindowStore::new();
        window(&store, MaintenanceScopeKind::Host, Some("db-01"), -1, 1);
        assert!(store.in_maintenance(MaintenanceScopeKind::Host, "db-01", Utc::now()));
        assert!(!store.in_maintenance(MaintenanceScopeKind::Host, "db-02", Utc::now()));
    }

    #[test]
    fn all_scope_matches_everything() {
        let store = MaintenanceWindowStore::new();
        window(&store, MaintenanceScopeKind::All, None, -1, 1);
        assert!(store.in_maintenance(MaintenanceScopeKind::Host, "db-01", Utc::now()));
        assert!(store.in_maintenance(MaintenanceScopeKind::Environment, "prod", Utc::now()));
    }

    #[test]
    fn window_outside_time_range_does_not_match() {
        let store = MaintenanceWindowStore::new();
        window(&store, MaintenanceScopeKind::Host, Some("db-01"), 2, 4);
        assert!(!store.in_maintenance(MaintenanceScopeKind::Host, "db-01", Utc::now()));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let store = MaintenanceWindowStore::new();
        let now = Utc::now();
        let result = store.create(CreateMaintenanceWindow {
            scope_type: MaintenanceScopeKind::Host,
            scope_value: Some("db-01".to_string()),
            start: now,
            end: now - chrono::Duration::hours(1),
            reason: "oops".to_string(),
            created_by: "operator".to_string(),
        });
        assert!(matches!(result, Err(MaintenanceError::EndNotAfterStart)));
    }

    #[test]
    fn all_scope_with_value_is_rejected() {
        let store = MaintenanceWindowStore::new();
        let now = Utc::now();
        let result = store.create(CreateMaintenanceWindow {
            scope_type: MaintenanceScopeKind::All,
            scope_value: Some("db-01".to_string()),
            start: now,
            end: now + chrono::Duration::hours(1),
            reason: "oops".to_string(),
            created_by: "operator".to_string(),
        });
        assert!(matches!(result, Err(MaintenanceError::AllForbidsScopeValue)));
    }
}
