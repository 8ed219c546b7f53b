//! Role-based access control: roles, bindings, and the wildcard/prefix
//! scope-matching access check.
//!
//! Grounded on the linear-scan-then-match shape of
//! `at-bridge/src/auth.rs`'s header check, generalized from a single
//! static secret comparison to a scan over subject-filtered bindings each
//! checked against a role's ordered permission list.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use mc_core::id::IdGenerator;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    pub action: String,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbacRole {
    pub id: String,
    pub name: String,
    pub description: String,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbacBinding {
    pub id: String,
    pub subject: String,
    pub role_id: String,
    pub scope: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: String,
    pub matched_role_id: Option<String>,
    pub matched_binding_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RbacError {
    #[error("role must have at least one permission")]
    EmptyPermissions,
    #[error("permission resource and action must be non-empty")]
    InvalidPermission,
    #[error("role not found: {0}")]
    RoleNotFound(String),
}

pub type Result<T> = std::result::Result<T, RbacError>;

/// `*` matches anything; otherwise exact match after trimming both sides.
fn token_matches(pattern: &str, value: &str) -> bool {
    let pattern = pattern.trim();
    if pattern == "*" {
        return true;
    }
    pattern == value.trim()
}

/// Empty or `*` matches anything; exact match; prefix match where
/// `scope == pattern` or `scope` starts with `pattern + "/"`.
fn scope_matches(pattern: &str, scope: &str) -> bool {
    if pattern.is_empty() || pattern == "*" {
        return true;
    }
    scope == pattern || scope.starts_with(&format!("{pattern}/"))
}

pub struct RbacStore {
    roles: RwLock<Vec<RbacRole>>,
    bindings: RwLock<Vec<RbacBinding>>,
    role_ids: IdGenerator,
    binding_ids: IdGenerator,
}

impl RbacStore {
    pub fn new() -> Self {
        Self {
            roles: RwLock::new(Vec::new()),
            bindings: RwLock::new(Vec::new()),
            role_ids: IdGenerator::new("rbac-role"),
            binding_ids: IdGenerator::new("rbac-binding"),
        }
    }

    pub fn create_role(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        permissions: Vec<Permission>,
    ) -> Result<RbacRole> {
        if permissions.is_empty() {
            return Err(RbacError::EmptyPermissions);
        }
        if permissions
            .iter()
            .any(|p| p.resource.trim().is_empty() || p.action.trim().is_empty())
        {
            return Err(RbacError::InvalidPermission);
        }

        let now = Utc::now();
        let role = RbacRole {
            id: self.role_ids.next(),
            name: name.into(),
            description: description.into(),
            permissions,
            created_at: now,
            updated_at: now,
        };
        self.roles.write().expect("roles lock poisoned").push(role.clone());
        Ok(role)
    }

    pub fn create_binding(
        &self,
        subject: impl Into<String>,
        role_id: impl Into<String>,
        scope: Option<String>,
    ) -> Result<RbacBinding> {
        let role_id = role_id.into();
        if !self
            .roles
            .read()
            .expect("roles lock poisoned")
            .iter()
            .any(|r| r.id == role_id)
        {
            return Err(RbacError::RoleNotFound(role_id));
        }

        let binding = RbacBinding {
            id: self.binding_ids.next(),
            subject: subject.into(),
            role_id,
            scope: scope.unwrap_or_else(|| "*".to_string()),
            created_at: Utc::now(),
        };
        self.bindings.write().expect("bindings lock poisoned").push(binding.clone());
        Ok(binding)
    }

    /// Linear scan over bindings filtered by subject and scope; for each
    /// match, every permission of the bound role is checked. First match
    /// wins.
    pub fn check(&self, subject: &str, resource: &str, action: &str, scope: &str) -> AccessDecision {
        let bindings = self.bindings.read().expect("bindings lock poisoned");
        let roles = self.roles.read().expect("roles lock poisoned");

        for binding in bindings.iter().filter(|b| b.subject == subject) {
            if !scope_matches(&binding.scope, scope) {
                continue;
            }
            let Some(role) = roles.iter().find(|r| r.id == binding.role_id) else {
                continue;
            };
            for permission in &role.permissions {
                if !token_matches(&permission.resource, resource) {
                    continue;
                }
                if !token_matches(&permission.action, action) {
                    continue;
                }
                if let Some(perm_scope) = &permission.scope {
                    if !scope_matches(perm_scope, scope) {
                        continue;
                    }
                }
                return AccessDecision {
                    allowed: true,
                    reason: "allowed".to_string(),
                    matched_role_id: Some(role.id.clone()),
                    matched_binding_id: Some(binding.id.clone()),
                };
            }
        }

        AccessDecision {
            allowed: false,
            reason: "no matching role binding permission".to_string(),
            matched_role_id: None,
            matched_binding_id: None,
        }
    }

    pub fn get_role(&self, role_id: &str) -> Option<RbacRole> {
        self.roles
            .read()
            .expect("roles lock poisoned")
            .iter()
            .find(|r| r.id == role_id)
            .cloned()
    }
}

impl Default for RbacStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(resource: &str, action: &str, scope: Option<&str>) -> Permission {
        Permission {
            resource: resource.to_string(),
            action: action.to_string(),
            scope: scope.map(|s| s.to_string()),
        }
    }

    #[test]
    fn prefix_scope_matches_exact_and_child_not_sibling() {
        let store = RbacStore::new();
        let role = store
            .create_role("deployer", "", vec![perm("job", "run", Some("prod"))])
            .unwrap();
        store.create_binding("alice", &role.id, Some("*".to_string())).unwrap();

        assert!(store.check("alice", "job", "run", "prod").allowed);
        assert!(store.check("alice", "job", "run", "prod/svc-a").allowed);
        assert!(!store.check("alice", "job", "run", "prod-staging").allowed);
    }

    #[test]
    fn wildcard_resource_and_action_match_anything() {
        let store = RbacStore::new();
        let role = store
            .create_role("admin", "", vec![perm("*", "*", None)])
            .unwrap();
        store.create_binding("root", &role.id, None).unwrap();
        assert!(store.check("root", "anything", "here", "anywhere").allowed);
    }

    #[test]
    fn no_match_reports_exact_reason() {
        let store = RbacStore::new();
        let decision = store.check("ghost", "job", "run", "prod");
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "no matching role binding permission");
    }

    #[test]
    fn empty_permissions_is_rejected() {
        let store = RbacStore::new();
        assert!(matches!(
            store.create_role("empty", "", vec![]),
            Err(RbacError::EmptyPermissions)
        ));
    }

    #[test]
    fn binding_to_unknown_role_is_rejected() {
        let store = RbacStore::new();
        assert!(matches!(
            store.create_binding("alice", "rbac-role-999", None),
            Err(RbacError::RoleNotFound(_))
        ));
    }
}
