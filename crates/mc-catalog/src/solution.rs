//! Solution packs: a catalog of which roles, environments, and workspace
//! templates ship together, validated against the stores that own those
//! entities.

use std::collections::HashMap;
use std::sync::RwLock;

use mc_core::id::IdGenerator;
use mc_policy::RoleEnvStore;
use serde::{Deserialize, Serialize};

use crate::template::WorkspaceTemplateStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionPack {
    pub id: String,
    pub name: String,
    pub version: String,
    pub roles: Vec<String>,
    pub environments: Vec<String>,
    pub templates: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CreateSolutionPack {
    pub name: String,
    pub version: String,
    pub roles: Vec<String>,
    pub environments: Vec<String>,
    pub templates: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub allowed: bool,
    pub blocked_reason: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SolutionPackError {
    #[error("solution pack not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, SolutionPackError>;

pub struct SolutionPackStore {
    packs: RwLock<HashMap<String, SolutionPack>>,
    ids: IdGenerator,
}

impl Default for SolutionPackStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SolutionPackStore {
    pub fn new() -> Self {
        Self {
            packs: RwLock::new(HashMap::new()),
            ids: IdGenerator::new("solpack"),
        }
    }

    pub fn create(&self, input: CreateSolutionPack) -> SolutionPack {
        let pack = SolutionPack {
            id: self.ids.next(),
            name: input.name,
            version: input.version,
            roles: input.roles,
            environments: input.environments,
            templates: input.templates,
        };
        self.packs.write().expect("packs lock poisoned").insert(pack.id.clone(), pack.clone());
        pack
    }

    /// Allowed iff every referenced role/environment/template resolves;
    /// reports the first dangling reference in roles/environments/templates
    /// order.
    pub fn validate(&self, pack_id: &str, roles: &RoleEnvStore, templates: &WorkspaceTemplateStore) -> Result<Plan> {
        let packs = self.packs.read().expect("packs lock poisoned");
        let pack = packs.get(pack_id).ok_or_else(|| SolutionPackError::NotFound(pack_id.to_string()))?;

        for role in &pack.roles {
            if roles.get_role(role).is_none() {
                return Ok(Plan { allowed: false, blocked_reason: Some(format!("role not found: {role}")) });
            }
        }
        for env in &pack.environments {
            if roles.get_environment(env).is_none() {
                return Ok(Plan { allowed: false, blocked_reason: Some(format!("environment not found: {env}")) });
            }
        }
        for template in &pack.templates {
            if templates.get_by_name(template).is_none() {
                return Ok(Plan { allowed: false, blocked_reason: Some(format!("workspace template not found: {template}")) });
            }
        }

        Ok(Plan { allowed: true, blocked_reason: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::CreateWorkspaceTemplate;
    use chrono::Utc;
    use mc_policy::{DefinitionSource, EnvironmentDefinition, RoleDefinition};
    use serde_json::Map;
    use tempfile::TempDir;

    async fn role_env_store() -> (TempDir, RoleEnvStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RoleEnvStore::load(dir.path().to_path_buf()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn all_references_resolving_is_allowed() {
        let (_dir, roles) = role_env_store().await;
        roles
            .upsert_role(RoleDefinition {
                name: "web".to_string(),
                profiles: vec![],
                run_list: vec!["recipe[web]".to_string()],
                policy_group: String::new(),
                default_attributes: Map::new(),
                override_attributes: Map::new(),
                source: DefinitionSource::Api,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        roles
            .upsert_environment(EnvironmentDefinition {
                name: "prod".to_string(),
                policy_group: String::new(),
                default_attributes: Map::new(),
                override_attributes: Map::new(),
                run_list_overrides: Default::default(),
                policy_overrides: Map::new(),
                source: DefinitionSource::Api,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let templates = WorkspaceTemplateStore::new();
        templates.create(CreateWorkspaceTemplate {
            name: "web-base".to_string(),
            run_list: vec!["recipe[base]".to_string()],
            default_attributes: Map::new(),
            policy_group: None,
        });

        let packs = SolutionPackStore::new();
        let pack = packs.create(CreateSolutionPack {
            name: "web-stack".to_string(),
            version: "1.0.0".to_string(),
            roles: vec!["web".to_string()],
            environments: vec!["prod".to_string()],
            templates: vec!["web-base".to_string()],
        });

        let plan = packs.validate(&pack.id, &roles, &templates).unwrap();
        assert!(plan.allowed);
    }

    #[tokio::test]
    async fn dangling_role_reference_is_reported_first() {
        let (_dir, roles) = role_env_store().await;
        let templates = WorkspaceTemplateStore::new();
        let packs = SolutionPackStore::new();
        let pack = packs.create(CreateSolutionPack {
            name: "web-stack".to_string(),
            version: "1.0.0".to_string(),
            roles: vec!["missing-role".to_string()],
            environments: vec!["missing-env".to_string()],
            templates: vec![],
        });

        let plan = packs.validate(&pack.id, &roles, &templates).unwrap();
        assert!(!plan.allowed);
        assert_eq!(plan.blocked_reason.unwrap(), "role not found: missing-role");
    }
}
