//! Workspace templates: named, reusable seeds for role/environment
//! bootstrap, instantiated by deep-merging operator overrides over the
//! template's defaults.

use std::collections::HashMap;
use std::sync::RwLock;

use mc_core::id::IdGenerator;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceTemplate {
    pub id: String,
    pub name: String,
    pub run_list: Vec<String>,
    pub default_attributes: Map<String, Value>,
    pub policy_group: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateWorkspaceTemplate {
    pub name: String,
    pub run_list: Vec<String>,
    pub default_attributes: Map<String, Value>,
    pub policy_group: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Instantiated {
    pub run_list: Vec<String>,
    pub attributes: Map<String, Value>,
    pub policy_group: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("workspace template not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, TemplateError>;

/// Recurses into nested objects; lists and scalars replace, matching the
/// role/environment resolver's deep-merge rule.
pub(crate) fn deep_merge(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, overlay_value) in overlay {
        match (merged.get(key), overlay_value) {
            (Some(Value::Object(base_obj)), Value::Object(overlay_obj)) => {
                merged.insert(key.clone(), Value::Object(deep_merge(base_obj, overlay_obj)));
            }
            _ => {
                merged.insert(key.clone(), overlay_value.clone());
            }
        }
    }
    merged
}

pub struct WorkspaceTemplateStore {
    templates: RwLock<HashMap<String, WorkspaceTemplate>>,
    ids: IdGenerator,
}

impl Default for WorkspaceTemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceTemplateStore {
    pub fn new() -> Self {
        Self {
            templates: RwLock::new(HashMap::new()),
            ids: IdGenerator::new("wstpl"),
        }
    }

    pub fn create(&self, input: CreateWorkspaceTemplate) -> WorkspaceTemplate {
        let template = WorkspaceTemplate {
            id: self.ids.next(),
            name: input.name,
            run_list: input.run_list,
            default_attributes: input.default_attributes,
            policy_group: input.policy_group,
        };
        self.templates.write().expect("templates lock poisoned").insert(template.name.clone(), template.clone());
        template
    }

    pub fn get_by_name(&self, name: &str) -> Option<WorkspaceTemplate> {
        self.templates.read().expect("templates lock poisoned").get(name).cloned()
    }

    pub fn instantiate(&self, name: &str, overrides: &Map<String, Value>) -> Result<Instantiated> {
        let template = self.get_by_name(name).ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        Ok(Instantiated {
            run_list: template.run_list,
            attributes: deep_merge(&template.default_attributes, overrides),
            policy_group: template.policy_group,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> WorkspaceTemplateStore {
        WorkspaceTemplateStore::new()
    }

    fn default_attrs() -> Map<String, Value> {
        match json!({"level": "template-default", "nested": {"a": 1, "b": 2}}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn instantiate_deep_merges_overrides_over_template_defaults() {
        let store = store();
        store.create(CreateWorkspaceTemplate {
            name: "web-base".to_string(),
            run_list: vec!["recipe[base]".to_string()],
            default_attributes: default_attrs(),
            policy_group: Some("web".to_string()),
        });

        let overrides = match json!({"level": "override", "nested": {"b": 99}}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };

        let instantiated = store.instantiate("web-base", &overrides).unwrap();
        assert_eq!(instantiated.run_list, vec!["recipe[base]".to_string()]);
        assert_eq!(instantiated.attributes.get("level").unwrap(), "override");
        assert_eq!(instantiated.attributes["nested"]["a"], 1);
        assert_eq!(instantiated.attributes["nested"]["b"], 99);
    }

    #[test]
    fn instantiate_unknown_template_is_not_found() {
        let store = store();
        assert!(matches!(store.instantiate("missing", &Map::new()), Err(TemplateError::NotFound(_))));
    }
}
