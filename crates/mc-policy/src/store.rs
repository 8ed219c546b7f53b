//! File-backed Role and Environment documents, and hierarchical role
//! attribute resolution.
//!
//! Grounded on `at-core/src/config.rs`'s load-or-default, pretty-printed
//! JSON persistence idiom, generalized from a single `~/.auto-tundra`
//! document to a directory of per-name documents scanned at construction
//! (the teacher's `Config::load_from` gives the load idiom; the directory
//! scan itself has no teacher precedent and is built in that same idiom).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionSource {
    Api,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    #[serde(default)]
    pub profiles: Vec<String>,
    #[serde(default)]
    pub run_list: Vec<String>,
    #[serde(default)]
    pub policy_group: String,
    #[serde(default)]
    pub default_attributes: Map<String, Value>,
    #[serde(default)]
    pub override_attributes: Map<String, Value>,
    pub source: DefinitionSource,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentDefinition {
    pub name: String,
    #[serde(default)]
    pub policy_group: String,
    #[serde(default)]
    pub default_attributes: Map<String, Value>,
    #[serde(default)]
    pub override_attributes: Map<String, Value>,
    #[serde(default)]
    pub run_list_overrides: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub policy_overrides: Map<String, Value>,
    pub source: DefinitionSource,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("name is required")]
    NameRequired,
    #[error("role not found: {0}")]
    RoleNotFound(String),
    #[error("environment not found: {0}")]
    EnvironmentNotFound(String),
    #[error("role profile inheritance cycle detected")]
    ProfileCycle,
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

pub type Result<T> = std::result::Result<T, PolicyError>;

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// The fully resolved view of a role within an environment, plus the
/// audit trail of attribute layers applied, innermost last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedPolicy {
    pub run_list: Vec<String>,
    pub policy_group: String,
    pub attributes: Map<String, Value>,
    pub precedence: Vec<String>,
}

pub struct RoleEnvStore {
    base_dir: PathBuf,
    roles: RwLock<HashMap<String, RoleDefinition>>,
    environments: RwLock<HashMap<String, EnvironmentDefinition>>,
}

impl RoleEnvStore {
    fn roles_dir(base_dir: &Path) -> PathBuf {
        base_dir.join(".masterchef").join("policy").join("roles")
    }

    fn environments_dir(base_dir: &Path) -> PathBuf {
        base_dir.join(".masterchef").join("policy").join("environments")
    }

    /// Loads every `*.json` file in both directories. Files that fail to
    /// parse or whose `name` is empty are silently treated as absent.
    pub async fn load(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let roles = Self::scan_dir::<RoleDefinition>(&Self::roles_dir(&base_dir))
            .await
            .into_iter()
            .map(|r| (normalize(&r.name), r))
            .collect();
        let environments = Self::scan_dir::<EnvironmentDefinition>(&Self::environments_dir(&base_dir))
            .await
            .into_iter()
            .map(|e| (normalize(&e.name), e))
            .collect();

        Ok(Self {
            base_dir,
            roles: RwLock::new(roles),
            environments: RwLock::new(environments),
        })
    }

    async fn scan_dir<T>(dir: &Path) -> Vec<T>
    where
        T: for<'de> Deserialize<'de> + NamedDocument,
    {
        let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
            return Vec::new();
        };

        let mut out = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(text) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            match serde_json::from_str::<T>(&text) {
                Ok(doc) if !doc.name().trim().is_empty() => out.push(doc),
                Ok(_) => warn!(path = %path.display(), "ignoring document with empty name"),
                Err(e) => warn!(path = %path.display(), error = %e, "ignoring unparseable document"),
            }
        }
        out
    }

    pub async fn upsert_role(&self, mut role: RoleDefinition) -> Result<RoleDefinition> {
        if role.name.trim().is_empty() {
            return Err(PolicyError::NameRequired);
        }
        role.name = normalize(&role.name);
        role.updated_at = Utc::now();

        self.write_document(&Self::roles_dir(&self.base_dir), &role.name, &role).await?;
        self.roles
            .write()
            .expect("roles lock poisoned")
            .insert(role.name.clone(), role.clone());
        info!(role = %role.name, "role upserted");
        Ok(role)
    }

    pub async fn upsert_environment(&self, mut env: EnvironmentDefinition) -> Result<EnvironmentDefinition> {
        if env.name.trim().is_empty() {
            return Err(PolicyError::NameRequired);
        }
        env.name = normalize(&env.name);
        env.updated_at = Utc::now();

        self.write_document(&Self::environments_dir(&self.base_dir), &env.name, &env).await?;
        self.environments
            .write()
            .expect("environments lock poisoned")
            .insert(env.name.clone(), env.clone());
        info!(environment = %env.name, "environment upserted");
        Ok(env)
    }

    async fn write_document<T: Serialize>(&self, dir: &Path, name: &str, doc: &T) -> Result<()> {
        tokio::fs::create_dir_all(dir).await.map_err(|e| PolicyError::Io(e.to_string()))?;
        let path = dir.join(format!("{name}.json"));
        let mut json = serde_json::to_string_pretty(doc).map_err(|e| PolicyError::Serde(e.to_string()))?;
        json.push('\n');
        tokio::fs::write(&path, json).await.map_err(|e| PolicyError::Io(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o644);
            tokio::fs::set_permissions(&path, perms).await.map_err(|e| PolicyError::Io(e.to_string()))?;
        }
        Ok(())
    }

    pub fn get_role(&self, name: &str) -> Option<RoleDefinition> {
        self.roles.read().expect("roles lock poisoned").get(&normalize(name)).cloned()
    }

    pub fn get_environment(&self, name: &str) -> Option<EnvironmentDefinition> {
        self.environments
            .read()
            .expect("environments lock poisoned")
            .get(&normalize(name))
            .cloned()
    }

    /// Resolves a role's hierarchical attributes within an environment's
    /// overlay (spec §4.I).
    pub fn resolve(&self, role_name: &str, env_name: &str) -> Result<ResolvedPolicy> {
        let roles = self.roles.read().expect("roles lock poisoned");
        let environments = self.environments.read().expect("environments lock poisoned");

        let role_name = normalize(role_name);
        let env_name = normalize(env_name);

        let role = roles
            .get(&role_name)
            .ok_or_else(|| PolicyError::RoleNotFound(role_name.clone()))?;
        let env = environments
            .get(&env_name)
            .ok_or_else(|| PolicyError::EnvironmentNotFound(env_name.clone()))?;

        let chain = expand_profile_chain(&role_name, &roles)?;

        let mut run_list = Vec::new();
        let mut role_default = Map::new();
        let mut role_override = Map::new();
        let mut policy_group = String::new();
        let mut precedence = Vec::new();

        // Outermost ancestor first, the queried role last ("innermost").
        for name in &chain {
            let r = roles.get(name).expect("chain members resolved from roles map");
            run_list.extend(r.run_list.iter().cloned());
            deep_merge_map(&mut role_default, &r.default_attributes);
            deep_merge_map(&mut role_override, &r.override_attributes);
            if !r.policy_group.trim().is_empty() {
                policy_group = r.policy_group.clone();
            }
            precedence.push(format!("role[{name}].default_attributes"));
        }
        for name in &chain {
            precedence.push(format!("role[{name}].override_attributes"));
        }

        let resolved_run_list = env
            .run_list_overrides
            .get(&role_name)
            .cloned()
            .unwrap_or(run_list);

        let mut attributes = Map::new();
        deep_merge_map(&mut attributes, &role_default);
        deep_merge_map(&mut attributes, &env.default_attributes);
        deep_merge_map(&mut attributes, &role_override);
        deep_merge_map(&mut attributes, &env.override_attributes);
        deep_merge_map(&mut attributes, &env.policy_overrides);

        precedence.push("environment.default_attributes".to_string());
        precedence.push("environment.override_attributes".to_string());
        precedence.push("environment.policy_overrides".to_string());

        if !env.policy_group.trim().is_empty() {
            policy_group = env.policy_group.clone();
        }

        Ok(ResolvedPolicy {
            run_list: resolved_run_list,
            policy_group,
            attributes,
            precedence,
        })
    }
}

trait NamedDocument {
    fn name(&self) -> &str;
}

impl NamedDocument for RoleDefinition {
    fn name(&self) -> &str {
        &self.name
    }
}

impl NamedDocument for EnvironmentDefinition {
    fn name(&self) -> &str {
        &self.name
    }
}

/// DFS-expands `profiles` (parent role names) into an ordered chain from
/// outermost ancestor to the queried role, detecting cycles via a
/// visiting set.
fn expand_profile_chain(
    role_name: &str,
    roles: &HashMap<String, RoleDefinition>,
) -> Result<Vec<String>> {
    let mut chain = Vec::new();
    let mut visiting = std::collections::HashSet::new();
    expand_into(role_name, roles, &mut visiting, &mut chain)?;
    Ok(chain)
}

fn expand_into(
    name: &str,
    roles: &HashMap<String, RoleDefinition>,
    visiting: &mut std::collections::HashSet<String>,
    chain: &mut Vec<String>,
) -> Result<()> {
    if !visiting.insert(name.to_string()) {
        return Err(PolicyError::ProfileCycle);
    }
    if let Some(role) = roles.get(name) {
        for parent in &role.profiles {
            expand_into(&normalize(parent), roles, visiting, chain)?;
        }
    }
    chain.push(name.to_string());
    Ok(())
}

/// Deep merge: when both sides of a key are objects, recurse; otherwise
/// the overlay value replaces. Values are deep-cloned (`serde_json::Value`
/// clone is already a deep clone) so the caller cannot mutate internal
/// state through the result.
fn deep_merge_map(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, overlay_value) in overlay {
        match base.get_mut(key) {
            Some(Value::Object(base_obj)) => {
                if let Value::Object(overlay_obj) = overlay_value {
                    deep_merge_map(base_obj, overlay_obj);
                    continue;
                }
                base.insert(key.clone(), overlay_value.clone());
            }
            _ => {
                base.insert(key.clone(), overlay_value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn role(name: &str, profiles: Vec<&str>, run_list: Vec<&str>, default_level: Option<&str>) -> RoleDefinition {
        let mut default_attributes = Map::new();
        if let Some(level) = default_level {
            default_attributes.insert("level".into(), json!(level));
        }
        RoleDefinition {
            name: name.to_string(),
            profiles: profiles.into_iter().map(String::from).collect(),
            run_list: run_list.into_iter().map(String::from).collect(),
            policy_group: String::new(),
            default_attributes,
            override_attributes: Map::new(),
            source: DefinitionSource::Api,
            updated_at: Utc::now(),
        }
    }

    fn environment(name: &str) -> EnvironmentDefinition {
        EnvironmentDefinition {
            name: name.to_string(),
            policy_group: String::new(),
            default_attributes: Map::new(),
            override_attributes: Map::new(),
            run_list_overrides: HashMap::new(),
            policy_overrides: Map::new(),
            source: DefinitionSource::Api,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn s2_role_env_resolve() {
        let dir = tempdir().unwrap();
        let store = RoleEnvStore::load(dir.path()).await.unwrap();

        store.upsert_role(role("base", vec![], vec!["recipe[base]"], Some("role-default"))).await.unwrap();
        store.upsert_role(role("app", vec!["base"], vec!["recipe[app]"], None)).await.unwrap();

        let mut env = environment("prod");
        env.run_list_overrides.insert(
            "app".to_string(),
            vec!["recipe[base]".to_string(), "recipe[app-prod]".to_string()],
        );
        env.override_attributes.insert("level".into(), json!("env-override"));
        store.upsert_environment(env).await.unwrap();

        let resolved = store.resolve("app", "prod").unwrap();
        assert_eq!(
            resolved.run_list,
            vec!["recipe[base]".to_string(), "recipe[app-prod]".to_string()]
        );
        assert_eq!(resolved.attributes.get("level").unwrap(), &json!("env-override"));
    }

    #[tokio::test]
    async fn s3_role_cycle_is_detected() {
        let dir = tempdir().unwrap();
        let store = RoleEnvStore::load(dir.path()).await.unwrap();
        store.upsert_role(role("a", vec!["b"], vec![], None)).await.unwrap();
        store.upsert_role(role("b", vec!["a"], vec![], None)).await.unwrap();
        store.upsert_environment(environment("prod")).await.unwrap();

        assert!(matches!(store.resolve("a", "prod"), Err(PolicyError::ProfileCycle)));
    }

    #[tokio::test]
    async fn upsert_persists_pretty_json_to_disk() {
        let dir = tempdir().unwrap();
        let store = RoleEnvStore::load(dir.path()).await.unwrap();
        store.upsert_role(role("base", vec![], vec![], None)).await.unwrap();

        let path = RoleEnvStore::roles_dir(dir.path()).join("base.json");
        let text = tokio::fs::read_to_string(path).await.unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("\"name\""));
    }

    #[tokio::test]
    async fn reload_from_disk_ignores_unparseable_and_unnamed_documents() {
        let dir = tempdir().unwrap();
        let store = RoleEnvStore::load(dir.path()).await.unwrap();
        store.upsert_role(role("base", vec![], vec![], None)).await.unwrap();

        let roles_dir = RoleEnvStore::roles_dir(dir.path());
        tokio::fs::write(roles_dir.join("broken.json"), "{ not json").await.unwrap();
        tokio::fs::write(roles_dir.join("empty.json"), r#"{"name":"","source":"file","updated_at":"2024-01-01T00:00:00Z"}"#).await.unwrap();

        let reloaded = RoleEnvStore::load(dir.path()).await.unwrap();
        assert!(reloaded.get_role("base").is_some());
    }

    #[test]
    fn deep_merge_recurses_into_nested_objects() {
        let mut base = Map::new();
        base.insert("nested".into(), json!({"a": 1, "b": 1}));
        let mut overlay = Map::new();
        overlay.insert("nested".into(), json!({"b": 2, "c": 3}));

        deep_merge_map(&mut base, &overlay);
        assert_eq!(base.get("nested").unwrap(), &json!({"a": 1, "b": 2, "c": 3}));
    }
}
