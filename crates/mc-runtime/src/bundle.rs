//! Inventory bundle export/import (component S): a snapshot of exported
//! resources plus the Role/Environment documents they reference, fingerprinted
//! with the canonical-form hash (component R) so a later import can detect
//! tampering before replaying it.
//!
//! Grounded on `at_daemon::daemon::Daemon` as the thing that holds references
//! to every other store and wires them together — here narrowed to the two
//! cross-store operations that need more than one store to complete.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use mc_core::canonical::{canonicalize, CanonicalizeError, Document, DocumentKind};
use mc_core::clock::Clock;
use mc_observability::{ExportResource, ExportedResource, ExportedResourceStore, SelectorError};
use mc_policy::{EnvironmentDefinition, PolicyError, RoleDefinition, RoleEnvStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryBundle {
    pub resources: Vec<ExportedResource>,
    pub roles: Vec<RoleDefinition>,
    pub environments: Vec<EnvironmentDefinition>,
    pub exported_at: DateTime<Utc>,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub resources_imported: usize,
    pub roles_upserted: usize,
    pub environments_upserted: usize,
    pub dry_run: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("selector error: {0}")]
    Selector(#[from] SelectorError),
    #[error("referenced role not found: {0}")]
    UnknownRole(String),
    #[error("referenced environment not found: {0}")]
    UnknownEnvironment(String),
    #[error("failed to canonicalize bundle: {0}")]
    Canonicalize(#[from] CanonicalizeError),
    #[error("bundle fingerprint does not match its contents")]
    FingerprintMismatch,
    #[error("policy store error: {0}")]
    Policy(#[from] PolicyError),
}

pub type Result<T> = std::result::Result<T, BundleError>;

fn attribute_str(resource: &ExportedResource, key: &str) -> Option<String> {
    match resource.attributes.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn fingerprint(resources: &[ExportedResource], roles: &[RoleDefinition], environments: &[EnvironmentDefinition]) -> Result<String> {
    let content = serde_json::json!({
        "resources": resources,
        "roles": roles,
        "environments": environments,
    });
    let doc = Document {
        kind: DocumentKind::Config,
        content: content.to_string(),
    };
    Ok(canonicalize(&doc)?.sha256)
}

/// Collects resources matching `selector`, then resolves the distinct
/// `role`/`environment` attribute values referenced by those resources
/// against `roles` so the bundle is self-contained on import.
pub fn export_bundle(
    clock: &dyn Clock,
    exported: &ExportedResourceStore,
    roles: &RoleEnvStore,
    selector: &str,
    limit: usize,
) -> Result<InventoryBundle> {
    let resources = exported.collect(selector, limit)?;

    let mut role_names = BTreeSet::new();
    let mut env_names = BTreeSet::new();
    for resource in &resources {
        if let Some(role) = attribute_str(resource, "role") {
            role_names.insert(role);
        }
        if let Some(env) = attribute_str(resource, "environment") {
            env_names.insert(env);
        }
    }

    let mut role_defs = Vec::with_capacity(role_names.len());
    for name in &role_names {
        role_defs.push(roles.get_role(name).ok_or_else(|| BundleError::UnknownRole(name.clone()))?);
    }
    let mut env_defs = Vec::with_capacity(env_names.len());
    for name in &env_names {
        env_defs.push(roles.get_environment(name).ok_or_else(|| BundleError::UnknownEnvironment(name.clone()))?);
    }

    let fp = fingerprint(&resources, &role_defs, &env_defs)?;

    Ok(InventoryBundle {
        resources,
        roles: role_defs,
        environments: env_defs,
        exported_at: clock.now(),
        fingerprint: fp,
    })
}

/// Verifies the bundle's fingerprint against its contents, then (unless
/// `dry_run`) replays its resources into `exported` and upserts its
/// Role/Environment documents into `roles`.
pub async fn import_bundle(
    exported: &ExportedResourceStore,
    roles: &RoleEnvStore,
    bundle: &InventoryBundle,
    dry_run: bool,
) -> Result<ImportOutcome> {
    let recomputed = fingerprint(&bundle.resources, &bundle.roles, &bundle.environments)?;
    if recomputed != bundle.fingerprint {
        return Err(BundleError::FingerprintMismatch);
    }

    if dry_run {
        return Ok(ImportOutcome {
            resources_imported: bundle.resources.len(),
            roles_upserted: bundle.roles.len(),
            environments_upserted: bundle.environments.len(),
            dry_run: true,
        });
    }

    for resource in &bundle.resources {
        exported.export(ExportResource {
            resource_type: resource.resource_type.clone(),
            host: resource.host.clone(),
            resource_id: resource.resource_id.clone(),
            source: resource.source.clone(),
            attributes: resource.attributes.clone(),
        });
    }
    for role in &bundle.roles {
        roles.upsert_role(role.clone()).await?;
    }
    for env in &bundle.environments {
        roles.upsert_environment(env.clone()).await?;
    }

    Ok(ImportOutcome {
        resources_imported: bundle.resources.len(),
        roles_upserted: bundle.roles.len(),
        environments_upserted: bundle.environments.len(),
        dry_run: false,
    })
}
