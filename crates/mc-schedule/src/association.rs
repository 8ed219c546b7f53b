//! Binds a configuration path to a target with its own schedule and an
//! append-only, replayable revision history.
//!
//! Grounded on `at-core/src/session_store.rs`'s persistence idiom
//! (load-or-create, mutate, write back) generalized from a single mutable
//! document to an append-only revision log — the shape `at-core` uses for
//! its cache history is the closest teacher precedent for "every mutation
//! appends an entry".

use std::sync::RwLock;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use mc_core::clock::Clock;
use mc_core::id::IdGenerator;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::scheduler::{ScheduleOptions, ScheduleTarget, Scheduler, SchedulerError, TargetKind};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Association {
    pub id: String,
    pub config_path: String,
    pub target_kind: TargetKind,
    pub target_name: String,
    pub priority: i32,
    pub interval_secs: u64,
    pub jitter_secs: u64,
    pub enabled: bool,
    pub schedule_id: String,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionAction {
    Create,
    Enable,
    Disable,
    Replay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationRevision {
    pub revision: u64,
    pub action: RevisionAction,
    pub created_at: DateTime<Utc>,
    pub snapshot: Association,
}

#[derive(Debug, Clone)]
pub struct CreateAssociation {
    pub config_path: String,
    pub target_kind: TargetKind,
    pub target_name: String,
    pub priority: i32,
    pub interval: StdDuration,
    pub jitter: StdDuration,
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AssociationError {
    #[error("association not found: {0}")]
    NotFound(String),
    #[error("unknown revision {revision} for association {id}")]
    UnknownRevision { id: String, revision: u64 },
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

pub type Result<T> = std::result::Result<T, AssociationError>;

// ---------------------------------------------------------------------------
// AssociationStore
// ---------------------------------------------------------------------------

struct Entry {
    association: Association,
    history: Vec<AssociationRevision>,
}

pub struct AssociationStore {
    scheduler: std::sync::Arc<Scheduler>,
    clock: std::sync::Arc<dyn Clock>,
    entries: RwLock<std::collections::HashMap<String, Entry>>,
    ids: IdGenerator,
}

impl AssociationStore {
    pub fn new(scheduler: std::sync::Arc<Scheduler>, clock: std::sync::Arc<dyn Clock>) -> Self {
        Self {
            scheduler,
            clock,
            entries: RwLock::new(std::collections::HashMap::new()),
            ids: IdGenerator::new("assoc"),
        }
    }

    /// Creates a backing Schedule with the target propagated into
    /// `ScheduleOptions`; if `!in.enabled` the schedule is disabled
    /// immediately after creation.
    pub async fn create(&self, input: CreateAssociation) -> Result<Association> {
        let now = self.clock.now();

        let schedule = self.scheduler.create(ScheduleOptions {
            config_path: input.config_path.clone(),
            interval: input.interval,
            jitter: input.jitter,
            enabled: input.enabled,
            target: Some(ScheduleTarget {
                kind: input.target_kind,
                name: input.target_name.clone(),
            }),
            priority: input.priority,
        });

        let association = Association {
            id: self.ids.next(),
            config_path: input.config_path,
            target_kind: input.target_kind,
            target_name: input.target_name,
            priority: input.priority,
            interval_secs: schedule.interval_secs,
            jitter_secs: schedule.jitter_secs,
            enabled: input.enabled,
            schedule_id: schedule.id,
            revision: 1,
            created_at: now,
            updated_at: now,
        };

        self.append(association.clone(), RevisionAction::Create, now);
        info!(association_id = %association.id, "association created");
        Ok(association)
    }

    pub fn get(&self, id: &str) -> Option<Association> {
        self.entries
            .read()
            .expect("association lock poisoned")
            .get(id)
            .map(|e| e.association.clone())
    }

    pub fn history(&self, id: &str) -> Vec<AssociationRevision> {
        self.entries
            .read()
            .expect("association lock poisoned")
            .get(id)
            .map(|e| e.history.clone())
            .unwrap_or_default()
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<Association> {
        let schedule_id = {
            let entries = self.entries.read().expect("association lock poisoned");
            entries
                .get(id)
                .map(|e| e.association.schedule_id.clone())
                .ok_or_else(|| AssociationError::NotFound(id.to_string()))?
        };

        if enabled {
            self.scheduler.enable(&schedule_id).await?;
        } else {
            self.scheduler.disable(&schedule_id).await?;
        }

        let now = self.clock.now();
        let action = if enabled {
            RevisionAction::Enable
        } else {
            RevisionAction::Disable
        };

        let updated = {
            let mut entries = self.entries.write().expect("association lock poisoned");
            let entry = entries
                .get_mut(id)
                .ok_or_else(|| AssociationError::NotFound(id.to_string()))?;
            entry.association.enabled = enabled;
            entry.association.updated_at = now;
            entry.association.revision += 1;
            entry.association.clone()
        };

        self.append(updated.clone(), action, now);
        info!(association_id = %id, enabled, "association enabled state changed");
        Ok(updated)
    }

    /// Find the snapshot at `revision`, disable the current schedule,
    /// create a new one from the snapshot's options, rewrite the mutable
    /// fields, and append a new revision entry with `action=replay`.
    pub async fn replay(&self, id: &str, revision: u64) -> Result<Association> {
        let snapshot = {
            let entries = self.entries.read().expect("association lock poisoned");
            let entry = entries
                .get(id)
                .ok_or_else(|| AssociationError::NotFound(id.to_string()))?;
            entry
                .history
                .iter()
                .find(|r| r.revision == revision)
                .map(|r| r.snapshot.clone())
                .ok_or_else(|| AssociationError::UnknownRevision {
                    id: id.to_string(),
                    revision,
                })?
        };

        let current_schedule_id = {
            let entries = self.entries.read().expect("association lock poisoned");
            entries.get(id).unwrap().association.schedule_id.clone()
        };
        self.scheduler.disable(&current_schedule_id).await.ok();

        let new_schedule = self.scheduler.create(ScheduleOptions {
            config_path: snapshot.config_path.clone(),
            interval: StdDuration::from_secs(snapshot.interval_secs),
            jitter: StdDuration::from_secs(snapshot.jitter_secs),
            enabled: snapshot.enabled,
            target: Some(ScheduleTarget {
                kind: snapshot.target_kind,
                name: snapshot.target_name.clone(),
            }),
            priority: snapshot.priority,
        });

        let now = self.clock.now();
        let replayed = {
            let mut entries = self.entries.write().expect("association lock poisoned");
            let entry = entries.get_mut(id).unwrap();
            entry.association.config_path = snapshot.config_path;
            entry.association.target_kind = snapshot.target_kind;
            entry.association.target_name = snapshot.target_name;
            entry.association.priority = snapshot.priority;
            entry.association.interval_secs = snapshot.interval_secs;
            entry.association.jitter_secs = snapshot.jitter_secs;
            entry.association.enabled = snapshot.enabled;
            entry.association.schedule_id = new_schedule.id;
            entry.association.updated_at = now;
            entry.association.revision += 1;
            entry.association.clone()
        };

        self.append(replayed.clone(), RevisionAction::Replay, now);
        info!(association_id = %id, replayed_revision = revision, "association replayed");
        Ok(replayed)
    }

    fn append(&self, snapshot: Association, action: RevisionAction, now: DateTime<Utc>) {
        let mut entries = self.entries.write().expect("association lock poisoned");
        let entry = entries.entry(snapshot.id.clone()).or_insert_with(|| Entry {
            association: snapshot.clone(),
            history: Vec::new(),
        });
        entry.association = snapshot.clone();
        entry.history.push(AssociationRevision {
            revision: snapshot.revision,
            action,
            created_at: now,
            snapshot,
        });
    }
}
