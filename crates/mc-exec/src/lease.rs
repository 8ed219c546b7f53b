//! Per-job execution leases with heartbeat extension and crash recovery.
//!
//! Grounded on the same acquire/recover shape as [`crate::lock`], narrowed
//! to one active lease per job id, plus heartbeat extension and a
//! `recovered` terminal status distinguishing an involuntary loss (worker
//! presumed dead) from a graceful `released` one — the distinction
//! `at-harness/src/circuit_breaker.rs` draws between a deliberate `reset`
//! and a failure-driven state transition.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mc_core::clock::Clock;
use mc_core::id::IdGenerator;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    Active,
    Released,
    Expired,
    Recovered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLease {
    pub lease_id: String,
    pub job_id: String,
    pub holder: String,
    pub ttl_secs: i64,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: LeaseStatus,
}

const DEFAULT_TTL_SECS: i64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    #[error("run lease already active for job")]
    AlreadyActive,
    #[error("run lease not found")]
    NotFound,
    #[error("run lease is not active")]
    NotActive,
}

pub type Result<T> = std::result::Result<T, LeaseError>;

pub struct RunLeaseStore {
    by_job: DashMap<String, RunLease>,
    by_lease_id: DashMap<String, String>,
    history: RwLock<Vec<RunLease>>,
    clock: std::sync::Arc<dyn Clock>,
    ids: IdGenerator,
}

impl RunLeaseStore {
    pub fn new(clock: std::sync::Arc<dyn Clock>) -> Self {
        Self {
            by_job: DashMap::new(),
            by_lease_id: DashMap::new(),
            history: RwLock::new(Vec::new()),
            clock,
            ids: IdGenerator::new("lease"),
        }
    }

    pub fn acquire(
        &self,
        job_id: impl Into<String>,
        holder: impl Into<String>,
        ttl_secs: Option<i64>,
    ) -> Result<RunLease> {
        let job_id = job_id.into();
        if let Some(existing) = self.by_job.get(&job_id) {
            if existing.status == LeaseStatus::Active {
                return Err(LeaseError::AlreadyActive);
            }
        }

        let now = self.clock.now();
        let ttl = ttl_secs.unwrap_or(DEFAULT_TTL_SECS);
        let lease = RunLease {
            lease_id: self.ids.next(),
            job_id: job_id.clone(),
            holder: holder.into(),
            ttl_secs: ttl,
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(ttl),
            status: LeaseStatus::Active,
        };

        self.by_job.insert(job_id, lease.clone());
        self.by_lease_id.insert(lease.lease_id.clone(), lease.job_id.clone());
        info!(lease_id = %lease.lease_id, job_id = %lease.job_id, "run lease acquired");
        Ok(lease)
    }

    /// Extends `expiresAt` by the lease's own TTL from now, only if still
    /// active and not already past expiry.
    pub fn heartbeat_by_lease(&self, lease_id: &str) -> Result<RunLease> {
        let job_id = self
            .by_lease_id
            .get(lease_id)
            .map(|e| e.clone())
            .ok_or(LeaseError::NotFound)?;
        self.heartbeat_by_job(&job_id)
    }

    pub fn heartbeat_by_job(&self, job_id: &str) -> Result<RunLease> {
        let now = self.clock.now();
        let mut entry = self.by_job.get_mut(job_id).ok_or(LeaseError::NotFound)?;
        if entry.status != LeaseStatus::Active || entry.expires_at <= now {
            return Err(LeaseError::NotActive);
        }
        entry.expires_at = now + chrono::Duration::seconds(entry.ttl_secs);
        Ok(entry.clone())
    }

    pub fn release(&self, job_id: &str) -> bool {
        let Some(mut entry) = self.by_job.get_mut(job_id) else {
            return false;
        };
        if entry.status != LeaseStatus::Active {
            return false;
        }
        entry.status = LeaseStatus::Released;
        let snapshot = entry.clone();
        drop(entry);
        self.by_lease_id.remove(&snapshot.lease_id);
        self.archive(snapshot);
        true
    }

    /// Transitions every active, past-expiry lease to `recovered` and
    /// returns exactly that set.
    pub fn recover_expired(&self) -> Vec<RunLease> {
        let now = self.clock.now();
        let job_ids: Vec<String> = self
            .by_job
            .iter()
            .filter(|e| e.status == LeaseStatus::Active && e.expires_at < now)
            .map(|e| e.job_id.clone())
            .collect();

        let mut recovered = Vec::with_capacity(job_ids.len());
        for job_id in job_ids {
            if let Some(mut entry) = self.by_job.get_mut(&job_id) {
                entry.status = LeaseStatus::Recovered;
                let snapshot = entry.clone();
                drop(entry);
                self.by_lease_id.remove(&snapshot.lease_id);
                self.archive(snapshot.clone());
                recovered.push(snapshot);
            }
        }
        if !recovered.is_empty() {
            warn!(count = recovered.len(), "run leases recovered from expiry");
        }
        recovered
    }

    pub fn get(&self, job_id: &str) -> Option<RunLease> {
        self.by_job.get(job_id).map(|e| e.clone())
    }

    pub fn history(&self) -> Vec<RunLease> {
        self.history.read().expect("lease history poisoned").clone()
    }

    fn archive(&self, lease: RunLease) {
        self.history.write().expect("lease history poisoned").push(lease);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_core::clock::StepClock;
    use std::sync::Arc;

    fn store() -> (RunLeaseStore, Arc<StepClock>) {
        let clock = Arc::new(StepClock::new(Utc::now()));
        (RunLeaseStore::new(clock.clone()), clock)
    }

    #[test]
    fn reacquire_while_active_fails() {
        let (store, _clock) = store();
        store.acquire("job-1", "worker-1", Some(60)).unwrap();
        assert!(matches!(
            store.acquire("job-1", "worker-2", Some(60)),
            Err(LeaseError::AlreadyActive)
        ));
    }

    #[test]
    fn heartbeat_extends_expiry() {
        let (store, clock) = store();
        let lease = store.acquire("job-1", "worker-1", Some(60)).unwrap();
        clock.advance(chrono::Duration::seconds(30));
        let renewed = store.heartbeat_by_lease(&lease.lease_id).unwrap();
        assert!(renewed.expires_at > lease.expires_at);
    }

    #[test]
    fn heartbeat_after_expiry_fails() {
        let (store, clock) = store();
        let lease = store.acquire("job-1", "worker-1", Some(1)).unwrap();
        clock.advance(chrono::Duration::seconds(2));
        assert!(matches!(
            store.heartbeat_by_lease(&lease.lease_id),
            Err(LeaseError::NotActive)
        ));
    }

    #[test]
    fn recover_expired_returns_exactly_the_stale_set() {
        let (store, clock) = store();
        store.acquire("job-1", "worker-1", Some(1)).unwrap();
        store.acquire("job-2", "worker-1", Some(1000)).unwrap();
        clock.advance(chrono::Duration::seconds(2));

        let recovered = store.recover_expired();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].job_id, "job-1");
        assert_eq!(store.get("job-1").unwrap().status, LeaseStatus::Recovered);
        assert_eq!(store.get("job-2").unwrap().status, LeaseStatus::Active);
    }

    #[test]
    fn release_is_idempotent_and_archives() {
        let (store, _clock) = store();
        store.acquire("job-1", "worker-1", Some(60)).unwrap();
        assert!(store.release("job-1"));
        assert!(!store.release("job-1"));
        assert_eq!(store.history().len(), 1);
    }
}
