//! Named, TTL-bounded mutual exclusion with expiry recovery.
//!
//! Grounded on `at-core/src/lockfile.rs`'s acquire/stale-recovery shape
//! (try to take ownership; if the existing holder turns out to be dead,
//! reclaim and retry) generalized from a single process-wide file lock to
//! many named in-memory keys, each independently TTL-bounded rather than
//! liveness-checked by PID.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mc_core::clock::Clock;
use mc_core::id::IdGenerator;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    Active,
    Released,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLock {
    pub id: String,
    pub key: String,
    pub holder: String,
    pub job_id: Option<String>,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub status: LockStatus,
}

const DEFAULT_TTL_SECS: i64 = 600;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("execution lock already held")]
    AlreadyHeld,
    #[error("execution lock not found")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, LockError>;

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

pub struct ExecutionLockStore {
    // keyed by normalized key; only ever holds the current (non-historical)
    // record for that key, active or just-transitioned.
    current: DashMap<String, ExecutionLock>,
    // jobId -> key, for Release-by-job without knowing the key.
    job_index: DashMap<String, String>,
    history: RwLock<Vec<ExecutionLock>>,
    clock: std::sync::Arc<dyn Clock>,
    ids: IdGenerator,
}

impl ExecutionLockStore {
    pub fn new(clock: std::sync::Arc<dyn Clock>) -> Self {
        Self {
            current: DashMap::new(),
            job_index: DashMap::new(),
            history: RwLock::new(Vec::new()),
            clock,
            ids: IdGenerator::new("exec-lock"),
        }
    }

    /// `ttl_secs` of `None` uses the default (600s).
    pub fn acquire(
        &self,
        key: &str,
        holder: impl Into<String>,
        ttl_secs: Option<i64>,
    ) -> Result<ExecutionLock> {
        let key = normalize_key(key);
        let now = self.clock.now();
        let ttl = ttl_secs.unwrap_or(DEFAULT_TTL_SECS);

        use dashmap::mapref::entry::Entry;
        match self.current.entry(key.clone()) {
            Entry::Occupied(mut occ) => {
                let existing = occ.get();
                if existing.status == LockStatus::Active && existing.expires_at > now {
                    return Err(LockError::AlreadyHeld);
                }
                if existing.status == LockStatus::Active && existing.expires_at <= now {
                    let mut expired = existing.clone();
                    expired.status = LockStatus::Expired;
                    expired.released_at = Some(now);
                    self.archive(expired);
                }
                let lock = ExecutionLock {
                    id: self.ids.next(),
                    key: key.clone(),
                    holder: holder.into(),
                    job_id: None,
                    acquired_at: now,
                    expires_at: now + chrono::Duration::seconds(ttl),
                    released_at: None,
                    status: LockStatus::Active,
                };
                occ.insert(lock.clone());
                info!(lock_id = %lock.id, key = %key, "execution lock acquired");
                Ok(lock)
            }
            Entry::Vacant(vac) => {
                let lock = ExecutionLock {
                    id: self.ids.next(),
                    key: key.clone(),
                    holder: holder.into(),
                    job_id: None,
                    acquired_at: now,
                    expires_at: now + chrono::Duration::seconds(ttl),
                    released_at: None,
                    status: LockStatus::Active,
                };
                vac.insert(lock.clone());
                info!(lock_id = %lock.id, key = %key, "execution lock acquired");
                Ok(lock)
            }
        }
    }

    pub fn bind_job(&self, key: &str, job_id: impl Into<String>) -> Result<ExecutionLock> {
        let key = normalize_key(key);
        let mut entry = self.current.get_mut(&key).ok_or(LockError::NotFound)?;
        let job_id = job_id.into();
        entry.job_id = Some(job_id.clone());
        self.job_index.insert(job_id, key.clone());
        Ok(entry.clone())
    }

    /// Release by normalized key.
    pub fn release(&self, key: &str) -> bool {
        let key = normalize_key(key);
        self.release_key(&key)
    }

    /// Release by job id, resolving the bound key.
    pub fn release_by_job(&self, job_id: &str) -> bool {
        let Some((_, key)) = self.job_index.remove(job_id) else {
            return false;
        };
        self.release_key(&key)
    }

    fn release_key(&self, key: &str) -> bool {
        let Some((_, mut lock)) = self.current.remove(key) else {
            return false;
        };
        if let Some(job_id) = &lock.job_id {
            self.job_index.remove(job_id);
        }
        if lock.status == LockStatus::Active {
            lock.status = LockStatus::Released;
            lock.released_at = Some(self.clock.now());
        }
        self.archive(lock);
        true
    }

    /// Sweep all active, past-expiry records into expired+released.
    pub fn cleanup_expired(&self) -> Vec<ExecutionLock> {
        let now = self.clock.now();
        let mut swept = Vec::new();
        let expired_keys: Vec<String> = self
            .current
            .iter()
            .filter(|e| e.status == LockStatus::Active && e.expires_at <= now)
            .map(|e| e.key.clone())
            .collect();

        for key in expired_keys {
            if let Some((_, mut lock)) = self.current.remove(&key) {
                if let Some(job_id) = &lock.job_id {
                    self.job_index.remove(job_id);
                }
                lock.status = LockStatus::Expired;
                lock.released_at = Some(now);
                self.archive(lock.clone());
                swept.push(lock);
            }
        }
        if !swept.is_empty() {
            warn!(count = swept.len(), "execution locks recovered from expiry");
        }
        swept
    }

    pub fn get(&self, key: &str) -> Option<ExecutionLock> {
        self.current.get(&normalize_key(key)).map(|e| e.clone())
    }

    pub fn history(&self) -> Vec<ExecutionLock> {
        self.history.read().expect("lock history poisoned").clone()
    }

    fn archive(&self, lock: ExecutionLock) {
        self.history.write().expect("lock history poisoned").push(lock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_core::clock::StepClock;
    use std::sync::Arc;

    fn store() -> (ExecutionLockStore, Arc<StepClock>) {
        let clock = Arc::new(StepClock::new(Utc::now()));
        let store = ExecutionLockStore::new(clock.clone());
        (store, clock)
    }

    #[test]
    fn second_acquire_on_active_key_is_rejected() {
        let (store, _clock) = store();
        store.acquire("apply:prod/app", "worker-1", Some(60)).unwrap();
        let err = store.acquire("apply:prod/app", "worker-2", Some(60)).unwrap_err();
        assert!(matches!(err, LockError::AlreadyHeld));
    }

    #[test]
    fn acquire_after_expiry_archives_prior_and_succeeds() {
        let (store, clock) = store();
        let first = store.acquire("apply:prod/app", "worker-1", Some(1)).unwrap();
        clock.advance(chrono::Duration::seconds(2));

        let second = store.acquire("apply:prod/app", "worker-2", Some(60)).unwrap();
        assert_ne!(first.id, second.id);

        let history = store.history();
        assert!(history.iter().any(|l| l.id == first.id && l.status == LockStatus::Expired));
    }

    #[test]
    fn release_by_job_resolves_bound_key() {
        let (store, _clock) = store();
        let lock = store.acquire("apply:prod/app", "worker-1", Some(60)).unwrap();
        store.bind_job(&lock.key, "job-1").unwrap();
        assert!(store.release_by_job("job-1"));
        assert!(store.get("apply:prod/app").is_none());
    }

    #[test]
    fn cleanup_expired_sweeps_only_past_expiry() {
        let (store, clock) = store();
        store.acquire("key-a", "worker-1", Some(1)).unwrap();
        store.acquire("key-b", "worker-1", Some(1000)).unwrap();
        clock.advance(chrono::Duration::seconds(2));

        let swept = store.cleanup_expired();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].key, "key-a");
        assert!(store.get("key-b").is_some());
    }

    #[test]
    fn keys_are_normalized() {
        let (store, _clock) = store();
        store.acquire("  Apply:Prod/App  ", "worker-1", Some(60)).unwrap();
        assert!(store.get("apply:prod/app").is_some());
    }
}
