//! In-memory FIFO queue of enqueued reconciliation jobs, with an observer
//! registry and status-transition tracking.
//!
//! Grounded on `at-daemon/src/scheduler.rs` (which enqueues into a backing
//! store and updates status fields) and the `DashMap`-per-key store shape of
//! `at-harness/src/rate_limiter.rs`.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mc_core::clock::Clock;
use mc_core::id::IdGenerator;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// queued -> running -> {succeeded, failed, cancelled}; queued -> cancelled.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        matches!(
            (self, target),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub config_path: String,
    pub target_selector: Option<String>,
    pub dry_run: bool,
    pub priority: i32,
    pub status: JobStatus,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub config_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

pub type Result<T> = std::result::Result<T, QueueError>;

// ---------------------------------------------------------------------------
// JobQueue
// ---------------------------------------------------------------------------

type Subscriber = Box<dyn Fn(&Job) + Send + Sync>;

/// In-memory job queue. Jobs live in a [`DashMap`] for lock-free concurrent
/// access; subscribers are rarely added/removed so they sit behind a plain
/// [`RwLock`] (mirrors the teacher's split between high-churn per-key state
/// and rarely-mutated registration state).
pub struct JobQueue {
    jobs: DashMap<String, Job>,
    subscribers: RwLock<Vec<Subscriber>>,
    ids: IdGenerator,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
            subscribers: RwLock::new(Vec::new()),
            ids: IdGenerator::new("job"),
        }
    }

    /// Enqueue never fails for a well-formed input.
    pub fn enqueue(
        &self,
        clock: &dyn Clock,
        config_path: impl Into<String>,
        target_selector: Option<String>,
        dry_run: bool,
        priority: i32,
    ) -> Job {
        let job = Job {
            id: self.ids.next(),
            config_path: config_path.into(),
            target_selector,
            dry_run,
            priority,
            status: JobStatus::Queued,
            queued_at: clock.now(),
            started_at: None,
            completed_at: None,
            error: None,
        };
        self.jobs.insert(job.id.clone(), job.clone());
        debug!(job_id = %job.id, config_path = %job.config_path, "job enqueued");
        job
    }

    /// Register a subscriber invoked synchronously on every status change,
    /// with a value copy of the job. Subscribers must be non-blocking and
    /// must not mutate queue state — they may freely mutate other stores.
    pub fn subscribe(&self, f: Subscriber) {
        self.subscribers.write().expect("subscribers lock poisoned").push(f);
    }

    /// Move a job to `status`. Unknown ids are a not-found error and do
    /// not notify subscribers. Invalid transitions are rejected the same
    /// way.
    pub fn update_status(
        &self,
        clock: &dyn Clock,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<Job> {
        let mut entry = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::NotFound(job_id.to_string()))?;

        if !entry.status.can_transition_to(status) {
            return Err(QueueError::InvalidTransition {
                from: entry.status,
                to: status,
            });
        }

        let now = clock.now();
        entry.status = status;
        match status {
            JobStatus::Running => entry.started_at = Some(now),
            s if s.is_terminal() => entry.completed_at = Some(now),
            _ => {}
        }
        if error.is_some() {
            entry.error = error;
        }

        let snapshot = entry.clone();
        drop(entry);

        info!(job_id = %snapshot.id, status = ?snapshot.status, "job status updated");

        if snapshot.status.is_terminal() {
            let subscribers = self.subscribers.read().expect("subscribers lock poisoned");
            for sub in subscribers.iter() {
                sub(&snapshot);
            }
        }

        Ok(snapshot)
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.get(job_id).map(|e| e.clone())
    }

    pub fn list(&self, filter: &JobFilter) -> Vec<Job> {
        let mut out: Vec<Job> = self
            .jobs
            .iter()
            .map(|e| e.value().clone())
            .filter(|j| filter.status.is_none_or(|s| s == j.status))
            .filter(|j| {
                filter
                    .config_path
                    .as_deref()
                    .is_none_or(|p| p == j.config_path)
            })
            .collect();
        out.sort_by(|a, b| a.queued_at.cmp(&b.queued_at));
        out
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_core::clock::SystemClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn enqueue_never_fails_and_ids_increase() {
        let q = JobQueue::new();
        let clock = SystemClock;
        let a = q.enqueue(&clock, "cookbooks/base", None, false, 0);
        let b = q.enqueue(&clock, "cookbooks/app", None, false, 0);
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, JobStatus::Queued);
    }

    #[test]
    fn update_unknown_id_is_not_found_and_does_not_notify() {
        let q = JobQueue::new();
        let clock = SystemClock;
        let notified = Arc::new(AtomicUsize::new(0));
        let n = notified.clone();
        q.subscribe(Box::new(move |_| {
            n.fetch_add(1, Ordering::SeqCst);
        }));
        let err = q.update_status(&clock, "job-999", JobStatus::Running, None);
        assert!(matches!(err, Err(QueueError::NotFound(_))));
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn terminal_status_notifies_subscribers_once() {
        let q = JobQueue::new();
        let clock = SystemClock;
        let job = q.enqueue(&clock, "cookbooks/base", None, false, 0);
        let notified = Arc::new(AtomicUsize::new(0));
        let n = notified.clone();
        q.subscribe(Box::new(move |_| {
            n.fetch_add(1, Ordering::SeqCst);
        }));

        q.update_status(&clock, &job.id, JobStatus::Running, None).unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 0, "non-terminal must not notify");

        q.update_status(&clock, &job.id, JobStatus::Succeeded, None).unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let q = JobQueue::new();
        let clock = SystemClock;
        let job = q.enqueue(&clock, "cookbooks/base", None, false, 0);
        q.update_status(&clock, &job.id, JobStatus::Succeeded, None)
            .expect_err("queued -> succeeded is not a valid transition");
    }

    #[test]
    fn list_filters_by_status() {
        let q = JobQueue::new();
        let clock = SystemClock;
        let a = q.enqueue(&clock, "a", None, false, 0);
        let _b = q.enqueue(&clock, "b", None, false, 0);
        q.update_status(&clock, &a.id, JobStatus::Running, None).unwrap();

        let running = q.list(&JobFilter {
            status: Some(JobStatus::Running),
            config_path: None,
        });
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, a.id);
    }
}
