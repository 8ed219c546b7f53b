//! Per-schedule timer loop that enqueues jobs on tick.
//!
//! Grounded on `at-daemon/src/scheduler.rs`'s `TaskScheduler` (a small
//! struct wrapping store access with `tracing` spans around each mutation)
//! and generalized from its one-shot `next_bead`/`assign_bead` calls into a
//! long-lived per-schedule background task, matching the lifecycle shape of
//! `at-daemon/src/daemon.rs`'s spawned tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mc_core::clock::Clock;
use mc_core::id::IdGenerator;
use mc_queue::JobQueue;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

use crate::jitter::JitterSource;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Host,
    Cluster,
    Environment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTarget {
    pub kind: TargetKind,
    pub name: String,
}

impl ScheduleTarget {
    fn selector(&self) -> String {
        let kind = match self.kind {
            TargetKind::Host => "host",
            TargetKind::Cluster => "cluster",
            TargetKind::Environment => "environment",
        };
        format!("{kind}={}", self.name)
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    pub config_path: String,
    pub interval: StdDuration,
    pub jitter: StdDuration,
    pub enabled: bool,
    pub target: Option<ScheduleTarget>,
    pub priority: i32,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            config_path: String::new(),
            interval: StdDuration::from_secs(60),
            jitter: StdDuration::ZERO,
            enabled: true,
            target: None,
            priority: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub config_path: String,
    pub target: Option<ScheduleTarget>,
    pub priority: i32,
    pub interval_secs: u64,
    pub jitter_secs: u64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("schedule not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct ScheduleHandle {
    state: Mutex<Schedule>,
    enabled: Arc<AtomicBool>,
    cancel: Arc<Notify>,
}

/// Owns every live [`Schedule`] and the background ticker task behind each
/// one. No lock is held across the ticker's sleep (spec.md §5) — the task
/// only reacquires `state` around the instant of a tick or a cancellation.
pub struct Scheduler {
    entries: DashMap<String, Arc<ScheduleHandle>>,
    queue: Arc<JobQueue>,
    clock: Arc<dyn Clock>,
    jitter_source: Arc<dyn JitterSource>,
    ids: IdGenerator,
}

impl Scheduler {
    pub fn new(
        queue: Arc<JobQueue>,
        clock: Arc<dyn Clock>,
        jitter_source: Arc<dyn JitterSource>,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            queue,
            clock,
            jitter_source,
            ids: IdGenerator::new("sched"),
        }
    }

    /// Create a schedule and, if `opts.enabled`, start its ticker.
    pub fn create(&self, opts: ScheduleOptions) -> Schedule {
        let now = self.clock.now();
        let interval_secs = opts.interval.as_secs().max(1);
        let jitter_secs = opts.jitter.as_secs();
        let schedule = Schedule {
            id: self.ids.next(),
            config_path: opts.config_path,
            target: opts.target,
            priority: opts.priority,
            interval_secs,
            jitter_secs,
            enabled: opts.enabled,
            created_at: now,
            last_run_at: None,
            next_run_at: None,
        };

        let handle = Arc::new(ScheduleHandle {
            state: Mutex::new(schedule.clone()),
            enabled: Arc::new(AtomicBool::new(opts.enabled)),
            cancel: Arc::new(Notify::new()),
        });

        self.entries.insert(schedule.id.clone(), handle.clone());

        if opts.enabled {
            self.spawn_ticker(schedule.id.clone(), handle);
        }

        info!(schedule_id = %schedule.id, enabled = opts.enabled, "schedule created");
        schedule
    }

    /// Current snapshot of a schedule's state.
    pub async fn snapshot(&self, id: &str) -> Result<Schedule> {
        let handle = self
            .entries
            .get(id)
            .map(|e| e.clone())
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
        Ok(handle.state.lock().await.clone())
    }

    pub async fn list(&self) -> Vec<Schedule> {
        let mut out = Vec::with_capacity(self.entries.len());
        for entry in self.entries.iter() {
            out.push(entry.value().state.lock().await.clone());
        }
        out
    }

    /// Disable cancels the ticker (the current sleep is interrupted).
    pub async fn disable(&self, id: &str) -> Result<Schedule> {
        let handle = self
            .entries
            .get(id)
            .map(|e| e.clone())
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
        handle.enabled.store(false, Ordering::SeqCst);
        handle.cancel.notify_waiters();
        let mut state = handle.state.lock().await;
        state.enabled = false;
        info!(schedule_id = %id, "schedule disabled");
        Ok(state.clone())
    }

    /// Enable (re)starts the ticker from scratch.
    pub async fn enable(&self, id: &str) -> Result<Schedule> {
        let handle = self
            .entries
            .get(id)
            .map(|e| e.clone())
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;

        {
            let mut state = handle.state.lock().await;
            if state.enabled {
                return Ok(state.clone());
            }
            state.enabled = true;
        }

        // Enable restarts the ticker: a fresh cancellation handle so the
        // previous (already-exited) task's notify can't leak into the new
        // one.
        let fresh = Arc::new(ScheduleHandle {
            state: Mutex::new(handle.state.lock().await.clone()),
            enabled: Arc::new(AtomicBool::new(true)),
            cancel: Arc::new(Notify::new()),
        });
        self.entries.insert(id.to_string(), fresh.clone());
        self.spawn_ticker(id.to_string(), fresh.clone());

        info!(schedule_id = %id, "schedule enabled");
        Ok(fresh.state.lock().await.clone())
    }

    fn spawn_ticker(&self, id: String, handle: Arc<ScheduleHandle>) {
        let queue = self.queue.clone();
        let clock = self.clock.clone();
        let jitter_source = self.jitter_source.clone();

        tokio::spawn(async move {
            loop {
                let (config_path, target, priority, interval_secs, jitter_secs) = {
                    let state = handle.state.lock().await;
                    (
                        state.config_path.clone(),
                        state.target.clone(),
                        state.priority,
                        state.interval_secs,
                        state.jitter_secs,
                    )
                };

                let jitter = jitter_source.sample(StdDuration::from_secs(jitter_secs));
                let wait = StdDuration::from_secs(interval_secs) + jitter;

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        if !handle.enabled.load(Ordering::SeqCst) {
                            break;
                        }
                        let selector = target.as_ref().map(|t| t.selector());
                        let job = queue.enqueue(clock.as_ref(), config_path.clone(), selector, false, priority);
                        let now = clock.now();
                        let mut state = handle.state.lock().await;
                        state.last_run_at = Some(now);
                        state.next_run_at = Some(now + chrono::Duration::seconds(interval_secs as i64));
                        debug!(schedule_id = %id, job_id = %job.id, "schedule ticked");
                    }
                    _ = handle.cancel.notified() => {
                        debug!(schedule_id = %id, "schedule ticker cancelled");
                        break;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jitter::FixedJitter;
    use mc_core::clock::SystemClock;

    fn test_scheduler() -> Scheduler {
        Scheduler::new(
            Arc::new(JobQueue::new()),
            Arc::new(SystemClock),
            Arc::new(FixedJitter::zero()),
        )
    }

    #[tokio::test]
    async fn ticker_enqueues_after_interval() {
        let sched = test_scheduler();
        let schedule = sched.create(ScheduleOptions {
            config_path: "cookbooks/base".into(),
            interval: StdDuration::from_millis(20),
            jitter: StdDuration::ZERO,
            enabled: true,
            target: None,
            priority: 0,
        });

        tokio::time::sleep(StdDuration::from_millis(60)).await;

        let snap = sched.snapshot(&schedule.id).await.unwrap();
        assert!(snap.last_run_at.is_some());
        assert!(snap.next_run_at.is_some());
    }

    #[tokio::test]
    async fn disable_stops_further_ticks() {
        let sched = test_scheduler();
        let schedule = sched.create(ScheduleOptions {
            config_path: "cookbooks/base".into(),
            interval: StdDuration::from_millis(15),
            jitter: StdDuration::ZERO,
            enabled: true,
            target: None,
            priority: 0,
        });

        tokio::time::sleep(StdDuration::from_millis(40)).await;
        sched.disable(&schedule.id).await.unwrap();
        let after_disable = sched.snapshot(&schedule.id).await.unwrap();
        let last_at_disable = after_disable.last_run_at;

        tokio::time::sleep(StdDuration::from_millis(60)).await;
        let later = sched.snapshot(&schedule.id).await.unwrap();
        assert_eq!(later.last_run_at, last_at_disable);
        assert!(!later.enabled);
    }

    #[tokio::test]
    async fn enable_restarts_ticking() {
        let sched = test_scheduler();
        let schedule = sched.create(ScheduleOptions {
            config_path: "cookbooks/base".into(),
            interval: StdDuration::from_millis(500),
            jitter: StdDuration::ZERO,
            enabled: false,
            target: None,
            priority: 0,
        });

        let before = sched.snapshot(&schedule.id).await.unwrap();
        assert!(before.last_run_at.is_none());

        sched.enable(&schedule.id).await.unwrap();
        let enabled = sched.snapshot(&schedule.id).await.unwrap();
        assert!(enabled.enabled);
    }

    #[tokio::test]
    async fn unknown_schedule_is_not_found() {
        let sched = test_scheduler();
        assert!(matches!(
            sched.snapshot("sched-999").await,
            Err(SchedulerError::NotFound(_))
        ));
    }
}
