//! Periodic health probes that subscribe to the job queue's terminal
//! events and classify a subject's health from consecutive failures.
//!
//! Grounded on `mc_schedule::scheduler`'s ticker shape (same
//! interval+jitter wait loop, same no-lock-across-sleep discipline),
//! narrowed to always enqueue at a fixed priority and paired with a
//! `Queue::subscribe` hook in the style `at-daemon/src/scheduler.rs` uses
//! to fan a job's terminal status out to interested observers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mc_core::clock::Clock;
use mc_core::id::IdGenerator;
use mc_queue::{Job, JobQueue, JobStatus};
use mc_schedule::jitter::JitterSource;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Canary {
    pub id: String,
    pub name: String,
    pub config_path: String,
    pub interval_secs: u64,
    pub jitter_secs: u64,
    pub failure_threshold: u32,
    pub consecutive_failures: u32,
    pub last_status: Option<JobStatus>,
    pub health: Health,
    pub enabled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CanaryError {
    #[error("canary not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, CanaryError>;

#[derive(Debug, Clone)]
pub struct CreateCanary {
    pub name: String,
    pub config_path: String,
    pub interval: StdDuration,
    pub jitter: StdDuration,
    pub failure_threshold: u32,
    pub priority: i32,
}

struct CanaryHandle {
    state: Mutex<Canary>,
    enabled: Arc<AtomicBool>,
    cancel: Arc<Notify>,
    priority: i32,
}

pub struct CanaryStore {
    entries: DashMap<String, Arc<CanaryHandle>>,
    job_index: DashMap<String, String>, // jobId -> canaryId
    queue: Arc<JobQueue>,
    clock: Arc<dyn Clock>,
    jitter_source: Arc<dyn JitterSource>,
    ids: IdGenerator,
}

impl CanaryStore {
    pub fn new(queue: Arc<JobQueue>, clock: Arc<dyn Clock>, jitter_source: Arc<dyn JitterSource>) -> Arc<Self> {
        let store = Arc::new(Self {
            entries: DashMap::new(),
            job_index: DashMap::new(),
            queue,
            clock,
            jitter_source,
            ids: IdGenerator::new("canary"),
        });
        store.clone().register_subscriber();
        store
    }

    fn register_subscriber(self: Arc<Self>) {
        let store = self.clone();
        self.queue.subscribe(Box::new(move |job: &Job| {
            store.on_job(job);
        }));
    }

    pub fn create(self: &Arc<Self>, input: CreateCanary) -> Canary {
        let canary = Canary {
            id: self.ids.next(),
            name: input.name,
            config_path: input.config_path,
            interval_secs: input.interval.as_secs().max(1),
            jitter_secs: input.jitter.as_secs(),
            failure_threshold: input.failure_threshold.max(1),
            consecutive_failures: 0,
            last_status: None,
            health: Health::Unknown,
            enabled: true,
        };

        let handle = Arc::new(CanaryHandle {
            state: Mutex::new(canary.clone()),
            enabled: Arc::new(AtomicBool::new(true)),
            cancel: Arc::new(Notify::new()),
            priority: input.priority,
        });
        self.entries.insert(canary.id.clone(), handle.clone());
        self.spawn_ticker(canary.id.clone(), handle);

        info!(canary_id = %canary.id, "canary created");
        canary
    }

    pub async fn snapshot(&self, id: &str) -> Result<Canary> {
        let handle = self
            .entries
            .get(id)
            .map(|e| e.clone())
            .ok_or_else(|| CanaryError::NotFound(id.to_string()))?;
        Ok(handle.state.lock().await.clone())
    }

    pub async fn set_enabled(self: &Arc<Self>, id: &str, enabled: bool) -> Result<Canary> {
        let handle = self
            .entries
            .get(id)
            .map(|e| e.clone())
            .ok_or_else(|| CanaryError::NotFound(id.to_string()))?;

        if !enabled {
            let mut state = handle.state.lock().await;
            if state.enabled {
                handle.enabled.store(false, Ordering::SeqCst);
                handle.cancel.notify_waiters();
            }
            state.enabled = false;
            return Ok(state.clone());
        }

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
        let fresh = Arc::new(CanaryHandle {
            state: Mutex::new(handle.state.lock().await.clone()),
            enabled: Arc::new(AtomicBool::new(true)),
            cancel: Arc::new(Notify::new()),
            priority: handle.priority,
        });
        self.entries.insert(id.to_string(), fresh.clone());
        self.spawn_ticker(id.to_string(), fresh.clone());

        info!(canary_id = %id, "canary enabled");
        Ok(fresh.state.lock().await.clone())
    }

    /// Receives terminal job events from the queue. If the job is mapped
    /// to a canary, updates its counters and health.
    fn on_job(&self, job: &Job) {
        let Some((_, canary_id)) = self.job_index.remove(&job.id) else {
            return;
        };
        let Some(handle) = self.entries.get(&canary_id).map(|e| e.clone()) else {
            return;
        };

        let success = job.status == JobStatus::Succeeded;
        tokio::spawn(async move {
            let mut state = handle.state.lock().await;
            state.last_status = Some(job.status);
            if success {
                state.consecutive_failures = 0;
                state.health = Health::Healthy;
            } else {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= state.failure_threshold {
                    state.health = Health::Unhealthy;
                }
            }
        });
    }

    fn spawn_ticker(self: &Arc<Self>, id: String, handle: Arc<CanaryHandle>) {
        let store = self.clone();

        tokio::spawn(async move {
            loop {
                let (config_path, interval_secs, jitter_secs) = {
                    let state = handle.state.lock().await;
                    (state.config_path.clone(), state.interval_secs, state.jitter_secs)
                };

                let jitter = store.jitter_source.sample(StdDuration::from_secs(jitter_secs));
                let wait = StdDuration::from_secs(interval_secs) + jitter;

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        if !handle.enabled.load(Ordering::SeqCst) {
                            break;
                        }
                        let job = store.queue.enqueue(store.clock.as_ref(), config_path.clone(), None, false, handle.priority);
                        store.job_index.insert(job.id.clone(), id.clone());
                        debug!(canary_id = %id, job_id = %job.id, "canary probe enqueued");
                    }
                    _ = handle.cancel.notified() => {
                        debug!(canary_id = %id, "canary ticker cancelled");
                        break;
                    }
                }
            }
        });
    }
}
