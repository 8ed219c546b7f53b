//! Token-addressable deferred operation sets with a TTL, consumed at most
//! once.
//!
//! Grounded on `mc_exec::lease`'s single-active-record-per-key shape,
//! narrowed here to one record per minted token with no holder contention.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use mc_core::clock::Clock;
use mc_core::id::IdGenerator;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_TTL: StdDuration = StdDuration::from_secs(15 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewOperation {
    pub description: String,
    pub ready: bool,
    pub conflicts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkPreview {
    pub token: String,
    pub operations: Vec<PreviewOperation>,
    pub ready: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("bulk preview not found or expired: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, PreviewError>;

pub struct BulkPreviewManager {
    previews: RwLock<HashMap<String, BulkPreview>>,
    clock: std::sync::Arc<dyn Clock>,
    ids: IdGenerator,
    ttl: chrono::Duration,
}

impl BulkPreviewManager {
    pub fn new(clock: std::sync::Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, DEFAULT_TTL)
    }

    pub fn with_ttl(clock: std::sync::Arc<dyn Clock>, ttl: StdDuration) -> Self {
        Self {
            previews: RwLock::new(HashMap::new()),
            clock,
            ids: IdGenerator::new("bulk-preview"),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::minutes(15)),
        }
    }

    pub fn save_preview(&self, operations: Vec<PreviewOperation>) -> BulkPreview {
        let ready = !operations.is_empty() && operations.iter().all(|op| op.ready && !op.conflicts);
        let now = self.clock.now();
        let preview = BulkPreview {
            token: self.ids.next(),
            operations,
            ready,
            created_at: now,
            expires_at: now + self.ttl,
        };
        info!(token = %preview.token, ready, "bulk preview saved");
        self.previews.write().expect("preview lock poisoned").insert(preview.token.clone(), preview.clone());
        preview
    }

    pub fn get_preview(&self, token: &str) -> Result<BulkPreview> {
        let previews = self.previews.read().expect("preview lock poisoned");
        let preview = previews.get(token).ok_or_else(|| PreviewError::NotFound(token.to_string()))?;
        if preview.expires_at <= self.clock.now() {
            return Err(PreviewError::NotFound(token.to_string()));
        }
        Ok(preview.clone())
    }

    /// Returns and removes the preview if present and unexpired — one-shot.
    pub fn consume_preview(&self, token: &str) -> Result<BulkPreview> {
        let mut previews = self.previews.write().expect("preview lock poisoned");
        let Some(preview) = previews.get(token).cloned() else {
            return Err(PreviewError::NotFound(token.to_string()));
        };
        if preview.expires_at <= self.clock.now() {
            previews.remove(token);
            return Err(PreviewError::NotFound(token.to_string()));
        }
        previews.remove(token);
        Ok(preview)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_core::clock::StepClock;
    use std::sync::Arc;

    fn manager() -> (BulkPreviewManager, Arc<StepClock>) {
        let clock = Arc::new(StepClock::new(Utc::now()));
        (BulkPreviewManager::new(clock.clone()), clock)
    }

    fn op(ready: bool, conflicts: bool) -> PreviewOperation {
        PreviewOperation { description: "update".to_string(), ready, conflicts }
    }

    #[test]
    fn ready_requires_all_ops_ready_and_no_conflicts() {
        let (mgr, _clock) = manager();
        let all_ready = mgr.save_preview(vec![op(true, false), op(true, false)]);
        assert!(all_ready.ready);

        let conflicted = mgr.save_preview(vec![op(true, false), op(true, true)]);
        assert!(!conflicted.ready);

        let not_ready = mgr.save_preview(vec![op(false, false)]);
        assert!(!not_ready.ready);
    }

    #[test]
    fn consume_is_one_shot() {
        let (mgr, _clock) = manager();
        let preview = mgr.save_preview(vec![op(true, false)]);
        assert!(mgr.consume_preview(&preview.token).is_ok());
        assert!(matches!(mgr.consume_preview(&preview.token), Err(PreviewError::NotFound(_))));
    }

    #[test]
    fn preview_evicts_after_ttl() {
        let (mgr, clock) = manager();
        let preview = mgr.save_preview(vec![op(true, false)]);
        clock.advance(chrono::Duration::minutes(16));
        assert!(matches!(mgr.get_preview(&preview.token), Err(PreviewError::NotFound(_))));
        assert!(matches!(mgr.consume_preview(&preview.token), Err(PreviewError::NotFound(_))));
    }

    #[test]
    fn get_preview_does_not_consume() {
        let (mgr, _clock) = manager();
        let preview = mgr.save_preview(vec![op(true, false)]);
        assert!(mgr.get_preview(&preview.token).is_ok());
        assert!(mgr.get_preview(&preview.token).is_ok());
        assert!(mgr.consume_preview(&preview.token).is_ok());
    }
}
