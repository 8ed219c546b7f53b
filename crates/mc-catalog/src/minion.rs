//! Proxy minion registry: registered proxy workers with lazy online/offline
//! staleness, computed on read rather than swept in the background.
//!
//! Grounded on `mc_rollout::ephemeral`'s lazy-expiry idiom.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use mc_core::clock::Clock;
use mc_core::id::IdGenerator;
use serde::{Deserialize, Serialize};

pub const DEFAULT_STALENESS: chrono::Duration = chrono::Duration::seconds(90);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinionStatus {
    Registered,
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyMinion {
    pub id: String,
    pub host: String,
    pub upstream: String,
    pub heartbeat_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum MinionError {
    #[error("proxy minion not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, MinionError>;

pub struct ProxyMinionRegistry {
    minions: RwLock<HashMap<String, ProxyMinion>>,
    clock: std::sync::Arc<dyn Clock>,
    ids: IdGenerator,
    staleness: chrono::Duration,
}

impl ProxyMinionRegistry {
    pub fn new(clock: std::sync::Arc<dyn Clock>) -> Self {
        Self::with_staleness(clock, DEFAULT_STALENESS)
    }

    pub fn with_staleness(clock: std::sync::Arc<dyn Clock>, staleness: chrono::Duration) -> Self {
        Self {
            minions: RwLock::new(HashMap::new()),
            clock,
            ids: IdGenerator::new("minion"),
            staleness,
        }
    }

    pub fn register(&self, host: impl Into<String>, upstream: impl Into<String>) -> ProxyMinion {
        let minion = ProxyMinion {
            id: self.ids.next(),
            host: host.into(),
            upstream: upstream.into(),
            heartbeat_at: None,
        };
        self.minions.write().expect("minions lock poisoned").insert(minion.id.clone(), minion.clone());
        minion
    }

    pub fn heartbeat(&self, id: &str) -> Result<()> {
        let mut minions = self.minions.write().expect("minions lock poisoned");
        let minion = minions.get_mut(id).ok_or_else(|| MinionError::NotFound(id.to_string()))?;
        minion.heartbeat_at = Some(self.clock.now());
        Ok(())
    }

    pub fn status(&self, id: &str) -> Result<MinionStatus> {
        let minions = self.minions.read().expect("minions lock poisoned");
        let minion = minions.get(id).ok_or_else(|| MinionError::NotFound(id.to_string()))?;
        Ok(match minion.heartbeat_at {
            None => MinionStatus::Registered,
            Some(at) if self.clock.now() - at > self.staleness => MinionStatus::Offline,
            Some(_) => MinionStatus::Online,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_core::clock::StepClock;
    use std::sync::Arc;

    fn registry() -> (ProxyMinionRegistry, Arc<StepClock>) {
        let clock = Arc::new(StepClock::new(Utc::now()));
        (ProxyMinionRegistry::new(clock.clone()), clock)
    }

    #[test]
    fn new_minion_is_registered_until_first_heartbeat() {
        let (registry, _clock) = registry();
        let minion = registry.register("proxy-1", "backend-1");
        assert_eq!(registry.status(&minion.id).unwrap(), MinionStatus::Registered);
    }

    #[test]
    fn recent_heartbeat_is_online() {
        let (registry, _clock) = registry();
        let minion = registry.register("proxy-1", "backend-1");
        registry.heartbeat(&minion.id).unwrap();
        assert_eq!(registry.status(&minion.id).unwrap(), MinionStatus::Online);
    }

    #[test]
    fn stale_heartbeat_goes_offline_lazily() {
        let (registry, clock) = registry();
        let minion = registry.register("proxy-1", "backend-1");
        registry.heartbeat(&minion.id).unwrap();
        clock.advance(chrono::Duration::seconds(200));
        assert_eq!(registry.status(&minion.id).unwrap(), MinionStatus::Offline);
    }

    #[test]
    fn unknown_minion_is_not_found() {
        let (registry, _clock) = registry();
        assert!(matches!(registry.status("minion-999"), Err(MinionError::NotFound(_))));
    }
}
