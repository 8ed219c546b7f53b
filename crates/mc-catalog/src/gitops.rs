//! GitOps merge gates: pure evaluation of a candidate commit's reported
//! approvals and status checks against a gate's requirements.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use mc_core::clock::Clock;
use mc_core::id::IdGenerator;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitOpsGate {
    pub id: String,
    pub repo: String,
    pub branch: String,
    pub required_approvals: u32,
    pub required_status_checks: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateGitOpsGate {
    pub repo: String,
    pub branch: String,
    pub required_approvals: u32,
    pub required_status_checks: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CandidateCommit {
    pub approvals: u32,
    pub passing_status_checks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub allowed: bool,
    pub blocked_reason: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GitOpsError {
    #[error("gitops gate not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, GitOpsError>;

pub struct GitOpsGateStore {
    gates: RwLock<HashMap<String, GitOpsGate>>,
    clock: std::sync::Arc<dyn Clock>,
    ids: IdGenerator,
}

impl GitOpsGateStore {
    pub fn new(clock: std::sync::Arc<dyn Clock>) -> Self {
        Self {
            gates: RwLock::new(HashMap::new()),
            clock,
            ids: IdGenerator::new("gitops"),
        }
    }

    pub fn create(&self, input: CreateGitOpsGate) -> GitOpsGate {
        let gate = GitOpsGate {
            id: self.ids.next(),
            repo: input.repo,
            branch: input.branch,
            required_approvals: input.required_approvals,
            required_status_checks: input.required_status_checks,
            updated_at: self.clock.now(),
        };
        self.gates.write().expect("gates lock poisoned").insert(gate.id.clone(), gate.clone());
        gate
    }

    /// Reports the first unmet requirement: approvals are checked before
    /// status checks, and status checks are checked in the order listed on
    /// the gate.
    pub fn evaluate(&self, gate_id: &str, candidate: &CandidateCommit) -> Result<Plan> {
        let gates = self.gates.read().expect("gates lock poisoned");
        let gate = gates.get(gate_id).ok_or_else(|| GitOpsError::NotFound(gate_id.to_string()))?;

        if candidate.approvals < gate.required_approvals {
            return Ok(Plan {
                allowed: false,
                blocked_reason: Some(format!(
                    "needs {} approvals, has {}",
                    gate.required_approvals, candidate.approvals
                )),
            });
        }

        for check in &gate.required_status_checks {
            if !candidate.passing_status_checks.iter().any(|c| c == check) {
                return Ok(Plan {
                    allowed: false,
                    blocked_reason: Some(format!("status check not passing: {check}")),
                });
            }
        }

        Ok(Plan { allowed: true, blocked_reason: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_core::clock::SystemClock;
    use std::sync::Arc;

    fn gate_store() -> GitOpsGateStore {
        GitOpsGateStore::new(Arc::new(SystemClock))
    }

    fn gate(store: &GitOpsGateStore) -> GitOpsGate {
        store.create(CreateGitOpsGate {
            repo: "org/cookbooks".to_string(),
            branch: "main".to_string(),
            required_approvals: 2,
            required_status_checks: vec!["ci/lint".to_string(), "ci/test".to_string()],
        })
    }

    #[test]
    fn satisfying_all_requirements_is_allowed() {
        let store = gate_store();
        let gate = gate(&store);
        let plan = store
            .evaluate(&gate.id, &CandidateCommit { approvals: 2, passing_status_checks: vec!["ci/lint".to_string(), "ci/test".to_string()] })
            .unwrap();
        assert!(plan.allowed);
    }

    #[test]
    fn insufficient_approvals_blocks_before_status_checks() {
        let store = gate_store();
        let gate = gate(&store);
        let plan = store
            .evaluate(&gate.id, &CandidateCommit { approvals: 1, passing_status_checks: vec![] })
            .unwrap();
        assert!(!plan.allowed);
        assert!(plan.blocked_reason.unwrap().contains("approvals"));
    }

    #[test]
    fn missing_status_check_names_the_first_unmet_one() {
        let store = gate_store();
        let gate = gate(&store);
        let plan = store
            .evaluate(&gate.id, &CandidateCommit { approvals: 2, passing_status_checks: vec!["ci/test".to_string()] })
            .unwrap();
        assert!(!plan.allowed);
        assert_eq!(plan.blocked_reason.unwrap(), "status check not passing: ci/lint");
    }
}
