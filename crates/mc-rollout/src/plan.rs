//! Rollout and patch wave planners: pure functions of `(policy, input)`
//! that never retry and never touch store state.
//!
//! Grounded on `at-harness::circuit_breaker`'s plain-data decision shape
//! (a pure transition function returning a result enum, no I/O), adapted
//! here to a `Plan` carrying either ordered waves or a block reason.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RolloutStrategy {
    BlueGreen,
    Canary,
    Rolling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollingMode {
    Serial,
    Batch,
    Percentage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutPolicy {
    pub strategy: RolloutStrategy,
    /// Used when `strategy == Canary`; percent of targets in wave 1.
    pub canary_percent: u32,
    /// Used when `strategy == Rolling`.
    pub rolling_mode: RollingMode,
    pub batch_size: usize,
    pub batch_percent: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan<T> {
    pub allowed: bool,
    pub waves: Option<Vec<Vec<T>>>,
    pub blocked_reason: Option<String>,
}

impl<T> Plan<T> {
    fn allowed(waves: Vec<Vec<T>>) -> Self {
        Self {
            allowed: true,
            waves: Some(waves),
            blocked_reason: None,
        }
    }

    fn blocked(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            waves: None,
            blocked_reason: Some(reason.into()),
        }
    }
}

fn ceil_percent(len: usize, percent: u32) -> usize {
    ((len as u64 * percent as u64).div_ceil(100)) as usize
}

/// Builds an ordered rollout wave plan over `targets` per `policy`. Never
/// blocks — rollout policies have no gating condition of their own (patch
/// policies are the ones that can block, via reboot approval).
pub fn plan_rollout<T: Clone>(policy: &RolloutPolicy, targets: &[T]) -> Plan<T> {
    if targets.is_empty() {
        return Plan::allowed(Vec::new());
    }

    let waves = match policy.strategy {
        RolloutStrategy::BlueGreen => vec![targets.to_vec(), targets.to_vec()],
        RolloutStrategy::Canary => {
            let first_len = ceil_percent(targets.len(), policy.canary_percent).max(1).min(targets.len());
            let (first, rest) = targets.split_at(first_len);
            if rest.is_empty() {
                vec![first.to_vec()]
            } else {
                vec![first.to_vec(), rest.to_vec()]
            }
        }
        RolloutStrategy::Rolling => {
            let batch_size = match policy.rolling_mode {
                RollingMode::Serial => 1,
                RollingMode::Batch => policy.batch_size.max(1),
                RollingMode::Percentage => ceil_percent(targets.len(), policy.batch_percent).max(1),
            };
            targets.chunks(batch_size).map(|chunk| chunk.to_vec()).collect()
        }
    };

    Plan::allowed(waves)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchPolicy {
    pub env: String,
    /// Window start hour, UTC, in `[0, 24)`.
    pub window_start: u32,
    /// Window duration in hours.
    pub duration: u32,
    pub max_parallel_hosts: usize,
    pub allowed_classifications: Vec<String>,
    pub require_reboot_approval: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatchHost {
    pub id: String,
    pub classification: String,
    pub needs_reboot: bool,
}

#[derive(Debug, Clone)]
pub struct PatchPlanInput {
    pub hour_utc: u32,
    pub hosts: Vec<PatchHost>,
    pub reboot_approved: bool,
}

/// Whether `hour` falls in `[start, (start+duration) mod 24)`, with
/// wrap-around when the window crosses midnight.
fn window_open(hour: u32, start: u32, duration: u32) -> bool {
    let hour = hour % 24;
    let start = start % 24;
    let end = (start + duration) % 24;
    if duration >= 24 {
        return true;
    }
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

pub fn plan_patch(policy: &PatchPolicy, input: &PatchPlanInput) -> Plan<PatchHost> {
    if !window_open(input.hour_utc, policy.window_start, policy.duration) {
        return Plan::blocked("patch window closed");
    }

    let mut eligible: Vec<PatchHost> = input
        .hosts
        .iter()
        .filter(|h| policy.allowed_classifications.iter().any(|c| c == &h.classification))
        .cloned()
        .collect();

    if policy.require_reboot_approval && !input.reboot_approved && eligible.iter().any(|h| h.needs_reboot) {
        return Plan::blocked("reboot approval required");
    }

    eligible.sort_by(|a, b| a.classification.cmp(&b.classification).then(a.id.cmp(&b.id)));

    let waves = eligible
        .chunks(policy.max_parallel_hosts.max(1))
        .map(|chunk| chunk.to_vec())
        .collect();

    Plan::allowed(waves)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blue_green_produces_two_full_waves() {
        let policy = RolloutPolicy {
            strategy: RolloutStrategy::BlueGreen,
            canary_percent: 0,
            rolling_mode: RollingMode::Serial,
            batch_size: 0,
            batch_percent: 0,
        };
        let plan = plan_rollout(&policy, &["a", "b", "c"]);
        assert!(plan.allowed);
        assert_eq!(plan.waves.unwrap(), vec![vec!["a", "b", "c"], vec!["a", "b", "c"]]);
    }

    #[test]
    fn canary_wave_one_is_ceil_percent_min_one() {
        let policy = RolloutPolicy {
            strategy: RolloutStrategy::Canary,
            canary_percent: 10,
            rolling_mode: RollingMode::Serial,
            batch_size: 0,
            batch_percent: 0,
        };
        let targets: Vec<u32> = (1..=9).collect();
        let plan = plan_rollout(&policy, &targets);
        let waves = plan.waves.unwrap();
        assert_eq!(waves[0].len(), 1);
        assert_eq!(waves[1].len(), 8);
    }

    #[test]
    fn rolling_percentage_chunks_by_ceil_percent() {
        let policy = RolloutPolicy {
            strategy: RolloutStrategy::Rolling,
            canary_percent: 0,
            rolling_mode: RollingMode::Percentage,
            batch_size: 0,
            batch_percent: 25,
        };
        let targets: Vec<u32> = (1..=10).collect();
        let plan = plan_rollout(&policy, &targets);
        let waves = plan.waves.unwrap();
        assert_eq!(waves.iter().map(|w| w.len()).collect::<Vec<_>>(), vec![3, 3, 3, 1]);
    }

    #[test]
    fn rollout_waves_cover_every_target_exactly_once() {
        let policy = RolloutPolicy {
            strategy: RolloutStrategy::Rolling,
            canary_percent: 0,
            rolling_mode: RollingMode::Batch,
            batch_size: 3,
            batch_percent: 0,
        };
        let targets: Vec<u32> = (1..=10).collect();
        let plan = plan_rollout(&policy, &targets);
        let mut covered: Vec<u32> = plan.waves.unwrap().into_iter().flatten().collect();
        covered.sort();
        assert_eq!(covered, targets);
    }

    fn s6_policy() -> PatchPolicy {
        PatchPolicy {
            env: "prod".to_string(),
            window_start: 1,
            duration: 4,
            max_parallel_hosts: 2,
            allowed_classifications: vec!["security".to_string(), "critical".to_string()],
            require_reboot_approval: true,
        }
    }

    fn s6_hosts() -> Vec<PatchHost> {
        vec![
            PatchHost { id: "n1".to_string(), classification: "security".to_string(), needs_reboot: true },
            PatchHost { id: "n2".to_string(), classification: "critical".to_string(), needs_reboot: false },
            PatchHost { id: "n3".to_string(), classification: "feature".to_string(), needs_reboot: false },
        ]
    }

    #[test]
    fn s6_patch_plan_blocks_without_reboot_approval() {
        let plan = plan_patch(
            &s6_policy(),
            &PatchPlanInput { hour_utc: 2, hosts: s6_hosts(), reboot_approved: false },
        );
        assert!(!plan.allowed);
        assert_eq!(plan.blocked_reason.unwrap(), "reboot approval required");
    }

    #[test]
    fn s6_patch_plan_allows_with_reboot_approval() {
        let plan = plan_patch(
            &s6_policy(),
            &PatchPlanInput { hour_utc: 2, hosts: s6_hosts(), reboot_approved: true },
        );
        assert!(plan.allowed);
        let waves = plan.waves.unwrap();
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["n2", "n1"]);
    }

    #[test]
    fn patch_window_closed_outside_range() {
        let plan = plan_patch(
            &s6_policy(),
            &PatchPlanInput { hour_utc: 20, hosts: s6_hosts(), reboot_approved: true },
        );
        assert!(!plan.allowed);
        assert_eq!(plan.blocked_reason.unwrap(), "patch window closed");
    }

    #[test]
    fn patch_waves_partition_the_filtered_host_set() {
        let hosts = vec![
            PatchHost { id: "n1".to_string(), classification: "security".to_string(), needs_reboot: false },
            PatchHost { id: "n2".to_string(), classification: "security".to_string(), needs_reboot: false },
            PatchHost { id: "n3".to_string(), classification: "security".to_string(), needs_reboot: false },
        ];
        let plan = plan_patch(
            &s6_policy(),
            &PatchPlanInput { hour_utc: 2, hosts, reboot_approved: true },
        );
        let waves = plan.waves.unwrap();
        assert_eq!(waves.iter().map(|w| w.len()).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn wraparound_window_spans_midnight() {
        let mut policy = s6_policy();
        policy.window_start = 22;
        policy.duration = 4; // open [22,2)
        assert!(window_open(23, 22, 4));
        assert!(window_open(1, 22, 4));
        assert!(!window_open(3, 22, 4));
        let _ = &policy;
    }
}
