//! The composition root: owns one instance of every store in the control
//! plane and wires the ones that reference each other together.
//!
//! Grounded on `at_daemon::daemon::Daemon`, narrowed to construction and
//! shutdown signalling — there is no HTTP/API surface or transport layer to
//! bind here, so `run_loops` has no counterpart: every ticker (`Scheduler`,
//! `CanaryStore`) already owns and spawns its own background task at
//! `create()` time.

use std::path::PathBuf;
use std::sync::Arc;

use mc_catalog::{
    BakePipelineCatalog, GitOpsGateStore, MaintenanceWindowStore, ProxyMinionRegistry,
    SolutionPackStore, WorkspaceTemplateStore,
};
use mc_core::clock::{Clock, SystemClock};
use mc_exec::{ExecutionLockStore, RunLeaseStore};
use mc_observability::{AlertInbox, DriftPolicyStore, ExportedResourceStore};
use mc_policy::RoleEnvStore;
use mc_queue::JobQueue;
use mc_rollout::{BulkPreviewManager, EphemeralEnvironmentStore};
use mc_schedule::association::AssociationStore;
use mc_schedule::jitter::{JitterSource, ProcessJitter};
use mc_schedule::scheduler::Scheduler;
use mc_security::{ExecutionCredentialStore, RbacStore, SsoStore};

use crate::config::CoreConfig;
use crate::shutdown::ShutdownSignal;

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Owns one instance of every control-plane store, constructed from a
/// single [`CoreConfig`]. Cheap to clone (every field is an `Arc` or a
/// plain value) so handles can be handed to transport/CLI layers outside
/// this crate.
#[derive(Clone)]
pub struct Core {
    pub config: CoreConfig,
    pub clock: Arc<dyn Clock>,
    pub shutdown: ShutdownSignal,

    pub queue: Arc<JobQueue>,
    pub scheduler: Arc<Scheduler>,
    pub associations: Arc<AssociationStore>,

    pub locks: Arc<ExecutionLockStore>,
    pub leases: Arc<RunLeaseStore>,

    pub credentials: Arc<ExecutionCredentialStore>,
    pub rbac: Arc<RbacStore>,
    pub sso: Arc<SsoStore>,

    pub roles: Arc<RoleEnvStore>,
    pub canaries: Arc<mc_canary::CanaryStore>,

    pub alerts: Arc<AlertInbox>,
    pub drift: Arc<DriftPolicyStore>,
    pub exported: Arc<ExportedResourceStore>,

    pub bulk_previews: Arc<BulkPreviewManager>,
    pub ephemeral_envs: Arc<EphemeralEnvironmentStore>,

    pub bake_pipelines: Arc<BakePipelineCatalog>,
    pub proxy_minions: Arc<ProxyMinionRegistry>,
    pub maintenance_windows: Arc<MaintenanceWindowStore>,
    pub gitops_gates: Arc<GitOpsGateStore>,
    pub workspace_templates: Arc<WorkspaceTemplateStore>,
    pub solution_packs: Arc<SolutionPackStore>,
}

impl Core {
    /// Build every store from `config`, using the system clock and a
    /// CSPRNG-backed jitter source.
    pub async fn new(config: CoreConfig) -> anyhow::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Build every store from `config` against an injected [`Clock`] —
    /// the seam integration tests use to control time deterministically.
    pub async fn with_clock(config: CoreConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let jitter_source: Arc<dyn JitterSource> = Arc::new(ProcessJitter::default());

        let queue = Arc::new(JobQueue::new());
        let scheduler = Arc::new(Scheduler::new(queue.clone(), clock.clone(), jitter_source.clone()));
        let associations = Arc::new(AssociationStore::new(scheduler.clone(), clock.clone()));

        let locks = Arc::new(ExecutionLockStore::new(clock.clone()));
        let leases = Arc::new(RunLeaseStore::new(clock.clone()));

        let credentials = Arc::new(ExecutionCredentialStore::new(clock.clone()));
        let rbac = Arc::new(RbacStore::new());
        let sso = Arc::new(SsoStore::new(clock.clone()));

        let base_dir = expand_home(&config.policy.base_dir);
        let roles = Arc::new(RoleEnvStore::load(base_dir).await?);

        let canaries = mc_canary::CanaryStore::new(queue.clone(), clock.clone(), jitter_source.clone());

        let alerts = Arc::new(AlertInbox::new(clock.clone()));
        let drift = Arc::new(DriftPolicyStore::new(clock.clone()));
        let exported = Arc::new(ExportedResourceStore::with_capacity(
            clock.clone(),
            config.observability.export_ring_capacity,
        ));

        let bulk_previews = Arc::new(BulkPreviewManager::with_ttl(
            clock.clone(),
            std::time::Duration::from_secs(config.rollout.bulk_preview_ttl_secs),
        ));
        let ephemeral_envs = Arc::new(EphemeralEnvironmentStore::new(clock.clone()));

        let bake_pipelines = Arc::new(BakePipelineCatalog::new(clock.clone()));
        let proxy_minions = Arc::new(ProxyMinionRegistry::new(clock.clone()));
        let maintenance_windows = Arc::new(MaintenanceWindowStore::default());
        let gitops_gates = Arc::new(GitOpsGateStore::new(clock.clone()));
        let workspace_templates = Arc::new(WorkspaceTemplateStore::default());
        let solution_packs = Arc::new(SolutionPackStore::default());

        Ok(Self {
            config,
            clock,
            shutdown: ShutdownSignal::new(),
            queue,
            scheduler,
            associations,
            locks,
            leases,
            credentials,
            rbac,
            sso,
            roles,
            canaries,
            alerts,
            drift,
            exported,
            bulk_previews,
            ephemeral_envs,
            bake_pipelines,
            proxy_minions,
            maintenance_windows,
            gitops_gates,
            workspace_templates,
            solution_packs,
        })
    }

    /// Snapshot exported resources matching `selector` plus the Role/Env
    /// documents they reference, fingerprinted (component S).
    pub fn export_bundle(&self, selector: &str, limit: usize) -> crate::bundle::Result<crate::bundle::InventoryBundle> {
        crate::bundle::export_bundle(self.clock.as_ref(), &self.exported, &self.roles, selector, limit)
    }

    /// Replay a previously exported bundle into this core's stores.
    pub async fn import_bundle(&self, bundle: &crate::bundle::InventoryBundle, dry_run: bool) -> crate::bundle::Result<crate::bundle::ImportOutcome> {
        crate::bundle::import_bundle(&self.exported, &self.roles, bundle, dry_run).await
    }

    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }
}
