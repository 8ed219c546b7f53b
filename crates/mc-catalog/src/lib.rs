//! Miscellaneous policy catalogs (component T): image-bake pipelines,
//! proxy minions, maintenance windows, GitOps merge gates, workspace
//! templates, and solution packs.

pub mod bake;
pub mod gitops;
pub mod maintenance;
pub mod minion;
pub mod solution;
pub mod template;

pub use bake::{BakeError, BakePipeline, BakePipelineCatalog, BakeRequest, CreateBakePipeline, Provisioner};
pub use gitops::{CandidateCommit, CreateGitOpsGate, GitOpsError, GitOpsGate, GitOpsGateStore};
pub use maintenance::{
    CreateMaintenanceWindow, MaintenanceError, MaintenanceScopeKind, MaintenanceWindow,
    MaintenanceWindowStore,
};
pub use minion::{MinionError, MinionStatus, ProxyMinion, ProxyMinionRegistry, DEFAULT_STALENESS};
pub use solution::{CreateSolutionPack, SolutionPack, SolutionPackError, SolutionPackStore};
pub use template::{
    CreateWorkspaceTemplate, Instantiated, TemplateError, WorkspaceTemplate, WorkspaceTemplateStore,
};
