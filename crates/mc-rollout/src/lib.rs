//! Policy-driven wave planners (component O), the bulk preview manager
//! (component P), and ephemeral test environments with deterministic
//! integration check scoring (component Q).

pub mod ephemeral;
pub mod plan;
pub mod preview;

pub use ephemeral::{
    CheckStatus, EnvironmentStatus, EphemeralEnvironment, EphemeralEnvironmentStore,
    EphemeralError, IntegrationCheckResult,
};
pub use plan::{
    Plan, PatchHost, PatchPlanInput, PatchPolicy, RollingMode, RolloutPolicy, RolloutStrategy,
    plan_patch, plan_rollout,
};
pub use preview::{BulkPreview, BulkPreviewManager, PreviewError, PreviewOperation, DEFAULT_TTL};
