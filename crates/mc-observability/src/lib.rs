//! Observability surfaces fed by the rest of the control plane: the alert
//! inbox (component L), drift suppression/allowlist policy (component M),
//! and the exported-resource ring (component N).

pub mod alert;
pub mod drift;
pub mod export;

pub use alert::{
    default_fingerprint, is_alert_worthy, AlertInbox, AlertItem, IngestAlert, IngestOutcome,
    Route, Severity,
};
pub use drift::{DriftPolicyError, DriftPolicyStore, DriftScopeKind, DriftWindow, DriftWindowKind};
pub use export::{
    ExportResource, ExportedResource, ExportedResourceStore, SelectorError, DEFAULT_CAPACITY,
};
