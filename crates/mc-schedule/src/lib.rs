//! Scheduling: per-config tickers (component C) and the revisioned
//! config-path-to-target bindings built on top of them (component D).

pub mod association;
pub mod jitter;
pub mod scheduler;

pub use association::{
    Association, AssociationError, AssociationRevision, AssociationStore, CreateAssociation,
    RevisionAction,
};
pub use jitter::{FixedJitter, JitterSource, ProcessJitter};
pub use scheduler::{
    Schedule, ScheduleOptions, ScheduleTarget, Scheduler, SchedulerError, TargetKind,
};
