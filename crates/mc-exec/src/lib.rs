//! Execution-side mutual exclusion: named key locks (component E) and
//! per-job leases (component F).

pub mod lease;
pub mod lock;

pub use lease::{LeaseError, LeaseStatus, RunLease, RunLeaseStore};
pub use lock::{ExecutionLock, ExecutionLockStore, LockError, LockStatus};
