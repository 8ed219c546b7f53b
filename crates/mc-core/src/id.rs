//! Per-kind monotonically increasing opaque IDs of the form `<kind>-<n>`.
//!
//! IDs are never reused and never sparse within a process lifetime: the
//! counter only ever increments, even for operations that ultimately fail
//! validation after the ID was minted.

use std::sync::atomic::{AtomicU64, Ordering};

/// Generates IDs of the form `<prefix>-<n>`, `n` starting at 1.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: &'static str,
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: AtomicU64::new(1),
        }
    }

    /// Mint the next ID in the sequence.
    pub fn next(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}
