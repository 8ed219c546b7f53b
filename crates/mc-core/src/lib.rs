//! Foundational types shared by every masterchef-core store crate.
//!
//! Provides:
//! - [`clock`] — a monotonic, injectable source of UTC timestamps
//! - [`id`] — per-kind monotonically increasing opaque IDs (`<kind>-<n>`)
//! - [`canonical`] — deterministic JSON canonicalization + SHA-256 fingerprint

pub mod canonical;
pub mod clock;
pub mod id;
