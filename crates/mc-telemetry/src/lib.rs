//! Observability primitives shared by every masterchef-core store crate.
//!
//! This crate carries only in-process logging setup. Metrics/trace export
//! to an external collector is out of scope for the control-plane core
//! (see spec.md §1 Non-goals) — callers that need it wire their own
//! `tracing` subscriber layer around what's initialized here.

pub mod logging;
