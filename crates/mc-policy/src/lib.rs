//! Hierarchical role/environment attribute resolution, file-backed
//! (component I).

pub mod store;

pub use store::{
    DefinitionSource, EnvironmentDefinition, PolicyError, ResolvedPolicy, RoleDefinition,
    RoleEnvStore,
};
