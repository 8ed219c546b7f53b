//! Access control and identity: execution credentials (component G), RBAC
//! (component H), and SSO sessions (component J).

pub mod credential;
pub mod rbac;
pub mod sso;

pub use credential::{CredentialError, ExecutionCredential, ExecutionCredentialStore, IssuedCredential};
pub use rbac::{AccessDecision, Permission, RbacBinding, RbacError, RbacRole, RbacStore};
pub use sso::{PendingLogin, SsoError, SsoProvider, SsoSession, SsoStore};
