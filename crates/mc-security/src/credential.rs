//! Execution credentials: opaque bearer tokens scoped to a subject.
//!
//! Grounded on `at-core/src/crypto.rs`'s `SystemRandom`-backed entropy
//! source and on the hash-don't-store discipline `at-bridge/src/auth.rs`
//! applies to its single static API key, generalized to many credentials
//! identified by a SHA-256 index rather than a single constant-time
//! comparison, so validation stays a hash lookup and never a linear scan.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mc_core::clock::Clock;
use mc_core::id::IdGenerator;
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tracing::info;
use zeroize::Zeroize;

const TOKEN_PREFIX: &str = "mcex_";
const TOKEN_ENTROPY_BYTES: usize = 32;
const MIN_TTL_SECS: i64 = 30;
const MAX_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionCredential {
    pub id: String,
    pub subject: String,
    pub scopes: Vec<String>,
    pub ttl_secs: i64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Returned once by [`ExecutionCredentialStore::issue`]; the plaintext
/// token cannot be recovered from any later store read.
pub struct IssuedCredential {
    pub credential: ExecutionCredential,
    pub token: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("subject is required")]
    SubjectRequired,
    #[error("ttl must be between 30 and 3600 seconds")]
    TtlOutOfRange,
    #[error("token is required")]
    TokenRequired,
    #[error("credential token not recognized")]
    TokenNotRecognized,
    #[error("execution credential revoked")]
    Revoked,
    #[error("execution credential expired")]
    Expired,
    #[error("missing required scopes: {0}")]
    MissingScopes(String),
    #[error("CSPRNG failure")]
    Csprng,
}

pub type Result<T> = std::result::Result<T, CredentialError>;

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(digest(&SHA256, bytes).as_ref())
}

pub struct ExecutionCredentialStore {
    credentials: DashMap<String, ExecutionCredential>,
    // SHA-256(token) hex -> credential id. The plaintext token is never
    // retained anywhere in the store.
    by_hash: DashMap<String, String>,
    rng: SystemRandom,
    clock: std::sync::Arc<dyn Clock>,
    ids: IdGenerator,
    _history: RwLock<()>,
}

impl ExecutionCredentialStore {
    pub fn new(clock: std::sync::Arc<dyn Clock>) -> Self {
        Self {
            credentials: DashMap::new(),
            by_hash: DashMap::new(),
            rng: SystemRandom::new(),
            clock,
            ids: IdGenerator::new("execcred"),
            _history: RwLock::new(()),
        }
    }

    pub fn issue(
        &self,
        subject: impl Into<String>,
        scopes: Vec<String>,
        ttl_secs: i64,
    ) -> Result<IssuedCredential> {
        let subject = subject.into();
        if subject.trim().is_empty() {
            return Err(CredentialError::SubjectRequired);
        }
        if !(MIN_TTL_SECS..=MAX_TTL_SECS).contains(&ttl_secs) {
            return Err(CredentialError::TtlOutOfRange);
        }

        let mut entropy = [0u8; TOKEN_ENTROPY_BYTES];
        self.rng.fill(&mut entropy).map_err(|_| CredentialError::Csprng)?;
        let token = format!("{TOKEN_PREFIX}{}", hex::encode(entropy));
        entropy.zeroize();

        let mut scopes = scopes;
        scopes.sort();
        scopes.dedup();

        let now = self.clock.now();
        let credential = ExecutionCredential {
            id: self.ids.next(),
            subject,
            scopes,
            ttl_secs,
            issued_at: now,
            expires_at: now + chrono::Duration::seconds(ttl_secs),
            revoked_at: None,
        };

        let hash = sha256_hex(token.as_bytes());
        self.by_hash.insert(hash, credential.id.clone());
        self.credentials.insert(credential.id.clone(), credential.clone());

        info!(credential_id = %credential.id, subject = %credential.subject, "execution credential issued");
        Ok(IssuedCredential { credential, token })
    }

    /// Checks, in order: token present, token recognized, not revoked, not
    /// expired, required scopes are a subset of the credential's scopes.
    pub fn validate(&self, token: &str, required_scopes: &[String]) -> Result<ExecutionCredential> {
        if token.is_empty() {
            return Err(CredentialError::TokenRequired);
        }

        let hash = sha256_hex(token.as_bytes());
        let credential_id = self
            .by_hash
            .get(&hash)
            .map(|e| e.clone())
            .ok_or(CredentialError::TokenNotRecognized)?;
        let credential = self
            .credentials
            .get(&credential_id)
            .map(|e| e.clone())
            .ok_or(CredentialError::TokenNotRecognized)?;

        if credential.revoked_at.is_some() {
            return Err(CredentialError::Revoked);
        }
        if self.clock.now() >= credential.expires_at {
            return Err(CredentialError::Expired);
        }

        let missing: Vec<&str> = required_scopes
            .iter()
            .filter(|s| !credential.scopes.iter().any(|have| have == *s))
            .map(|s| s.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(CredentialError::MissingScopes(missing.join(",")));
        }

        Ok(credential)
    }

    /// Idempotent: re-revoking a credential preserves its original
    /// `revokedAt`.
    pub fn revoke(&self, credential_id: &str) -> bool {
        let Some(mut entry) = self.credentials.get_mut(credential_id) else {
            return false;
        };
        if entry.revoked_at.is_none() {
            entry.revoked_at = Some(self.clock.now());
        }
        true
    }

    pub fn get(&self, credential_id: &str) -> Option<ExecutionCredential> {
        self.credentials.get(credential_id).map(|e| e.clone())
    }
}
