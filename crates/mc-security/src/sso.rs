//! Identity providers, pending logins, and sessions with TTL-based lazy
//! expiry.
//!
//! Grounded on the same CSPRNG token path as [`crate::credential`] for
//! session tokens, and on `at-core/src/session_store.rs`'s TTL-adjacent
//! cache idiom for "expire on access rather than on a background sweep".

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use mc_core::clock::Clock;
use mc_core::id::IdGenerator;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tracing::info;

const SESSION_TOKEN_PREFIX: &str = "mcsso_";
const SESSION_TOKEN_ENTROPY_BYTES: usize = 24; // 48 hex chars
const PENDING_TTL: chrono::Duration = chrono::Duration::minutes(10);
const SESSION_TTL: chrono::Duration = chrono::Duration::hours(8);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoProvider {
    pub id: String,
    pub name: String,
    pub issuer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingLogin {
    pub id: String,
    pub provider_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoSession {
    pub id: String,
    pub provider_id: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum SsoError {
    #[error("sso provider not found")]
    ProviderNotFound,
    #[error("pending login not found")]
    PendingNotFound,
    #[error("pending login expired")]
    PendingExpired,
    #[error("pending login already consumed")]
    PendingConsumed,
    #[error("CSPRNG failure")]
    Csprng,
}

pub type Result<T> = std::result::Result<T, SsoError>;

pub struct SsoStore {
    providers: RwLock<Vec<SsoProvider>>,
    pending: RwLock<Vec<PendingLogin>>,
    // keyed by SHA-256-free plaintext session token since, unlike execution
    // credentials, spec.md does not require a hash index here.
    sessions: RwLock<std::collections::HashMap<String, SsoSession>>,
    rng: SystemRandom,
    clock: std::sync::Arc<dyn Clock>,
    provider_ids: IdGenerator,
    pending_ids: IdGenerator,
    session_ids: IdGenerator,
}

impl SsoStore {
    pub fn new(clock: std::sync::Arc<dyn Clock>) -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
            pending: RwLock::new(Vec::new()),
            sessions: RwLock::new(std::collections::HashMap::new()),
            rng: SystemRandom::new(),
            clock,
            provider_ids: IdGenerator::new("sso-provider"),
            pending_ids: IdGenerator::new("sso-pending"),
            session_ids: IdGenerator::new("sso-session"),
        }
    }

    pub fn register_provider(&self, name: impl Into<String>, issuer: impl Into<String>) -> SsoProvider {
        let provider = SsoProvider {
            id: self.provider_ids.next(),
            name: name.into(),
            issuer: issuer.into(),
        };
        self.providers.write().expect("providers lock poisoned").push(provider.clone());
        provider
    }

    pub fn begin_login(&self, provider_id: &str) -> Result<PendingLogin> {
        if !self
            .providers
            .read()
            .expect("providers lock poisoned")
            .iter()
            .any(|p| p.id == provider_id)
        {
            return Err(SsoError::ProviderNotFound);
        }

        let now = self.clock.now();
        let pending = PendingLogin {
            id: self.pending_ids.next(),
            provider_id: provider_id.to_string(),
            created_at: now,
            expires_at: now + PENDING_TTL,
            consumed: false,
        };
        self.pending.write().expect("pending lock poisoned").push(pending.clone());
        Ok(pending)
    }

    pub fn complete_login(&self, pending_id: &str, subject: impl Into<String>) -> Result<(SsoSession, String)> {
        let now = self.clock.now();
        let provider_id = {
            let mut pending = self.pending.write().expect("pending lock poisoned");
            let entry = pending
                .iter_mut()
                .find(|p| p.id == pending_id)
                .ok_or(SsoError::PendingNotFound)?;
            if entry.consumed {
                return Err(SsoError::PendingConsumed);
            }
            if entry.expires_at <= now {
                return Err(SsoError::PendingExpired);
            }
            entry.consumed = true;
            entry.provider_id.clone()
        };

        let mut entropy = [0u8; SESSION_TOKEN_ENTROPY_BYTES];
        self.rng.fill(&mut entropy).map_err(|_| SsoError::Csprng)?;
        let token = format!("{SESSION_TOKEN_PREFIX}{}", hex::encode(entropy));

        let session = SsoSession {
            id: self.session_ids.next(),
            provider_id,
            subject: subject.into(),
            created_at: now,
            expires_at: now + SESSION_TTL,
            revoked_at: None,
        };
        self.sessions
            .write()
            .expect("sessions lock poisoned")
            .insert(token.clone(), session.clone());

        info!(session_id = %session.id, "sso session created");
        Ok((session, token))
    }

    /// Lazily expires: a session past `expiresAt` or revoked is treated as
    /// absent without a background sweep.
    pub fn validate(&self, session_token: &str) -> Option<SsoSession> {
        let sessions = self.sessions.read().expect("sessions lock poisoned");
        let session = sessions.get(session_token)?;
        if session.revoked_at.is_some() || session.expires_at <= self.clock.now() {
            return None;
        }
        Some(session.clone())
    }

    pub fn revoke(&self, session_token: &str) -> bool {
        let mut sessions = self.sessions.write().expect("sessions lock poisoned");
        let Some(session) = sessions.get_mut(session_token) else {
            return false;
        };
        if session.revoked_at.is_none() {
            session.revoked_at = Some(self.clock.now());
        }
        true
    }
}
