//! Shared-password authentication
//!
//! One configured secret guards the whole application. A correct login
//! creates a random session id; pages check the id against the
//! [`SessionStore`]. Sessions expire a fixed time after login. There is no
//! per-user identity, lockout or rate limiting.
//!
//! No HTTP framework types here; cookie handling and redirects are in the UI crate.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// The configured login password, kept only as its SHA-256 digest
#[derive(Clone)]
pub struct SharedSecret {
    digest: [u8; 32],
}

impl SharedSecret {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    /// Compare digests without short-circuiting on the first differing byte
    pub fn verify(&self, candidate: &str) -> bool {
        let candidate: [u8; 32] = Sha256::digest(candidate.as_bytes()).into();
        self.digest
            .iter()
            .zip(candidate.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Session lifetime when none is configured
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Live authenticated sessions, keyed by id with their login time
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Instant>>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start a session if `candidate` matches the secret.
    /// Expired sessions are dropped on every successful login.
    pub async fn login(&self, secret: &SharedSecret, candidate: &str) -> Option<Uuid> {
        if !secret.verify(candidate) {
            return None;
        }
        let id = Uuid::new_v4();
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, started| now.duration_since(*started) < self.ttl);
        sessions.insert(id, now);
        Some(id)
    }

    pub async fn is_authenticated(&self, session: Uuid) -> bool {
        self.sessions
            .read()
            .await
            .get(&session)
            .is_some_and(|started| started.elapsed() < self.ttl)
    }

    /// Returns false if the session was not live
    pub async fn logout(&self, session: Uuid) -> bool {
        self.sessions.write().await.remove(&session).is_some()
    }

    pub async fn active(&self) -> usize {
        self.sessions.read().await.len()
    }
}
