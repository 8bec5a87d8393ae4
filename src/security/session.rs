//! Login sessions bound to a client IP.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

/// Inactivity after which a session is dropped.
pub const SESSION_LIFETIME: Duration = Duration::from_secs(1800);

/// Opaque 32 hex character session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub username: String,
    pub client_ip: IpAddr,
    pub created_at: Instant,
    pub last_activity_at: Instant,
}

/// Active sessions keyed by id, with lazy expiry.
#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
    lifetime: Duration,
}

impl SessionStore {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            lifetime,
        }
    }

    /// Start a session for `username` bound to `client_ip`.
    pub fn create(&mut self, username: &str, client_ip: IpAddr) -> SessionId {
        let now = Instant::now();
        self.sweep(now);

        let id = SessionId::generate();
        self.sessions.insert(
            id.clone(),
            Session {
                id: id.clone(),
                username: username.to_string(),
                client_ip,
                created_at: now,
                last_activity_at: now,
            },
        );
        tracing::info!(user = %username, client = %client_ip, "Session created");
        id
    }

    /// Check `id` for `client_ip`, refreshing its activity clock when valid.
    ///
    /// An expired session is evicted. A session presented from another IP
    /// is rejected but kept for its owner.
    pub fn validate(&mut self, id: &SessionId, client_ip: IpAddr) -> bool {
        let now = Instant::now();
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };

        if now.duration_since(session.last_activity_at) > self.lifetime {
            tracing::info!(user = %session.username, "Session expired");
            self.sessions.remove(id);
            return false;
        }

        if session.client_ip != client_ip {
            tracing::warn!(session = %id, expected = %session.client_ip, got = %client_ip, "IP mismatch for session");
            return false;
        }

        session.last_activity_at = now;
        true
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Logout. Returns whether the session existed.
    pub fn destroy(&mut self, id: &SessionId) -> bool {
        match self.sessions.remove(id) {
            Some(session) => {
                tracing::info!(user = %session.username, "Session destroyed");
                true
            }
            None => false,
        }
    }

    fn sweep(&mut self, now: Instant) {
        let lifetime = self.lifetime;
        self.sessions.retain(|_, session| {
            let live = now.duration_since(session.last_activity_at) <= lifetime;
            if !live {
                tracing::debug!(user = %session.username, "Expired session cleaned up");
            }
            live
        });
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
