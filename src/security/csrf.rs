//! CSRF tokens for state-changing requests.
//!
//! Tokens are HMAC-SHA256 over the session id, the wall clock and a
//! counter, keyed with a secret drawn at startup. A token stays valid for
//! any number of requests until it expires.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tokio::time::Instant;

use crate::security::session::SessionId;

type HmacSha256 = Hmac<Sha256>;

/// Age after which a token is refused.
pub const CSRF_LIFETIME: Duration = Duration::from_secs(3600);

/// Hex characters kept from the digest.
const TOKEN_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct CsrfToken {
    pub token: String,
    pub session_id: SessionId,
    pub created_at: Instant,
}

/// Issued tokens keyed by token text.
pub struct CsrfStore {
    tokens: HashMap<String, CsrfToken>,
    lifetime: Duration,
    key: [u8; 32],
    counter: u64,
}

impl std::fmt::Debug for CsrfStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfStore")
            .field("tokens", &self.tokens.len())
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl CsrfStore {
    pub fn new(lifetime: Duration) -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self {
            tokens: HashMap::new(),
            lifetime,
            key,
            counter: 0,
        }
    }

    /// Issue a token bound to `session_id`, sweeping expired ones.
    pub fn generate(&mut self, session_id: &SessionId) -> String {
        let now = Instant::now();
        self.counter = self.counter.wrapping_add(1);
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();

        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(session_id.as_str().as_bytes());
        mac.update(&wall.to_be_bytes());
        mac.update(&self.counter.to_be_bytes());
        let mut token = hex::encode(mac.finalize().into_bytes());
        token.truncate(TOKEN_LEN);

        self.tokens.insert(
            token.clone(),
            CsrfToken {
                token: token.clone(),
                session_id: session_id.clone(),
                created_at: now,
            },
        );
        self.sweep(now);
        token
    }

    /// True when `token` is live and was issued to `session_id`.
    pub fn validate(&mut self, token: &str, session_id: &SessionId) -> bool {
        let now = Instant::now();
        let Some(entry) = self.tokens.get(token) else {
            return false;
        };

        if now.duration_since(entry.created_at) > self.lifetime {
            self.tokens.remove(token);
            return false;
        }

        if &entry.session_id != session_id {
            tracing::warn!(session = %session_id, "CSRF token presented by another session");
            return false;
        }
        true
    }

    fn sweep(&mut self, now: Instant) {
        let lifetime = self.lifetime;
        self.tokens
            .retain(|_, entry| now.duration_since(entry.created_at) <= lifetime);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
