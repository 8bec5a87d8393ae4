//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (sliding window per client IP)
//!     → routing decides whether the path is gated
//!     → authorize(): session cookie first, then Basic credentials
//!     → csrf.rs (POST routes only, token bound to the session)
//!     → Pass to handler
//! ```
//!
//! # Design Decisions
//! - All stores are owned by one `SecurityGate` that lives inside the
//!   serving loop, so none of them needs a lock
//! - Expiry is lazy: entries are swept when touched, never by a timer
//! - With auth disabled every request is authorized and CSRF is skipped

pub mod auth;
pub mod csrf;
pub mod rate_limit;
pub mod session;

use std::net::IpAddr;
use std::time::Duration;

use crate::config::{ApiConfig, WebServerConfig};
use crate::http::request::Request;

pub use auth::{parse_basic_auth, Credentials, SESSION_COOKIE};
pub use csrf::{CsrfStore, CSRF_LIFETIME};
pub use rate_limit::{RateLimiter, RATE_LIMIT_WINDOW};
pub use session::{SessionId, SessionStore, SESSION_LIFETIME};

/// Request header carrying a CSRF token.
pub const CSRF_HEADER: &str = "X-CSRF-Token";
/// Query parameter carrying a CSRF token.
pub const CSRF_QUERY_PARAM: &str = "csrf_token";

/// Lifetimes and limits of the gate's stores.
#[derive(Debug, Clone, Copy)]
pub struct SecuritySettings {
    pub session_lifetime: Duration,
    pub csrf_lifetime: Duration,
    pub rate_window: Duration,
    pub max_requests: usize,
}

impl SecuritySettings {
    pub fn from_config(api: &ApiConfig) -> Self {
        Self {
            max_requests: api.rate_limit,
            ..Self::default()
        }
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            session_lifetime: SESSION_LIFETIME,
            csrf_lifetime: CSRF_LIFETIME,
            rate_window: RATE_LIMIT_WINDOW,
            max_requests: 60,
        }
    }
}

/// Outcome of authorizing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Auth is disabled.
    Open,
    Session { id: SessionId, username: String },
    Basic { username: String },
    Anonymous,
}

impl Verdict {
    pub fn is_authorized(&self) -> bool {
        !matches!(self, Verdict::Anonymous)
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Verdict::Session { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Verdict::Session { username, .. } | Verdict::Basic { username } => Some(username),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct SecurityGate {
    credentials: Credentials,
    rate_limiter: RateLimiter,
    sessions: SessionStore,
    csrf: CsrfStore,
}

impl SecurityGate {
    pub fn new(web: &WebServerConfig, api: &ApiConfig) -> Self {
        Self::with_settings(Credentials::from_config(web), SecuritySettings::from_config(api))
    }

    pub fn with_settings(credentials: Credentials, settings: SecuritySettings) -> Self {
        Self {
            credentials,
            rate_limiter: RateLimiter::new(settings.max_requests, settings.rate_window),
            sessions: SessionStore::new(settings.session_lifetime),
            csrf: CsrfStore::new(settings.csrf_lifetime),
        }
    }

    pub fn auth_enabled(&self) -> bool {
        self.credentials.enabled()
    }

    /// Admit or refuse one request from `ip`.
    pub fn check_rate_limit(&mut self, ip: IpAddr) -> bool {
        self.rate_limiter.check(ip)
    }

    /// Session id from a `Cookie` header.
    pub fn resolve_session(&self, cookie_header: Option<&str>) -> Option<SessionId> {
        cookie_header.and_then(auth::session_from_cookie)
    }

    pub fn validate_session(&mut self, id: &SessionId, ip: IpAddr) -> bool {
        self.sessions.validate(id, ip)
    }

    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.credentials.authenticate(username, password)
    }

    pub fn create_session(&mut self, username: &str, ip: IpAddr) -> SessionId {
        self.sessions.create(username, ip)
    }

    pub fn destroy_session(&mut self, id: &SessionId) -> bool {
        self.sessions.destroy(id)
    }

    pub fn generate_csrf(&mut self, session_id: &SessionId) -> String {
        self.csrf.generate(session_id)
    }

    pub fn validate_csrf(&mut self, token: &str, session_id: &SessionId) -> bool {
        self.csrf.validate(token, session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Decide who is making `request`. Sessions win over Basic credentials.
    pub fn authorize(&mut self, request: &Request, ip: IpAddr) -> Verdict {
        if !self.auth_enabled() {
            return Verdict::Open;
        }

        if let Some(id) = self.resolve_session(request.header("cookie")) {
            if self.sessions.validate(&id, ip) {
                let username = self
                    .sessions
                    .get(&id)
                    .map(|s| s.username.clone())
                    .unwrap_or_default();
                return Verdict::Session { id, username };
            }
        }

        if let Some((username, password)) = request.header("authorization").and_then(parse_basic_auth)
        {
            if self.credentials.authenticate(&username, &password) {
                return Verdict::Basic { username };
            }
        }

        Verdict::Anonymous
    }

    /// CSRF check for a state-changing request.
    ///
    /// Skipped with auth disabled. Otherwise the token must belong to the
    /// request's session, so Basic-only clients cannot pass.
    pub fn check_csrf(&mut self, verdict: &Verdict, token: Option<&str>) -> bool {
        match verdict {
            Verdict::Open => true,
            Verdict::Session { id, .. } => match token {
                Some(token) => self.csrf.validate(token, id),
                None => false,
            },
            Verdict::Basic { .. } | Verdict::Anonymous => false,
        }
    }
}

/// CSRF token presented with `request`, header first.
pub fn csrf_token_from(request: &Request) -> Option<String> {
    request
        .header(CSRF_HEADER)
        .map(str::to_string)
        .or_else(|| request.query_param(CSRF_QUERY_PARAM))
        .filter(|token| !token.is_empty())
}
