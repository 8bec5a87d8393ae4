//! Credentials, HTTP Basic parsing and cookie parsing.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;

use crate::config::WebServerConfig;
use crate::security::session::SessionId;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session_id";

/// Configured login credentials.
///
/// Comparison is plain equality against the configured plaintext password.
#[derive(Debug, Clone)]
pub struct Credentials {
    enabled: bool,
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(enabled: bool, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            enabled,
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn from_config(config: &WebServerConfig) -> Self {
        Self::new(
            config.enable_auth,
            config.auth_username.clone(),
            config.auth_password.clone(),
        )
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Always true while auth is disabled.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        if !self.enabled {
            return true;
        }
        if username == self.username && password == self.password {
            return true;
        }
        tracing::warn!(user = %username, "Authentication failed");
        false
    }
}

/// Decode an `Authorization: Basic ...` header into user and password.
///
/// Anything malformed yields `None`.
pub fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = match BASE64_STANDARD.decode(encoded.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "Error parsing basic auth");
            return None;
        }
    };
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Find `name` in a `key=value; key=value` cookie header. Last one wins.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .last()
}

/// Session id from a cookie header, if present and non-empty.
pub fn session_from_cookie(header: &str) -> Option<SessionId> {
    cookie_value(header, SESSION_COOKIE)
        .filter(|value| !value.is_empty())
        .map(SessionId::from)
}
