//! Request-level error taxonomy.
//!
//! Every variant maps to a fixed status and a fixed public message.
//! Diagnostic detail carried by `BadRequest` and `Internal` goes to the
//! log only, never into a response body.

use http::StatusCode;

use crate::http::pages;
use crate::http::parser::ParseError;
use crate::http::response::Response;
use crate::relay::controller::RelayError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("authentication required")]
    Unauthorized,
    #[error("login required")]
    LoginRedirect,
    #[error("CSRF token missing or invalid")]
    Forbidden,
    #[error("rate limit exceeded")]
    TooManyRequests,
    #[error("not found")]
    NotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("connection queue full")]
    QueueFull,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("relay hardware write failed")]
    HardwareWriteFailure,
    #[error("relay switched too recently")]
    TooFrequent,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::LoginRedirect => StatusCode::FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::TooManyRequests | AppError::TooFrequent => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) | AppError::HardwareWriteFailure => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text safe to show a client.
    pub fn public_message(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "Bad Request",
            AppError::Unauthorized => "Authentication required",
            AppError::LoginRedirect => "Login required",
            AppError::Forbidden => "Invalid or missing CSRF token",
            AppError::TooManyRequests => "Too Many Requests",
            AppError::NotFound => "Not Found",
            AppError::MethodNotAllowed => "Method Not Allowed",
            AppError::QueueFull => "Service Unavailable",
            AppError::Internal(_) => "Internal Server Error",
            AppError::HardwareWriteFailure => "Relay hardware error",
            AppError::TooFrequent => "Relay state changed too recently",
        }
    }

    /// HTML error page (or redirect) for browser routes.
    pub fn into_response(self) -> Response {
        self.log();
        match self {
            AppError::LoginRedirect => Response::redirect("/login"),
            AppError::Unauthorized => Response::html(
                self.status(),
                pages::error_page(self.status(), self.public_message()),
            )
            .with_header("WWW-Authenticate", "Basic realm=\"relay\""),
            _ => Response::html(
                self.status(),
                pages::error_page(self.status(), self.public_message()),
            ),
        }
    }

    /// `{"error": ...}` body for API routes.
    pub fn into_json_response(self) -> Response {
        self.log();
        match self {
            AppError::LoginRedirect => Response::redirect("/login"),
            _ => Response::json(
                self.status(),
                &serde_json::json!({ "error": self.public_message() }),
            ),
        }
    }

    fn log(&self) {
        match self {
            AppError::Internal(detail) => tracing::error!(detail = %detail, "Internal error"),
            AppError::HardwareWriteFailure => tracing::error!("Relay write failed"),
            AppError::BadRequest(detail) => tracing::debug!(detail = %detail, "Bad request"),
            _ => {}
        }
    }
}

impl From<ParseError> for AppError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::MethodNotAllowed(_) => AppError::MethodNotAllowed,
            ParseError::BadRequest(reason) => AppError::BadRequest(reason.to_string()),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::TooFrequent => AppError::TooFrequent,
            RelayError::HardwareWriteFailure(_) => AppError::HardwareWriteFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(AppError::BadRequest("x".into()).status(), 400);
        assert_eq!(AppError::Unauthorized.status(), 401);
        assert_eq!(AppError::LoginRedirect.status(), 302);
        assert_eq!(AppError::Forbidden.status(), 403);
        assert_eq!(AppError::NotFound.status(), 404);
        assert_eq!(AppError::MethodNotAllowed.status(), 405);
        assert_eq!(AppError::TooManyRequests.status(), 429);
        assert_eq!(AppError::Internal("x".into()).status(), 500);
        assert_eq!(AppError::QueueFull.status(), 503);
    }

    #[test]
    fn internal_detail_never_reaches_the_body() {
        let resp = AppError::Internal("stats file /secret/path unreadable".into()).into_response();
        let body = String::from_utf8(resp.body).unwrap();
        assert!(!body.contains("/secret/path"));
        assert!(body.contains("Internal Server Error"));

        let resp = AppError::Internal("db password=hunter2".into()).into_json_response();
        let body = String::from_utf8(resp.body).unwrap();
        assert!(!body.contains("hunter2"));
    }

    #[test]
    fn login_redirect_points_at_login() {
        let resp = AppError::LoginRedirect.into_response();
        assert_eq!(resp.status, StatusCode::FOUND);
        assert_eq!(resp.header("location"), Some("/login"));
    }

    #[test]
    fn unauthorized_challenges_for_basic() {
        let resp = AppError::Unauthorized.into_response();
        assert!(resp.header("www-authenticate").unwrap().starts_with("Basic"));
    }

    #[test]
    fn parse_errors_map() {
        let err: AppError = ParseError::MethodNotAllowed("BREW".into()).into();
        assert!(matches!(err, AppError::MethodNotAllowed));
        let err: AppError = ParseError::BadRequest("missing request target").into();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
