//! Route table and access decisions.
//!
//! # Responsibilities
//! - Map (method, path) to a route or an explicit miss
//! - Classify each route's access requirement
//! - Turn an authorization verdict into allow, redirect or refuse
//!
//! # Design Decisions
//! - Immutable after construction
//! - Exact path matching; the query string never takes part
//! - A known path with the wrong method is 405, an unknown path 404
//! - HEAD resolves like GET

use crate::error::AppError;
use crate::http::request::Method;
use crate::security::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Dashboard,
    LoginPage,
    Login,
    Logout,
    ConfigPage,
    ApiStatus,
    ApiRelayState,
    ApiSystemInfo,
    ApiStats,
    ApiRelaySet,
    ApiRelayToggle,
    ApiEmergencyStop,
    ApiStatsReset,
    /// CORS preflight for any API path.
    ApiPreflight,
}

/// What a caller must present to reach a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Protected,
    ProtectedWithCsrf,
}

impl Route {
    pub fn access(&self) -> Access {
        match self {
            Route::LoginPage | Route::Login | Route::Logout | Route::ApiPreflight => Access::Public,
            Route::Dashboard
            | Route::ConfigPage
            | Route::ApiStatus
            | Route::ApiRelayState
            | Route::ApiSystemInfo
            | Route::ApiStats => Access::Protected,
            Route::ApiRelaySet
            | Route::ApiRelayToggle
            | Route::ApiEmergencyStop
            | Route::ApiStatsReset => Access::ProtectedWithCsrf,
        }
    }
}

const ROUTES: &[(Method, &str, Route)] = &[
    (Method::Get, "/", Route::Dashboard),
    (Method::Get, "/login", Route::LoginPage),
    (Method::Post, "/login", Route::Login),
    (Method::Get, "/logout", Route::Logout),
    (Method::Get, "/config", Route::ConfigPage),
    (Method::Get, "/api/status", Route::ApiStatus),
    (Method::Get, "/api/relay/state", Route::ApiRelayState),
    (Method::Get, "/api/system/info", Route::ApiSystemInfo),
    (Method::Get, "/api/stats", Route::ApiStats),
    (Method::Post, "/api/relay/set", Route::ApiRelaySet),
    (Method::Post, "/api/relay/toggle", Route::ApiRelayToggle),
    (Method::Post, "/api/relay/emergency_stop", Route::ApiEmergencyStop),
    (Method::Post, "/api/stats/reset", Route::ApiStatsReset),
];

#[derive(Debug, Clone)]
pub struct Router {
    api_enabled: bool,
    cors_enabled: bool,
}

impl Router {
    pub fn new(api_enabled: bool, cors_enabled: bool) -> Self {
        Self {
            api_enabled,
            cors_enabled,
        }
    }

    pub fn cors_enabled(&self) -> bool {
        self.cors_enabled
    }

    /// Find the route for `method` and `path`.
    pub fn resolve(&self, method: Method, path: &str) -> Result<Route, AppError> {
        if is_api_path(path) {
            if !self.api_enabled {
                return Err(AppError::NotFound);
            }
            if method == Method::Options && self.cors_enabled {
                return Ok(Route::ApiPreflight);
            }
        }

        let method = if method == Method::Head { Method::Get } else { method };
        let mut path_known = false;
        for (route_method, route_path, route) in ROUTES {
            if *route_path == path {
                if *route_method == method {
                    return Ok(*route);
                }
                path_known = true;
            }
        }

        if path_known {
            Err(AppError::MethodNotAllowed)
        } else {
            Err(AppError::NotFound)
        }
    }

    /// Admit or refuse `verdict` for a route with `access`.
    ///
    /// Refusal is a login redirect when auth is enabled and a plain
    /// `Unauthorized` otherwise.
    pub fn gate(&self, access: Access, verdict: &Verdict, auth_enabled: bool) -> Result<(), AppError> {
        match access {
            Access::Public => Ok(()),
            Access::Protected | Access::ProtectedWithCsrf if verdict.is_authorized() => Ok(()),
            Access::Protected | Access::ProtectedWithCsrf => {
                if auth_enabled {
                    Err(AppError::LoginRedirect)
                } else {
                    Err(AppError::Unauthorized)
                }
            }
        }
    }
}

fn is_api_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        Router::new(true, true)
    }

    #[test]
    fn resolves_every_route() {
        let r = router();
        assert_eq!(r.resolve(Method::Get, "/").unwrap(), Route::Dashboard);
        assert_eq!(r.resolve(Method::Post, "/login").unwrap(), Route::Login);
        assert_eq!(r.resolve(Method::Get, "/login").unwrap(), Route::LoginPage);
        assert_eq!(r.resolve(Method::Get, "/api/stats").unwrap(), Route::ApiStats);
        assert_eq!(r.resolve(Method::Post, "/api/relay/set").unwrap(), Route::ApiRelaySet);
        assert_eq!(
            r.resolve(Method::Post, "/api/relay/emergency_stop").unwrap(),
            Route::ApiEmergencyStop
        );
    }

    #[test]
    fn head_resolves_like_get() {
        assert_eq!(router().resolve(Method::Head, "/config").unwrap(), Route::ConfigPage);
    }

    #[test]
    fn misses() {
        let r = router();
        assert!(matches!(r.resolve(Method::Get, "/nope"), Err(AppError::NotFound)));
        assert!(matches!(r.resolve(Method::Get, "/api/relay/set"), Err(AppError::MethodNotAllowed)));
        assert!(matches!(r.resolve(Method::Delete, "/"), Err(AppError::MethodNotAllowed)));
    }

    #[test]
    fn disabled_api_hides_everything_under_api() {
        let r = Router::new(false, true);
        assert!(matches!(r.resolve(Method::Get, "/api/status"), Err(AppError::NotFound)));
        assert!(matches!(r.resolve(Method::Get, "/api/relay/set"), Err(AppError::NotFound)));
        assert_eq!(r.resolve(Method::Get, "/").unwrap(), Route::Dashboard);
    }

    #[test]
    fn preflight_only_with_cors() {
        assert_eq!(
            router().resolve(Method::Options, "/api/relay/set").unwrap(),
            Route::ApiPreflight
        );
        let r = Router::new(true, false);
        assert!(matches!(r.resolve(Method::Options, "/api/relay/set"), Err(AppError::MethodNotAllowed)));
    }

    #[test]
    fn access_classes() {
        assert_eq!(Route::Login.access(), Access::Public);
        assert_eq!(Route::ApiStatus.access(), Access::Protected);
        assert_eq!(Route::ApiRelayToggle.access(), Access::ProtectedWithCsrf);
    }

    #[test]
    fn gate_decisions() {
        let r = router();
        assert!(r.gate(Access::Public, &Verdict::Anonymous, true).is_ok());
        assert!(r.gate(Access::Protected, &Verdict::Open, false).is_ok());
        assert!(matches!(
            r.gate(Access::Protected, &Verdict::Anonymous, true),
            Err(AppError::LoginRedirect)
        ));
        assert!(matches!(
            r.gate(Access::ProtectedWithCsrf, &Verdict::Anonymous, false),
            Err(AppError::Unauthorized)
        ));
        assert!(r
            .gate(Access::Protected, &Verdict::Basic { username: "admin".into() }, true)
            .is_ok());
    }
}
