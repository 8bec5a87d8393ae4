//! Route handlers.
//!
//! Each handler receives the parsed request and a [`HandlerContext`] and
//! returns a response or an [`AppError`]. Access checks have already run
//! when a handler is called.

use std::net::IpAddr;

use http::StatusCode;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::config::DeviceConfig;
use crate::error::AppError;
use crate::http::pages::{self, DashboardView};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::relay::controller::{RelayError, RelaySafetyController, Trigger};
use crate::relay::stats::unix_now;
use crate::routing::Route;
use crate::security::{SecurityGate, Verdict, CSRF_HEADER, SESSION_COOKIE};

/// Request bookkeeping reported by the status endpoints.
#[derive(Debug, Clone)]
pub struct ServerCounters {
    pub request_count: u64,
    /// Unix seconds, 0 before the first request.
    pub last_request_at: f64,
    pub started_at: Instant,
}

impl ServerCounters {
    pub fn new() -> Self {
        Self {
            request_count: 0,
            last_request_at: 0.0,
            started_at: Instant::now(),
        }
    }

    pub fn record(&mut self) {
        self.request_count += 1;
        self.last_request_at = unix_now();
    }

    pub fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

impl Default for ServerCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a handler may touch.
pub struct HandlerContext<'a> {
    pub config: &'a DeviceConfig,
    pub relay: &'a RelaySafetyController,
    pub security: &'a mut SecurityGate,
    pub counters: &'a ServerCounters,
    pub verdict: &'a Verdict,
    pub client_ip: IpAddr,
}

pub fn dispatch(route: Route, request: &Request, ctx: &mut HandlerContext<'_>) -> Result<Response, AppError> {
    match route {
        Route::Dashboard => dashboard(request, ctx),
        Route::LoginPage => Ok(Response::html(StatusCode::OK, pages::login_page(None))),
        Route::Login => login(request, ctx),
        Route::Logout => Ok(logout(request, ctx)),
        Route::ConfigPage => Ok(Response::html(StatusCode::OK, pages::config_page(ctx.config))),
        Route::ApiStatus => api_status(ctx),
        Route::ApiRelayState => Ok(Response::json(
            StatusCode::OK,
            &json!({ "state": ctx.relay.is_on(), "timestamp": unix_now() }),
        )),
        Route::ApiSystemInfo => Ok(api_system_info(ctx)),
        Route::ApiStats => api_stats(ctx),
        Route::ApiRelaySet => api_relay_set(request, ctx),
        Route::ApiRelayToggle => api_relay_toggle(ctx),
        Route::ApiEmergencyStop => api_emergency_stop(ctx),
        Route::ApiStatsReset => api_stats_reset(ctx),
        Route::ApiPreflight => Ok(preflight()),
    }
}

fn dashboard(request: &Request, ctx: &mut HandlerContext<'_>) -> Result<Response, AppError> {
    // `?relay=on|off` shortcut used by bookmark-style clients.
    if let Some(target) = request.query_param("relay").as_deref().and_then(parse_on_off) {
        match ctx.relay.request_transition(target, false, Trigger::User) {
            Ok(_) => tracing::info!(state = target, "Relay switched from dashboard"),
            Err(RelayError::TooFrequent) => tracing::warn!("Dashboard switch ignored, too frequent"),
            Err(e @ RelayError::HardwareWriteFailure(_)) => {
                tracing::error!(error = %e, "Dashboard switch failed");
                return Err(AppError::HardwareWriteFailure);
            }
        }
    }

    let csrf_token = ctx
        .verdict
        .session_id()
        .map(|id| ctx.security.generate_csrf(id));
    let status = ctx.relay.status();
    let html = pages::dashboard(&DashboardView {
        device_name: &ctx.config.system.device_name,
        status: &status,
        csrf_token: csrf_token.as_deref(),
        username: ctx.verdict.username(),
    });

    let mut response = Response::html(StatusCode::OK, html);
    if let Some(token) = &csrf_token {
        response = response.with_header(CSRF_HEADER, token);
    }
    Ok(response)
}

fn login(request: &Request, ctx: &mut HandlerContext<'_>) -> Result<Response, AppError> {
    let username = request.form_field("username").unwrap_or_default();
    let password = request.form_field("password").unwrap_or_default();

    if !ctx.security.authenticate(&username, &password) {
        return Ok(Response::html(
            StatusCode::UNAUTHORIZED,
            pages::login_page(Some("Invalid username or password")),
        ));
    }

    let id = ctx.security.create_session(&username, ctx.client_ip);
    Ok(Response::redirect("/").with_header(
        "Set-Cookie",
        &format!("{SESSION_COOKIE}={id}; HttpOnly; Path=/; SameSite=Strict"),
    ))
}

fn logout(request: &Request, ctx: &mut HandlerContext<'_>) -> Response {
    if let Some(id) = ctx.security.resolve_session(request.header("cookie")) {
        ctx.security.destroy_session(&id);
    }
    Response::redirect("/login").with_header(
        "Set-Cookie",
        &format!("{SESSION_COOKIE}=; HttpOnly; Path=/; Max-Age=0"),
    )
}

fn api_status(ctx: &HandlerContext<'_>) -> Result<Response, AppError> {
    let relay = serde_json::to_value(ctx.relay.status()).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Response::json(
        StatusCode::OK,
        &json!({
            "relay": relay,
            "system": {
                "device_name": ctx.config.system.device_name,
                "uptime": ctx.counters.uptime_secs(),
                "request_count": ctx.counters.request_count,
                "last_request_at": ctx.counters.last_request_at,
            },
            "timestamp": unix_now(),
        }),
    ))
}

fn api_system_info(ctx: &HandlerContext<'_>) -> Response {
    Response::json(
        StatusCode::OK,
        &json!({
            "device_name": ctx.config.system.device_name,
            "uptime": ctx.counters.uptime_secs(),
            "request_count": ctx.counters.request_count,
            "last_request_at": ctx.counters.last_request_at,
            "relay_pin": ctx.relay.pin_number(),
            "active_sessions": ctx.security.session_count(),
            "firmware": concat!("relay-gate ", env!("CARGO_PKG_VERSION")),
        }),
    )
}

fn api_stats(ctx: &HandlerContext<'_>) -> Result<Response, AppError> {
    let report =
        serde_json::to_value(ctx.relay.statistics_report()).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Response::json(StatusCode::OK, &report))
}

/// Desired relay state from a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCommand {
    Set(bool),
    Toggle,
}

/// Parse the `state` value of a set request.
///
/// Booleans, `0`/`1` and the words on, off, true, false, toggle are
/// accepted. A missing value means off.
pub fn parse_relay_command(value: Option<&Value>) -> Result<RelayCommand, AppError> {
    match value {
        None | Some(Value::Null) => Ok(RelayCommand::Set(false)),
        Some(Value::Bool(b)) => Ok(RelayCommand::Set(*b)),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(0) => Ok(RelayCommand::Set(false)),
            Some(1) => Ok(RelayCommand::Set(true)),
            _ => Err(AppError::BadRequest(format!("invalid relay state {n}"))),
        },
        Some(Value::String(s)) => parse_command_word(s),
        Some(other) => Err(AppError::BadRequest(format!("invalid relay state {other}"))),
    }
}

fn parse_command_word(word: &str) -> Result<RelayCommand, AppError> {
    let word = word.trim().to_ascii_lowercase();
    if word == "toggle" {
        return Ok(RelayCommand::Toggle);
    }
    parse_on_off(&word)
        .map(RelayCommand::Set)
        .ok_or_else(|| AppError::BadRequest(format!("invalid relay state {word:?}")))
}

fn parse_on_off(word: &str) -> Option<bool> {
    match word.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn set_body_state(request: &Request) -> Result<Option<Value>, AppError> {
    let is_form = request
        .header("content-type")
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        return Ok(request.form_field("state").map(Value::String));
    }

    if request.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let body: Value = serde_json::from_slice(&request.body)
        .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {e}")))?;
    match body {
        Value::Object(mut map) => Ok(map.remove("state")),
        _ => Err(AppError::BadRequest("JSON body must be an object".to_string())),
    }
}

fn api_relay_set(request: &Request, ctx: &mut HandlerContext<'_>) -> Result<Response, AppError> {
    let command = parse_relay_command(set_body_state(request)?.as_ref())?;
    let result = match command {
        RelayCommand::Set(target) => ctx.relay.request_transition(target, false, Trigger::User),
        RelayCommand::Toggle => ctx.relay.toggle(),
    };

    match result {
        Ok(_) => Ok(Response::json(
            StatusCode::OK,
            &json!({ "success": true, "state": ctx.relay.is_on(), "timestamp": unix_now() }),
        )),
        Err(RelayError::TooFrequent) => Ok(Response::json(
            StatusCode::OK,
            &json!({
                "success": false,
                "state": ctx.relay.is_on(),
                "error": AppError::TooFrequent.public_message(),
                "timestamp": unix_now(),
            }),
        )),
        Err(e) => Err(e.into()),
    }
}

fn api_relay_toggle(ctx: &mut HandlerContext<'_>) -> Result<Response, AppError> {
    match ctx.relay.toggle() {
        Ok(_) => Ok(Response::json(
            StatusCode::OK,
            &json!({ "success": true, "new_state": ctx.relay.is_on(), "timestamp": unix_now() }),
        )),
        Err(RelayError::TooFrequent) => Ok(Response::json(
            StatusCode::OK,
            &json!({
                "success": false,
                "new_state": ctx.relay.is_on(),
                "error": AppError::TooFrequent.public_message(),
                "timestamp": unix_now(),
            }),
        )),
        Err(e) => Err(e.into()),
    }
}

fn api_emergency_stop(ctx: &mut HandlerContext<'_>) -> Result<Response, AppError> {
    ctx.relay.emergency_stop()?;
    tracing::warn!(user = ctx.verdict.username().unwrap_or("-"), "Emergency stop requested");
    Ok(Response::json(
        StatusCode::OK,
        &json!({ "success": true, "state": ctx.relay.is_on(), "timestamp": unix_now() }),
    ))
}

fn api_stats_reset(ctx: &mut HandlerContext<'_>) -> Result<Response, AppError> {
    ctx.relay.reset_statistics();
    let report =
        serde_json::to_value(ctx.relay.statistics_report()).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Response::json(
        StatusCode::OK,
        &json!({ "success": true, "statistics": report, "timestamp": unix_now() }),
    ))
}

fn preflight() -> Response {
    Response::new(StatusCode::NO_CONTENT)
        .with_header("Access-Control-Allow-Origin", "*")
        .with_header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .with_header(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization, X-CSRF-Token",
        )
        .with_header("Access-Control-Max-Age", "600")
}
