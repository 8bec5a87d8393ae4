//! Shared utilities for end-to-end tests.
//!
//! Boots a device on an ephemeral port with a mock relay line and speaks
//! raw HTTP to it.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use relay_gate::config::DeviceConfig;
use relay_gate::lifecycle::Shutdown;
use relay_gate::relay::pin::MockPin;
use relay_gate::relay::stats::StatsStore;
use relay_gate::security::{Credentials, SecurityGate, SecuritySettings};
use relay_gate::{HttpServer, RelaySafetyController};

pub const USER: &str = "admin";
pub const PASSWORD: &str = "test-password";

/// Knobs for a test device.
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    pub enable_auth: bool,
    pub max_connections: usize,
    pub request_timeout_secs: u64,
    pub api_enabled: bool,
    pub security: Option<SecuritySettings>,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            enable_auth: false,
            max_connections: 5,
            request_timeout_secs: 2,
            api_enabled: true,
            security: None,
        }
    }
}

pub struct TestDevice {
    pub addr: SocketAddr,
    pub relay: RelaySafetyController,
    pub pin: MockPin,
    pub shutdown: Shutdown,
    pub server: JoinHandle<()>,
}

impl TestDevice {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Stop the loop and wait for it.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.server).await;
    }
}

pub async fn start_device(options: DeviceOptions) -> TestDevice {
    let mut config = DeviceConfig::default();
    config.web_server.bind_address = "127.0.0.1".into();
    config.web_server.port = 0;
    config.web_server.accept_poll_ms = 20;
    config.web_server.max_connections = options.max_connections;
    config.web_server.request_timeout = options.request_timeout_secs;
    config.web_server.enable_auth = options.enable_auth;
    config.web_server.auth_username = USER.into();
    config.web_server.auth_password = PASSWORD.into();
    config.api.enabled = options.api_enabled;
    config.relay.stats_path = String::new();

    let pin = MockPin::new(config.relay.pin);
    let relay = RelaySafetyController::new(&config.relay, Box::new(pin.clone()), StatsStore::new(None))
        .expect("relay controller");

    let web = config.web_server.clone();
    let mut server = HttpServer::bind(config, relay.clone()).await.expect("bind");
    if let Some(settings) = options.security {
        server = server.with_security(SecurityGate::with_settings(Credentials::from_config(&web), settings));
    }
    let addr = server.local_addr().expect("local addr");

    let shutdown = Shutdown::new();
    let stop = shutdown.subscribe();
    let server = tokio::spawn(server.run(stop));

    TestDevice {
        addr,
        relay,
        pin,
        shutdown,
        server,
    }
}

/// A response read off the wire.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("JSON body")
    }

    /// `session_id=...` pair from `Set-Cookie`.
    pub fn session_cookie(&self) -> Option<String> {
        self.header("set-cookie")
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }
}

pub fn parse_response(raw: &[u8]) -> RawResponse {
    let text = String::from_utf8_lossy(raw).into_owned();
    let (head, body) = text
        .split_once("\r\n\r\n")
        .unwrap_or((text.as_str(), ""));
    let mut lines = head.split("\r\n");
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .expect("status line");
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();
    RawResponse {
        status,
        headers,
        body: body.to_string(),
    }
}

/// Write `raw` on a fresh connection and read until the server closes.
pub async fn send_raw(addr: SocketAddr, raw: &[u8]) -> RawResponse {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(raw).await.expect("write");
    read_all(&mut stream).await
}

pub async fn read_all(stream: &mut TcpStream) -> RawResponse {
    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut buf))
        .await
        .expect("response in time")
        .expect("read");
    parse_response(&buf)
}

/// Build and send a request with an exact `Content-Length`.
pub async fn send(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> RawResponse {
    let mut raw = format!("{method} {path} HTTP/1.1\r\nHost: device\r\n");
    for (name, value) in headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    raw.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    send_raw(addr, raw.as_bytes()).await
}

pub async fn get(addr: SocketAddr, path: &str, headers: &[(&str, &str)]) -> RawResponse {
    send(addr, "GET", path, headers, "").await
}

/// Log in and return the session cookie pair.
pub async fn login(addr: SocketAddr) -> String {
    let body = format!("username={USER}&password={PASSWORD}");
    let resp = send(
        addr,
        "POST",
        "/login",
        &[("Content-Type", "application/x-www-form-urlencoded")],
        &body,
    )
    .await;
    assert_eq!(resp.status, 302, "login failed: {resp:?}");
    resp.session_cookie().expect("session cookie")
}

/// CSRF token issued by the dashboard for `cookie`.
pub async fn csrf_token(addr: SocketAddr, cookie: &str) -> String {
    let resp = get(addr, "/", &[("Cookie", cookie)]).await;
    assert_eq!(resp.status, 200);
    let token = resp.header("x-csrf-token").expect("csrf header").to_string();
    assert!(resp.body.contains(&format!("content=\"{token}\"")));
    token
}

/// Wait out the rapid-switch guard armed by the boot transition.
pub async fn settle_boot_guard() {
    tokio::time::sleep(Duration::from_millis(1100)).await;
}
