//! HTML pages.
//!
//! Plain string templates. Anything interpolated from configuration or
//! request data goes through [`escape`].

use http::StatusCode;

use crate::config::DeviceConfig;
use crate::relay::controller::RelayStatus;

/// Escape text for an HTML body or a double-quoted attribute.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "body{font-family:sans-serif;background:#f4f4f8;margin:0;padding:20px}\
.box{background:#fff;max-width:420px;margin:40px auto;padding:30px;border-radius:12px;text-align:center}\
.status{padding:12px;border-radius:8px;font-weight:bold;margin-bottom:20px}\
.on{background:#d4edda;color:#155724}.off{background:#f8d7da;color:#721c24}\
table{width:100%;text-align:left}button{padding:10px 18px;margin:4px}";

fn layout(title: &str, head_extra: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
{head_extra}<title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
<div class=\"box\">\n{body}\n</div>\n</body>\n</html>\n",
        title = escape(title),
    )
}

/// Data shown on the dashboard.
#[derive(Debug)]
pub struct DashboardView<'a> {
    pub device_name: &'a str,
    pub status: &'a RelayStatus,
    /// Present when the viewer has a session.
    pub csrf_token: Option<&'a str>,
    pub username: Option<&'a str>,
}

pub fn dashboard(view: &DashboardView<'_>) -> String {
    let status = view.status;
    let (class, label) = if status.state { ("on", "ON") } else { ("off", "OFF") };
    let meta = match view.csrf_token {
        Some(token) => format!("<meta name=\"csrf-token\" content=\"{}\">\n", escape(token)),
        None => String::new(),
    };
    let account = match view.username {
        Some(user) => format!("<p>Signed in as {} | <a href=\"/logout\">Log out</a></p>", escape(user)),
        None => String::new(),
    };

    let body = format!(
        r#"<h1>{name}</h1>
<div class="status {class}" id="status">Relay Status: {label}</div>
<button onclick="relay('/api/relay/set', {{state: 'on'}})">On</button>
<button onclick="relay('/api/relay/set', {{state: 'off'}})">Off</button>
<button onclick="relay('/api/relay/toggle', {{}})">Toggle</button>
<table>
<tr><td>Current session</td><td>{current:.1}s</td></tr>
<tr><td>Total runtime</td><td>{runtime:.1}s</td></tr>
<tr><td>Total cycles</td><td>{cycles}</td></tr>
<tr><td>GPIO pin</td><td>{pin}</td></tr>
</table>
<p><a href="/config">Settings</a> | <a href="/api/status">API</a></p>
{account}
<script>
function relay(path, body) {{
  const meta = document.querySelector('meta[name="csrf-token"]');
  const headers = {{'Content-Type': 'application/json'}};
  if (meta) headers['X-CSRF-Token'] = meta.content;
  fetch(path, {{method: 'POST', headers: headers, body: JSON.stringify(body)}})
    .then(function () {{ window.location.reload(); }});
}}
</script>"#,
        name = escape(view.device_name),
        current = status.current_session_duration,
        runtime = status.total_runtime,
        cycles = status.total_cycles,
        pin = status.pin,
    );

    layout(&format!("{} Control", view.device_name), &meta, &body)
}

pub fn login_page(error: Option<&str>) -> String {
    let notice = match error {
        Some(msg) => format!("<p class=\"status off\">{}</p>", escape(msg)),
        None => String::new(),
    };
    let body = format!(
        r#"<h1>Login</h1>
{notice}
<form method="POST" action="/login">
<p><input name="username" placeholder="Username" autocomplete="username"></p>
<p><input name="password" type="password" placeholder="Password" autocomplete="current-password"></p>
<p><button type="submit">Sign in</button></p>
</form>"#
    );
    layout("Login", "", &body)
}

/// Read-only settings view. Never shows secrets.
pub fn config_page(config: &DeviceConfig) -> String {
    let relay = &config.relay;
    let web = &config.web_server;
    let body = format!(
        r#"<h1>System Configuration</h1>
<table>
<tr><td>Device name</td><td>{name}</td></tr>
<tr><td>WiFi SSID</td><td>{ssid}</td></tr>
<tr><td>Relay pin</td><td>{pin}</td></tr>
<tr><td>Active low</td><td>{active_low}</td></tr>
<tr><td>Initial state</td><td>{initial}</td></tr>
<tr><td>Safety timeout</td><td>{safety}s</td></tr>
<tr><td>Max on time</td><td>{max_on}s</td></tr>
<tr><td>Port</td><td>{port}</td></tr>
<tr><td>Max connections</td><td>{max_conn}</td></tr>
<tr><td>Request timeout</td><td>{timeout}s</td></tr>
<tr><td>Authentication</td><td>{auth}</td></tr>
<tr><td>API rate limit</td><td>{rate}/min</td></tr>
</table>
<p><a href="/">Back to Main</a></p>"#,
        name = escape(&config.system.device_name),
        ssid = escape(&config.wifi.ssid),
        pin = relay.pin,
        active_low = relay.active_low,
        initial = if relay.initial_state { "on" } else { "off" },
        safety = relay.safety_timeout,
        max_on = relay.max_on_time,
        port = web.port,
        max_conn = web.max_connections,
        timeout = web.request_timeout,
        auth = if web.enable_auth { "enabled" } else { "disabled" },
        rate = config.api.rate_limit,
    );
    layout("Configuration", "", &body)
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let code = status.as_u16();
    layout(
        &format!("Error {code}"),
        "",
        &format!("<h1>Error {code}</h1>\n<p>{}</p>", escape(message)),
    )
}
