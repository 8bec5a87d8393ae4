use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::redirect::Policy;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Management CLI for a relay-gate device", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:80")]
    url: String,

    /// Login user. Without it requests go out anonymous.
    #[arg(long)]
    user: Option<String>,

    #[arg(long, default_value = "")]
    password: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Device and relay status
    Status,
    /// Relay on/off only
    State,
    /// Switch the relay on
    On,
    /// Switch the relay off
    Off,
    /// Flip the relay
    Toggle,
    /// Usage statistics
    Stats,
    /// System information
    Info,
    /// Zero the usage statistics
    ResetStats,
    /// Force the relay off immediately
    EmergencyStop,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    // Redirects carry the login cookie, so follow them by hand.
    let client = reqwest::Client::builder().redirect(Policy::none()).build()?;
    let base = cli.url.trim_end_matches('/').to_string();

    let mut headers = HeaderMap::new();
    if let Some(user) = &cli.user {
        let cookie = login(&client, &base, user, &cli.password).await?;
        headers.insert(COOKIE, HeaderValue::from_str(&cookie)?);
    }

    let res = match cli.command {
        Commands::Status => get(&client, &base, "/api/status", &headers).await?,
        Commands::State => get(&client, &base, "/api/relay/state", &headers).await?,
        Commands::Stats => get(&client, &base, "/api/stats", &headers).await?,
        Commands::Info => get(&client, &base, "/api/system/info", &headers).await?,
        Commands::On => {
            post(&client, &base, "/api/relay/set", headers, Some(json!({ "state": "on" }))).await?
        }
        Commands::Off => {
            post(&client, &base, "/api/relay/set", headers, Some(json!({ "state": "off" }))).await?
        }
        Commands::Toggle => post(&client, &base, "/api/relay/toggle", headers, None).await?,
        Commands::ResetStats => post(&client, &base, "/api/stats/reset", headers, None).await?,
        Commands::EmergencyStop => {
            post(&client, &base, "/api/relay/emergency_stop", headers, None).await?
        }
    };

    print_response(res).await
}

/// Log in and return the `session_id=...` cookie pair.
async fn login(
    client: &reqwest::Client,
    base: &str,
    user: &str,
    password: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let res = client
        .post(format!("{base}/login"))
        .form(&[("username", user), ("password", password)])
        .send()
        .await?;

    let cookie = res
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string);
    match cookie {
        Some(cookie) if res.status().is_redirection() => Ok(cookie),
        _ => Err(format!("login failed with status {}", res.status()).into()),
    }
}

async fn get(
    client: &reqwest::Client,
    base: &str,
    path: &str,
    headers: &HeaderMap,
) -> Result<reqwest::Response, reqwest::Error> {
    client.get(format!("{base}{path}")).headers(headers.clone()).send().await
}

/// POST with a CSRF token taken from the dashboard, when it offers one.
async fn post(
    client: &reqwest::Client,
    base: &str,
    path: &str,
    mut headers: HeaderMap,
    body: Option<Value>,
) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    let page = get(client, base, "/", &headers).await?;
    if let Some(token) = page.headers().get("x-csrf-token").cloned() {
        headers.insert("x-csrf-token", token);
    }

    let mut req = client.post(format!("{base}{path}")).headers(headers);
    if let Some(body) = body {
        req = req.json(&body);
    }
    Ok(req.send().await?)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if status.is_redirection() {
        eprintln!("Error: not logged in (redirected to login); pass --user and --password");
        return Ok(());
    }
    if !status.is_success() {
        eprintln!("Error: device returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
