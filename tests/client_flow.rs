//! Browser-style flows through an HTTP client.

use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde_json::Value;

mod common;
use common::DeviceOptions;

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_login_toggle_and_stats() {
    let device = common::start_device(DeviceOptions {
        enable_auth: true,
        ..DeviceOptions::default()
    })
    .await;
    common::settle_boot_guard().await;
    let client = client();

    let res = client
        .post(device.url("/login"))
        .form(&[("username", common::USER), ("password", common::PASSWORD)])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    let cookie = res
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string();

    let page = client
        .get(device.url("/"))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    let token = page.headers()["x-csrf-token"].to_str().unwrap().to_string();

    let res = client
        .post(device.url("/api/relay/toggle"))
        .header(COOKIE, &cookie)
        .header("X-CSRF-Token", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["new_state"], true);

    let status: Value = client
        .get(device.url("/api/status"))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["relay"]["state"], true);
    assert_eq!(status["relay"]["safety_timer_active"], true);
    assert!(status["system"]["request_count"].as_u64().unwrap() >= 4);

    let res = client
        .post(device.url("/api/relay/emergency_stop"))
        .header(COOKIE, &cookie)
        .header("X-CSRF-Token", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let stats: Value = client
        .get(device.url("/api/stats"))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_cycles"], 1);
    assert_eq!(stats["power_on_count"], 1);
    assert!(stats["average_session_duration"].as_f64().unwrap() >= 0.0);

    device.stop().await;
}

#[tokio::test]
async fn test_system_info_and_preflight() {
    let device = common::start_device(DeviceOptions::default()).await;
    let client = client();

    let info: Value = client
        .get(device.url("/api/system/info"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["device_name"], "Pico-W-Relay");
    assert_eq!(info["relay_pin"], 18);
    assert!(info["firmware"].as_str().unwrap().starts_with("relay-gate"));

    let res = client
        .request(reqwest::Method::OPTIONS, device.url("/api/relay/set"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(res.headers()["access-control-allow-headers"]
        .to_str()
        .unwrap()
        .contains("X-CSRF-Token"));

    device.stop().await;
}
