// Integration tests for `NetatmoClient` using wiremock.
#![allow(clippy::unwrap_used)]

use futures_util::TryStreamExt;
use futures_util::future::join_all;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use netatmo_api::{
    AuthState, ClientCredentials, Command, Device, Error, Grant, HomeId, NetatmoClient, RoomId,
};

const HOME_A: &str = "60478d1baf36ee032f3e0070";
const HOME_B: &str = "5f1d2c3b4a5968778695a4b3";

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, NetatmoClient) {
    let server = MockServer::start().await;
    let client =
        NetatmoClient::with_client(reqwest::Client::new(), Url::parse(&server.uri()).unwrap());
    (server, client)
}

fn password_grant() -> Grant {
    Grant::password(
        ClientCredentials::new("app-id", "app-secret".to_string()),
        "user@example.com",
        "hunter2".to_string(),
    )
    .with_scope("read_thermostat write_thermostat")
}

fn token_body(access: &str, refresh: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": expires_in,
        "scope": ["read_thermostat", "write_thermostat"]
    })
}

/// Mount the password-grant token endpoint and sign in.
async fn sign_in(server: &MockServer, client: &NetatmoClient, expires_in: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_body("access-1", "refresh-1", expires_in)),
        )
        .mount(server)
        .await;

    client.authenticate(&password_grant()).await.unwrap();
}

fn ok(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "body": body,
        "status": "ok",
        "time_exec": 0.03,
        "time_server": 1_650_000_000
    }))
}

fn token_expired() -> ResponseTemplate {
    ResponseTemplate::new(403).set_body_json(json!({
        "error": { "code": 3, "message": "Access token expired" }
    }))
}

fn homes_fixture() -> Value {
    json!({
        "homes": [
            {
                "id": HOME_A,
                "name": "Lab",
                "timezone": "Europe/Vienna",
                "rooms": [{ "id": "1914591590", "name": "Cabinet", "type": "custom" }],
                "modules": [
                    { "id": "00:03:50:aa:bb:cc", "type": "BNMH", "name": "Gateway" },
                    { "id": "00:03:50:b7:71:be", "type": "BNTH", "name": "Thermostat",
                      "room_id": "1914591590", "bridge": "00:03:50:aa:bb:cc" },
                    { "id": "00:03:50:00:00:09", "type": "BNCX", "name": "Offline switch" }
                ]
            },
            {
                "id": HOME_B,
                "name": "Cabin",
                "timezone": "Europe/Paris",
                "modules": [
                    { "id": "70:ee:50:00:00:01", "type": "NAPlug", "name": "Relay" }
                ]
            }
        ]
    })
}

fn thermostat_status() -> Value {
    json!({
        "id": "00:03:50:b7:71:be",
        "type": "BNTH",
        "reachable": true,
        "boiler_status": false,
        "wifi_strength": 61,
        "firmware_revision": 77,
        "bridge": "00:03:50:aa:bb:cc"
    })
}

async fn mount_homes(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/homesdata"))
        .respond_with(ok(homes_fixture()))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/homestatus"))
        .and(body_partial_json(json!({ "home_id": HOME_A })))
        .respond_with(ok(json!({
            "home": {
                "id": HOME_A,
                "rooms": [{ "id": "1914591590", "therm_measured_temperature": 19.5 }],
                "modules": [
                    { "id": "00:03:50:aa:bb:cc", "type": "BNMH", "reachable": true },
                    thermostat_status()
                ]
            }
        })))
        .mount(server)
        .await;

    // The relay is also (wrongly) reported under the first home's gateway id.
    Mock::given(method("POST"))
        .and(path("/api/homestatus"))
        .and(body_partial_json(json!({ "home_id": HOME_B })))
        .respond_with(ok(json!({
            "home": {
                "id": HOME_B,
                "modules": [
                    { "id": "70:ee:50:00:00:01", "type": "NAPlug", "reachable": false },
                    { "id": "00:03:50:aa:bb:cc", "type": "BNMH", "reachable": true }
                ]
            }
        })))
        .mount(server)
        .await;
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn test_authenticate_sends_password_grant() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("client_id=app-id"))
        .and(body_string_contains("username=user%40example.com"))
        .and(body_string_contains("scope=read_thermostat+write_thermostat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("a", "r", 10_800)))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client.auth_state(), AuthState::Unauthenticated);
    client.authenticate(&password_grant()).await.unwrap();
    assert!(client.auth_state().is_authenticated());

    client.sign_out();
    assert_eq!(client.auth_state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_authenticate_invalid_grant() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
        .mount(&server)
        .await;

    let err = client.authenticate(&password_grant()).await.unwrap_err();
    match err {
        Error::Authentication { message } => assert_eq!(message, "invalid_grant"),
        other => panic!("expected Authentication, got {other:?}"),
    }
    assert_eq!(client.auth_state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_authenticate_garbage_token_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client.authenticate(&password_grant()).await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse { .. }));
}

#[tokio::test]
async fn test_authenticate_absurd_lifetime_is_malformed() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("a", "r", u64::MAX)))
        .mount(&server)
        .await;

    let err = client.authenticate(&password_grant()).await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse { .. }));
    assert_eq!(client.auth_state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_calls_without_session_fail() {
    let (_server, client) = setup().await;

    let err = client.homes_data().await.unwrap_err();
    assert!(err.is_auth_expired());
}

// ── Token refresh ───────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_expired_callers_refresh_once() {
    let (server, client) = setup().await;
    // 30 s lifetime is inside the refresh margin: stale right away.
    sign_in(&server, &client, 30).await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("access-2", "refresh-2", 10_800))
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/homestatus"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ok(json!({ "home": { "id": HOME_A } })))
        .expect(8)
        .mount(&server)
        .await;

    let home: HomeId = HOME_A.parse().unwrap();
    let calls = (0..8).map(|_| {
        let client = client.clone();
        async move { client.home_status(&home).await }
    });
    for result in join_all(calls).await {
        assert_eq!(result.unwrap().id, home);
    }

    server.verify().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rejected_callers_refresh_once() {
    let (server, client) = setup().await;
    // Long-lived token: nobody refreshes up front, the vendor rejects it.
    sign_in(&server, &client, 10_800).await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("access-2", "refresh-2", 10_800))
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/homestatus"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(token_expired())
        .expect(8)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/homestatus"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ok(json!({ "home": { "id": HOME_A } })))
        .expect(8)
        .mount(&server)
        .await;

    let home: HomeId = HOME_A.parse().unwrap();
    let calls = (0..8).map(|_| {
        let client = client.clone();
        async move { client.home_status(&home).await }
    });
    for result in join_all(calls).await {
        assert_eq!(result.unwrap().id, home);
    }

    server.verify().await;
}

#[tokio::test]
async fn test_rejected_token_is_refreshed_and_retried() {
    let (server, client) = setup().await;
    sign_in(&server, &client, 10_800).await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-2", "refresh-2", 10_800)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/homesdata"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/homesdata"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ok(homes_fixture()))
        .expect(1)
        .mount(&server)
        .await;

    let homes = client.homes_data().await.unwrap();
    assert_eq!(homes.homes.len(), 2);

    server.verify().await;
}

#[tokio::test]
async fn test_revoked_grant_clears_session_without_looping() {
    let (server, client) = setup().await;
    sign_in(&server, &client, 10_800).await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "refresh token revoked"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/homesdata"))
        .respond_with(token_expired())
        .expect(1)
        .mount(&server)
        .await;

    let err = client.homes_data().await.unwrap_err();
    match &err {
        Error::Authentication { message } => {
            assert_eq!(message, "invalid_grant: refresh token revoked");
        }
        other => panic!("expected Authentication, got {other:?}"),
    }
    assert_eq!(client.auth_state(), AuthState::Unauthenticated);

    // Session is gone: the next call fails locally, no further refresh.
    assert!(client.homes_data().await.unwrap_err().is_auth_expired());

    server.verify().await;
}

#[tokio::test]
async fn test_second_expiry_after_refresh_is_authentication_error() {
    let (server, client) = setup().await;
    sign_in(&server, &client, 10_800).await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-2", "refresh-2", 10_800)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/homesdata"))
        .respond_with(token_expired())
        .expect(2)
        .mount(&server)
        .await;

    let err = client.homes_data().await.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }));

    server.verify().await;
}

// ── Devices ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices_yields_distinct_ids() {
    let (server, client) = setup().await;
    sign_in(&server, &client, 10_800).await;
    mount_homes(&server).await;

    let devices: Vec<Device> = client.list_devices().try_collect().await.unwrap();

    let ids: Vec<&str> = devices.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(
        ids,
        [
            "00:03:50:aa:bb:cc",
            "00:03:50:b7:71:be",
            "00:03:50:00:00:09",
            "70:ee:50:00:00:01",
        ]
    );

    let offline = &devices[2];
    assert_eq!(offline.name.as_deref(), Some("Offline switch"));
    assert!(offline.capabilities.is_empty());

    let relay = &devices[3];
    assert_eq!(relay.home_id, HOME_B.parse::<HomeId>().unwrap());
    assert!(!relay.is_reachable());
}

#[tokio::test]
async fn test_device_preserves_every_capability() {
    let (server, client) = setup().await;
    sign_in(&server, &client, 10_800).await;
    mount_homes(&server).await;

    let devices: Vec<Device> = client.list_devices().try_collect().await.unwrap();
    let thermostat = devices
        .iter()
        .find(|d| d.id.as_str() == "00:03:50:b7:71:be")
        .unwrap();

    let Value::Object(mut expected) = thermostat_status() else {
        unreachable!()
    };
    expected.remove("id");
    expected.remove("type");

    assert_eq!(thermostat.capabilities.len(), expected.len());
    for (key, value) in &expected {
        assert_eq!(thermostat.capability(key), Some(value), "capability {key}");
    }
    let keys: Vec<&str> = thermostat.capabilities.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        ["reachable", "boiler_status", "wifi_strength", "firmware_revision", "bridge"]
    );
    assert_eq!(thermostat.room_id, Some(RoomId::new(1_914_591_590)));
    assert_eq!(thermostat.name.as_deref(), Some("Thermostat"));
}

#[tokio::test]
async fn test_list_devices_is_lazy() {
    let (server, client) = setup().await;
    sign_in(&server, &client, 10_800).await;

    Mock::given(method("POST"))
        .and(path("/api/homesdata"))
        .respond_with(ok(homes_fixture()))
        .expect(0)
        .mount(&server)
        .await;

    let stream = client.list_devices();
    drop(stream);

    server.verify().await;
}

#[tokio::test]
async fn test_offline_home_has_empty_status() {
    let (server, client) = setup().await;
    sign_in(&server, &client, 10_800).await;

    Mock::given(method("POST"))
        .and(path("/api/homestatus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "time_server": 1_650_000_000
        })))
        .mount(&server)
        .await;

    let home: HomeId = HOME_A.parse().unwrap();
    let status = client.home_status(&home).await.unwrap();
    assert_eq!(status.id, home);
    assert!(status.modules.is_empty());
    assert!(status.rooms.is_empty());
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_command_posts_setstate() {
    let (server, client) = setup().await;
    sign_in(&server, &client, 10_800).await;

    Mock::given(method("POST"))
        .and(path("/api/setstate"))
        .and(header("authorization", "Bearer access-1"))
        .and(body_partial_json(json!({
            "home": {
                "id": HOME_A,
                "rooms": [{ "id": "1914591590", "therm_setpoint_mode": "home" }]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "time_server": 1_650_000_000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cmd = Command::room(HOME_A.parse().unwrap(), RoomId::new(1_914_591_590))
        .set("therm_setpoint_mode", "home");
    let ack = client.send_command(cmd).await.unwrap();
    assert_eq!(ack.server_time.map(|t| t.timestamp()), Some(1_650_000_000));

    server.verify().await;
}

#[tokio::test]
async fn test_invalid_capability_value_is_rejected() {
    let (server, client) = setup().await;
    sign_in(&server, &client, 10_800).await;

    Mock::given(method("POST"))
        .and(path("/api/setstate"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 21, "message": "Invalid argument" }
        })))
        .mount(&server)
        .await;

    let cmd = Command::module(HOME_A.parse().unwrap(), "00:03:50:b7:71:be".parse().unwrap())
        .set("on", "definitely");
    match client.send_command(cmd).await.unwrap_err() {
        Error::RejectedCommand { code, message } => {
            assert_eq!(code, Some(21));
            assert_eq!(message, "Invalid argument");
        }
        other => panic!("expected RejectedCommand, got {other:?}"),
    }
}

#[tokio::test]
async fn test_per_target_errors_in_ok_answer_are_rejected() {
    let (server, client) = setup().await;
    sign_in(&server, &client, 10_800).await;

    Mock::given(method("POST"))
        .and(path("/api/setstate"))
        .respond_with(ok(json!({
            "errors": [{ "code": 6, "id": "00:03:50:b7:71:be" }]
        })))
        .mount(&server)
        .await;

    let cmd = Command::module(HOME_A.parse().unwrap(), "00:03:50:b7:71:be".parse().unwrap())
        .set("on", true);
    let err = client.send_command(cmd).await.unwrap_err();
    assert!(matches!(err, Error::RejectedCommand { code: Some(6), .. }));
}

#[tokio::test]
async fn test_locally_invalid_command_never_hits_the_wire() {
    let (server, client) = setup().await;
    sign_in(&server, &client, 10_800).await;

    Mock::given(method("POST"))
        .and(path("/api/setstate"))
        .respond_with(ok(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let cmd = Command::module(HOME_A.parse().unwrap(), "00:03:50:b7:71:be".parse().unwrap())
        .set("on", Value::Null);
    let err = client.send_command(cmd).await.unwrap_err();
    assert!(matches!(err, Error::RejectedCommand { code: None, .. }));

    server.verify().await;
}
