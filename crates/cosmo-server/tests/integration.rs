//! End-to-end tests against real listeners on ephemeral ports.

use std::net::SocketAddr;
use std::time::Duration;

use cosmo_core::Planet;
use cosmo_server::metrics::detached_handle;
use cosmo_server::ServerHandle;
use cosmo_settings::RelaySettings;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn boot(transport: &MockServer, notify_on_relay_failure: bool) -> ServerHandle {
    let settings = RelaySettings {
        host: "127.0.0.1".into(),
        earth_port: 0,
        mars_port: 0,
        http_port: 0,
        transport_layer_url: format!("{}/send", transport.uri()),
        transport_timeout_ms: 2_000,
        notify_on_relay_failure,
        ..RelaySettings::default()
    };
    cosmo_server::start(&settings, detached_handle()).await.unwrap()
}

async fn connect(handle: &ServerHandle, planet: Planet) -> WsStream {
    let addr: SocketAddr = match planet {
        Planet::Earth => handle.earth_addr,
        Planet::Mars => handle.mars_addr,
    };
    let registry = handle.registry(planet);
    let before = registry.len();
    let (ws, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    wait_for_clients(handle, planet, before + 1).await;
    ws
}

async fn wait_for_clients(handle: &ServerHandle, planet: Planet, expected: usize) {
    let registry = handle.registry(planet);
    timeout(TIMEOUT, async {
        while registry.len() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{planet} never reached {expected} clients"));
}

async fn send_text(ws: &mut WsStream, text: &str) {
    ws.send(Message::Text(text.into())).await.unwrap();
}

async fn next_text(ws: &mut WsStream) -> String {
    timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.to_string(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    })
    .await
    .unwrap()
}

async fn assert_silent(ws: &mut WsStream) {
    assert!(
        timeout(QUIET, ws.next()).await.is_err(),
        "client received an unexpected frame"
    );
}

const EARTH_HELLO: &str =
    r#"{"event":"connection","username":"Alice","planet":"Earth","id":1700000000000}"#;
const MARS_HELLO: &str =
    r#"{"event":"connection","username":"Marvin","planet":"Mars","id":1700000000500}"#;
const EARTH_CHAT: &str =
    r#"{"event":"message","username":"Alice","message":"hi","id":1700000001000}"#;

#[tokio::test]
async fn earth_presence_is_echoed_to_earth_only() {
    let transport = MockServer::start().await;
    let handle = boot(&transport, false).await;
    let mut alice = connect(&handle, Planet::Earth).await;
    let mut bob = connect(&handle, Planet::Earth).await;
    let mut marvin = connect(&handle, Planet::Mars).await;

    send_text(&mut alice, EARTH_HELLO).await;

    assert_eq!(next_text(&mut alice).await, EARTH_HELLO);
    assert_eq!(next_text(&mut bob).await, EARTH_HELLO);
    assert_silent(&mut marvin).await;
    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn mars_presence_reaches_both_nodes() {
    let transport = MockServer::start().await;
    let handle = boot(&transport, false).await;
    let mut alice = connect(&handle, Planet::Earth).await;
    let mut marvin = connect(&handle, Planet::Mars).await;

    send_text(&mut marvin, MARS_HELLO).await;

    assert_eq!(next_text(&mut marvin).await, MARS_HELLO);
    assert_eq!(next_text(&mut alice).await, MARS_HELLO);
    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn earth_message_goes_to_transport_layer_only() {
    let transport = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(body_json(json!({
            "username": "Alice",
            "sendTime": "2023-11-14T22:13:21.000Z",
            "message": "hi"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&transport)
        .await;

    let handle = boot(&transport, false).await;
    let mut alice = connect(&handle, Planet::Earth).await;
    let mut marvin = connect(&handle, Planet::Mars).await;

    send_text(&mut alice, EARTH_CHAT).await;

    timeout(TIMEOUT, async {
        loop {
            let received = transport.received_requests().await.unwrap_or_default();
            if !received.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_silent(&mut alice).await;
    assert_silent(&mut marvin).await;
    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn mars_message_is_not_forwarded() {
    let transport = MockServer::start().await;
    let handle = boot(&transport, false).await;
    let mut alice = connect(&handle, Planet::Earth).await;
    let mut marvin = connect(&handle, Planet::Mars).await;

    send_text(
        &mut marvin,
        r#"{"event":"message","username":"Marvin","message":"hello","id":1700000002000}"#,
    )
    .await;

    assert_silent(&mut alice).await;
    assert_silent(&mut marvin).await;
    assert!(transport
        .received_requests()
        .await
        .unwrap_or_default()
        .is_empty());
    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn receive_delivers_to_both_nodes() {
    let transport = MockServer::start().await;
    let handle = boot(&transport, false).await;
    let mut alice = connect(&handle, Planet::Earth).await;
    let mut marvin = connect(&handle, Planet::Mars).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/receive", handle.http_addr))
        .json(&json!({
            "username": "Alice",
            "sendTime": "2023-11-14T22:13:21.000Z",
            "message": "hi"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(
        body["message"],
        "Message received and broadcasted to Mars and Earth"
    );

    let expected = json!({
        "event": "message",
        "username": "Alice",
        "message": "hi",
        "id": 1_700_000_001_000_i64,
        "planet": "Earth"
    });
    let earth: Value = serde_json::from_str(&next_text(&mut alice).await).unwrap();
    let mars: Value = serde_json::from_str(&next_text(&mut marvin).await).unwrap();
    assert_eq!(earth, expected);
    assert_eq!(mars, expected);
    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn receive_rejects_incomplete_body() {
    let transport = MockServer::start().await;
    let handle = boot(&transport, false).await;
    let mut alice = connect(&handle, Planet::Earth).await;
    let mut marvin = connect(&handle, Planet::Mars).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/receive", handle.http_addr))
        .json(&json!({ "username": "Alice", "message": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "status": "error", "message": "Invalid message format" }));

    assert_silent(&mut alice).await;
    assert_silent(&mut marvin).await;
    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let transport = MockServer::start().await;
    let handle = boot(&transport, false).await;
    let mut alice = connect(&handle, Planet::Earth).await;

    send_text(&mut alice, "{this is not json").await;
    send_text(&mut alice, EARTH_HELLO).await;

    assert_eq!(next_text(&mut alice).await, EARTH_HELLO);
    assert_eq!(handle.registry(Planet::Earth).len(), 1);
    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn frames_arrive_in_send_order() {
    let transport = MockServer::start().await;
    let handle = boot(&transport, false).await;
    let mut alice = connect(&handle, Planet::Earth).await;
    let mut bob = connect(&handle, Planet::Earth).await;

    let frames: Vec<String> = (0..5)
        .map(|i| {
            json!({
                "event": "connection",
                "username": format!("user{i}"),
                "planet": "Earth",
                "id": 1_700_000_000_000_i64 + i
            })
            .to_string()
        })
        .collect();
    for frame in &frames {
        send_text(&mut alice, frame).await;
    }
    for frame in &frames {
        assert_eq!(&next_text(&mut bob).await, frame);
    }
    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn closed_client_leaves_registry() {
    let transport = MockServer::start().await;
    let handle = boot(&transport, false).await;
    let mut alice = connect(&handle, Planet::Earth).await;
    let mut bob = connect(&handle, Planet::Earth).await;

    alice.close(None).await.unwrap();
    wait_for_clients(&handle, Planet::Earth, 1).await;

    send_text(&mut bob, EARTH_HELLO).await;
    assert_eq!(next_text(&mut bob).await, EARTH_HELLO);
    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn transport_failure_is_reported_to_earth_when_enabled() {
    let transport = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&transport)
        .await;

    let handle = boot(&transport, true).await;
    let mut alice = connect(&handle, Planet::Earth).await;
    let mut marvin = connect(&handle, Planet::Mars).await;

    send_text(&mut alice, EARTH_CHAT).await;

    let frame: Value = serde_json::from_str(&next_text(&mut alice).await).unwrap();
    assert_eq!(frame["event"], "message");
    assert_eq!(frame["username"], "Alice");
    assert_eq!(frame["id"], 1_700_000_001_000_i64);
    assert!(frame["error"].is_string());
    assert_silent(&mut marvin).await;
    handle.shutdown(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn shutdown_closes_client_sockets() {
    let transport = MockServer::start().await;
    let handle = boot(&transport, false).await;
    let mut alice = connect(&handle, Planet::Earth).await;

    handle.shutdown(Some(TIMEOUT)).await;

    let ended = timeout(TIMEOUT, async {
        loop {
            match alice.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok());
}
