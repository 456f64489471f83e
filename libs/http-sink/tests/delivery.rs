use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;

use bridge_api::envelope::{CONTENT_TYPE_JSON, EVENT_TYPE};
use bridge_api::{Envelope, ErrorKind, EventData, SinkClient};
use http_sink::{HttpSink, HttpSinkConfig};

// ═══════════════════════════════════════════════════════════════
//  Test sink server
// ═══════════════════════════════════════════════════════════════

struct Received {
    headers: HeaderMap,
    body: Bytes,
}

struct Sink {
    status: StatusCode,
    delay: Duration,
    received: Mutex<Vec<Received>>,
}

async fn receive(State(sink): State<Arc<Sink>>, headers: HeaderMap, body: Bytes) -> (StatusCode, &'static str) {
    tokio::time::sleep(sink.delay).await;
    sink.received.lock().unwrap().push(Received { headers, body });
    (sink.status, "sink says no")
}

async fn serve(status: StatusCode, delay: Duration) -> (SocketAddr, Arc<Sink>) {
    let sink = Arc::new(Sink { status, delay, received: Mutex::new(Vec::new()) });
    let app = Router::new().route("/events", post(receive)).with_state(sink.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, sink)
}

fn client(addr: SocketAddr) -> HttpSink {
    HttpSink::new(&HttpSinkConfig::new(format!("http://{addr}/events"))).unwrap()
}

fn envelope(data: EventData) -> Envelope {
    Envelope {
        id: "partition:1/offset:7".into(),
        event_type: EVENT_TYPE.into(),
        source: "orders".into(),
        time: chrono::DateTime::from_timestamp_millis(1_700_000_000_000),
        content_type: CONTENT_TYPE_JSON.into(),
        extensions: BTreeMap::from([("key".to_string(), "order-7".to_string())]),
        data,
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn json_event_is_posted_in_binary_mode() {
    let (addr, sink) = serve(StatusCode::ACCEPTED, Duration::ZERO).await;
    let http = client(addr);

    let receipt = http
        .deliver(&envelope(EventData::Json(serde_json::json!({"id": 7, "total": 12.5}))))
        .await
        .unwrap();
    assert_eq!(receipt.status, 202);

    let received = sink.received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let req = &received[0];
    assert_eq!(req.headers["ce-specversion"], "1.0");
    assert_eq!(req.headers["ce-id"], "partition:1/offset:7");
    assert_eq!(req.headers["ce-type"], "dev.knative.kafka.event");
    assert_eq!(req.headers["ce-source"], "orders");
    assert_eq!(req.headers["ce-time"], "2023-11-14T22:13:20.000Z");
    assert_eq!(req.headers["ce-key"], "order-7");
    assert_eq!(req.headers["content-type"], "application/json");

    let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
    assert_eq!(body, serde_json::json!({"id": 7, "total": 12.5}));
}

#[tokio::test]
async fn raw_bytes_are_posted_verbatim() {
    let (addr, sink) = serve(StatusCode::OK, Duration::ZERO).await;

    client(addr).deliver(&envelope(EventData::Binary(b"not-json".to_vec()))).await.unwrap();

    let received = sink.received.lock().unwrap();
    assert_eq!(received[0].headers["content-type"], "application/octet-stream");
    assert_eq!(&received[0].body[..], b"not-json");
}

#[tokio::test]
async fn static_headers_are_sent() {
    let (addr, sink) = serve(StatusCode::OK, Duration::ZERO).await;
    let mut cfg = HttpSinkConfig::new(format!("http://{addr}/events"));
    cfg.headers.insert("x-tenant".into(), "acme".into());

    HttpSink::new(&cfg).unwrap().deliver(&envelope(EventData::Json(serde_json::json!({})))).await.unwrap();

    assert_eq!(sink.received.lock().unwrap()[0].headers["x-tenant"], "acme");
}

#[tokio::test]
async fn non_success_status_is_rejected() {
    let (addr, _sink) = serve(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await;

    let err = client(addr).deliver(&envelope(EventData::Json(serde_json::json!({})))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rejected);
    assert_eq!(err.status(), Some(500));
    assert!(err.message().contains("sink says no"), "{err}");
}

#[tokio::test]
async fn unreachable_sink_is_io_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(addr).deliver(&envelope(EventData::Json(serde_json::json!({})))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn slow_sink_hits_request_timeout() {
    let (addr, _sink) = serve(StatusCode::OK, Duration::from_secs(2)).await;
    let mut cfg = HttpSinkConfig::new(format!("http://{addr}/events"));
    cfg.timeout_ms = 100;

    let err = HttpSink::new(&cfg)
        .unwrap()
        .deliver(&envelope(EventData::Json(serde_json::json!({}))))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn invalid_uri_is_config_error() {
    let err: bridge_api::ClientError = HttpSink::new(&HttpSinkConfig::new("not a url")).unwrap_err().into();
    assert_eq!(err.kind(), ErrorKind::Config);
}
