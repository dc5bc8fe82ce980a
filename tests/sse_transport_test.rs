//! SSE upstream transport integration tests
//!
//! Tests the `SseTransport` long-poll against a `wiremock` mock server.
//!
//! # wiremock body helpers
//!
//! Use `set_body_raw(bytes, mime)` for SSE responses so that the
//! `Content-Type` is `text/event-stream` exactly; `set_body_string`
//! forces `text/plain`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use one_mcp::mcp::transport::sse::SseTransport;
use one_mcp::mcp::transport::Transport;

fn sse_body(endpoint: &str, messages: &[&str]) -> Vec<u8> {
    let mut body = format!("event: endpoint\ndata: {endpoint}\n\n");
    for message in messages {
        body.push_str(&format!("data: {message}\n\n"));
    }
    body.into_bytes()
}

struct RunningTransport {
    transport: std::sync::Arc<SseTransport>,
    inbound_rx: mpsc::UnboundedReceiver<String>,
    ready_rx: mpsc::UnboundedReceiver<()>,
    run: tokio::task::JoinHandle<one_mcp::Result<()>>,
    _cancel: CancellationToken,
}

/// Start a transport run against `url`.
fn start_transport(url: &str, token: Option<String>) -> RunningTransport {
    let transport = std::sync::Arc::new(SseTransport::new(
        url::Url::parse(url).expect("valid url"),
        token,
    ));
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let t = std::sync::Arc::clone(&transport);
    let c = cancel.clone();
    let run = tokio::spawn(async move { t.run(c, inbound_tx, ready_tx).await });

    RunningTransport {
        transport,
        inbound_rx,
        ready_rx,
        run,
        _cancel: cancel,
    }
}

/// The `endpoint` event fires readiness and `data:` payloads arrive as
/// inbound messages; the server closing the stream is a clean exit.
#[tokio::test]
async fn test_endpoint_event_then_data_delivery() {
    let server = MockServer::start().await;

    let body = sse_body(
        "/messages?session=1",
        &[r#"{"jsonrpc":"2.0","id":1,"result":{}}"#],
    );
    Mock::given(method("GET"))
        .and(path("/sse"))
        .and(header("Accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let mut running = start_transport(&format!("{}/sse", server.uri()), None);

    tokio::time::timeout(Duration::from_secs(5), running.ready_rx.recv())
        .await
        .expect("ready must fire")
        .expect("channel open");

    let message = tokio::time::timeout(Duration::from_secs(5), running.inbound_rx.recv())
        .await
        .expect("timed out waiting for data event")
        .expect("channel open");
    assert_eq!(message, r#"{"jsonrpc":"2.0","id":1,"result":{}}"#);

    let outcome = tokio::time::timeout(Duration::from_secs(5), running.run)
        .await
        .expect("run must end with the stream")
        .expect("task must not panic");
    assert!(outcome.is_ok(), "server close is a clean exit: {outcome:?}");
}

/// `send` POSTs JSON to the endpoint resolved from the `endpoint` event.
#[tokio::test]
async fn test_send_posts_to_resolved_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body("/rpc-inbox", &[]),
            "text/event-stream",
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rpc-inbox"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let mut running = start_transport(&format!("{}/sse", server.uri()), None);
    tokio::time::timeout(Duration::from_secs(5), running.ready_rx.recv())
        .await
        .expect("ready must fire")
        .expect("channel open");

    running
        .transport
        .send(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#.to_string())
        .await
        .expect("send must succeed");

    // The expect(1) on the POST mock verifies on drop.
    let requests = server.received_requests().await.expect("recording enabled");
    let post = requests
        .iter()
        .find(|r| r.method.to_string() == "POST")
        .expect("POST must have been issued");
    assert_eq!(
        String::from_utf8_lossy(&post.body),
        r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#
    );
}

/// The configured bearer token rides on the GET and on every POST.
#[tokio::test]
async fn test_auth_token_applied_to_get_and_post() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sse"))
        .and(header("Authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body("/inbox", &[]),
            "text/event-stream",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/inbox"))
        .and(header("Authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut running = start_transport(
        &format!("{}/sse", server.uri()),
        Some("secret-token".to_string()),
    );
    tokio::time::timeout(Duration::from_secs(5), running.ready_rx.recv())
        .await
        .expect("ready must fire")
        .expect("channel open");

    running
        .transport
        .send("{}".to_string())
        .await
        .expect("authorized send must succeed");
}

/// A POST answered with HTTP >= 400 fails that send only.
#[tokio::test]
async fn test_post_error_status_fails_send() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body("/inbox", &[]),
            "text/event-stream",
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/inbox"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut running = start_transport(&format!("{}/sse", server.uri()), None);
    tokio::time::timeout(Duration::from_secs(5), running.ready_rx.recv())
        .await
        .expect("ready must fire")
        .expect("channel open");

    let err = running
        .transport
        .send("{}".to_string())
        .await
        .expect_err("HTTP 500 must fail the send")
        .to_string();
    assert!(err.contains("500"), "got: {err}");
}

/// A non-success status on the GET itself is a transport error.
#[tokio::test]
async fn test_get_error_status_is_run_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sse"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let running = start_transport(&format!("{}/sse", server.uri()), None);
    let outcome = tokio::time::timeout(Duration::from_secs(5), running.run)
        .await
        .expect("run must end")
        .expect("task must not panic");
    assert!(outcome.is_err(), "HTTP 401 on the GET must be an error");
}

/// Multiple data events on one stream all arrive, in order.
#[tokio::test]
async fn test_multiple_data_events_in_order() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body("/inbox", &["first", "second", "third"]),
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let mut running = start_transport(&format!("{}/sse", server.uri()), None);

    for expected in ["first", "second", "third"] {
        let message = tokio::time::timeout(Duration::from_secs(5), running.inbound_rx.recv())
            .await
            .expect("timed out")
            .expect("channel open");
        assert_eq!(message, expected);
    }
}
