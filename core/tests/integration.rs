//! Real HTTP exchanges against the mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives `HttpClient` over
//! real HTTP through the default `ureq` transport. Validates encoding on the
//! wire, status handling, timeouts and cancellation end-to-end.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use courier_core::{
    ClientConfig, Headers, HttpClient, HttpMethod, Outcome, Params, RequestError, RequestSpec,
    SerializerType, UreqTransport,
};
use mock_server::{Echo, BINARY_BODY};
use serde_json::json;

fn spawn_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    addr
}

fn client_for(addr: SocketAddr) -> HttpClient {
    HttpClient::new(ClientConfig::default().with_base_url(format!("http://{addr}/"))).unwrap()
}

fn params(value: serde_json::Value) -> Params {
    value.as_object().cloned().unwrap()
}

fn run(client: &HttpClient, spec: RequestSpec) -> Outcome {
    let (handle, completion) = client.request_pending(spec);
    handle.start();
    completion.wait_blocking()
}

fn echo(client: &HttpClient, spec: RequestSpec) -> Echo {
    run(client, spec).unwrap().json().unwrap()
}

#[test]
fn get_sends_params_in_query_string() {
    let client = client_for(spawn_server());
    let echo = echo(
        &client,
        RequestSpec::new("echo", HttpMethod::Get).params(params(json!({"q": "cats"}))),
    );
    assert_eq!(echo.method, "GET");
    assert_eq!(echo.query.as_deref(), Some("q=cats"));
    assert!(echo.body.is_empty());
}

#[test]
fn delete_sends_params_in_query_string_even_with_json_serializer() {
    let client = client_for(spawn_server());
    let echo = echo(
        &client,
        RequestSpec::new("echo/items", HttpMethod::Delete)
            .params(params(json!({"id": 7})))
            .serializer(SerializerType::Json),
    );
    assert_eq!(echo.method, "DELETE");
    assert_eq!(echo.path, "/echo/items");
    assert_eq!(echo.query.as_deref(), Some("id=7"));
    assert!(echo.body.is_empty());
}

#[test]
fn post_form_encodes_body_by_default() {
    let client = client_for(spawn_server());
    let echo = echo(
        &client,
        RequestSpec::new("echo", HttpMethod::Post).params(params(json!({"name": "a"}))),
    );
    assert_eq!(echo.method, "POST");
    assert_eq!(echo.body, "name=a");
    assert_eq!(
        echo.content_type.as_deref(),
        Some("application/x-www-form-urlencoded")
    );
    assert!(echo.query.is_none());
}

#[test]
fn post_json_serializer_sends_json_object() {
    let client = client_for(spawn_server());
    let echo = echo(
        &client,
        RequestSpec::new("echo", HttpMethod::Post)
            .params(params(json!({"name": "a"})))
            .serializer(SerializerType::Json),
    );
    assert_eq!(echo.body, r#"{"name":"a"}"#);
    assert_eq!(echo.content_type.as_deref(), Some("application/json"));
}

#[test]
fn put_and_patch_carry_bodies() {
    let client = client_for(spawn_server());
    for method in [HttpMethod::Put, HttpMethod::Patch] {
        let echo = echo(
            &client,
            RequestSpec::new("echo/users/1", method).params(params(json!({"name": "b"}))),
        );
        assert_eq!(echo.method, method.as_str());
        assert_eq!(echo.body, "name=b");
    }
}

#[test]
fn caller_headers_override_defaults() {
    let client = client_for(spawn_server());
    let mut headers = Headers::new();
    headers.insert("accept".to_string(), "text/plain".to_string());
    headers.insert("X-Trace".to_string(), "abc".to_string());

    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = client.request_with_headers("echo", Some(headers), None, HttpMethod::Get, move |_, outcome| {
        tx.send(outcome).unwrap();
    });
    handle.start();
    let echo: Echo = rx
        .recv_timeout(Duration::from_secs(10))
        .unwrap()
        .unwrap()
        .json()
        .unwrap();

    assert_eq!(echo.headers.get("accept").map(String::as_str), Some("text/plain"));
    assert_eq!(echo.headers.get("x-trace").map(String::as_str), Some("abc"));
    assert!(echo
        .headers
        .get("user-agent")
        .is_some_and(|ua| ua.starts_with("courier/")));
}

#[test]
fn non_success_status_is_a_server_error() {
    let client = client_for(spawn_server());
    let err = run(&client, RequestSpec::new("status/404", HttpMethod::Get)).unwrap_err();
    assert_eq!(
        err,
        RequestError::Server {
            status: 404,
            body: b"status 404".to_vec(),
        }
    );
}

#[test]
fn slow_response_times_out() {
    let client = client_for(spawn_server());
    client.set_timeout(Duration::from_millis(200));
    let err = run(&client, RequestSpec::new("delay/3000", HttpMethod::Get)).unwrap_err();
    assert_eq!(err, RequestError::Timeout);
}

#[test]
fn refused_connection_is_a_transport_error() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let client = client_for(addr);
    let err = run(&client, RequestSpec::new("echo", HttpMethod::Get)).unwrap_err();
    assert!(matches!(err, RequestError::Transport(_)), "got {err:?}");
}

#[test]
fn cancel_in_flight_delivers_cancelled_once() {
    let client = client_for(spawn_server());
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = crossbeam_channel::unbounded();

    let counter = Arc::clone(&calls);
    let handle = client.request("delay/500", None, HttpMethod::Get, move |_, outcome| {
        counter.fetch_add(1, Ordering::SeqCst);
        tx.send(outcome).unwrap();
    });
    handle.start();
    thread::sleep(Duration::from_millis(100));
    assert!(handle.running());
    handle.cancel();

    let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(outcome, Err(RequestError::Cancelled));
    assert!(handle.is_cancelled());
    assert!(!handle.finished());

    // Outlive the server's delay; the late response must be dropped.
    thread::sleep(Duration::from_millis(800));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(rx.try_recv().is_err());
}

#[test]
fn absolute_url_ignores_base() {
    let addr = spawn_server();
    let client = HttpClient::new(ClientConfig::default().with_base_url("http://unused.invalid/")).unwrap();
    let echo = echo(
        &client,
        RequestSpec::new(format!("http://{addr}/echo"), HttpMethod::Get),
    );
    assert_eq!(echo.path, "/echo");
}

#[test]
fn binary_body_is_delivered_as_bytes() {
    let client = client_for(spawn_server());
    let response = run(&client, RequestSpec::new("bytes", HttpMethod::Get)).unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, BINARY_BODY);
    assert_eq!(response.header("content-type"), Some("application/octet-stream"));
    assert!(matches!(response.text(), Err(RequestError::Decode(_))));
}

#[test]
fn body_over_the_transport_limit_is_rejected() {
    let addr = spawn_server();
    let client = HttpClient::with_transport(
        ClientConfig::default().with_base_url(format!("http://{addr}/")),
        Arc::new(UreqTransport::with_body_limit(4)),
    )
    .unwrap();
    let err = run(&client, RequestSpec::new("bytes", HttpMethod::Get)).unwrap_err();
    assert_eq!(err, RequestError::BodyTooLarge { limit: 4 });
}
