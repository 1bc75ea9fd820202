//! Integration tests for dice.
//!
//! A configuration file is loaded, the topology bootstrapped, instances
//! probed, and real HTTP requests are sent through the proxy listener to
//! plain TCP upstream servers.

use dice::config::load_config;
use dice::frontend::ProxyListener;
use dice::health::HealthChecker;
use dice::AppState;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Read a request head, up to the blank line.
fn read_head(stream: &mut std::net::TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Start an HTTP server answering every request with `respond(head)`.
fn start_http_server<F>(respond: F) -> (SocketAddr, Arc<AtomicU32>)
where
    F: Fn(&str) -> String + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let addr = listener.local_addr().unwrap();
    let request_count = Arc::new(AtomicU32::new(0));
    let count = Arc::clone(&request_count);

    thread::spawn(move || {
        for mut stream in listener.incoming().flatten() {
            let head = read_head(&mut stream);
            // Health probes connect and close without sending anything.
            if head.is_empty() {
                continue;
            }
            count.fetch_add(1, Ordering::SeqCst);

            let body = respond(&head);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    (addr, request_count)
}

/// Echo the request line and the Host header.
fn echo(head: &str) -> String {
    let request_line = head.lines().next().unwrap_or("").to_string();
    let host = head
        .lines()
        .find_map(|l| l.strip_prefix("host: ").or_else(|| l.strip_prefix("Host: ")))
        .unwrap_or("")
        .to_string();
    format!("{}|{}", request_line, host)
}

fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// Load `yaml`, probe once, and start the proxy on an ephemeral port.
async fn start_proxy(yaml: &str) -> (SocketAddr, AppState) {
    let file = write_config(yaml);
    let config = load_config(file.path()).unwrap();
    let state = AppState::from_config(config).unwrap();

    HealthChecker::new(state.clone()).run_once().await;

    let listener = ProxyListener::bind("127.0.0.1:0".parse().unwrap(), state.clone())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run(state.shutdown().subscribe()));
    (addr, state)
}

/// Send one request and read the full response.
async fn get(proxy: SocketAddr, host: &str, path: &str) -> String {
    let mut client = TcpStream::connect(proxy).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, host
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    response
}

fn body(response: &str) -> &str {
    response.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("")
}

fn single_service(address: SocketAddr) -> String {
    format!(
        r#"
global:
  metrics:
    enabled: false
health_check:
  timeout: 1s
nodes:
  - url: http://node-a.test
    name: node-a
services:
  - name: api
    routes: ["api.example.com"]
instances:
  - service: api
    node: node-a
    address: "{}"
    name: api-0
"#,
        address
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_forwarded_with_host_and_path() {
    let (upstream, count) = start_http_server(echo);
    let (proxy, state) = start_proxy(&single_service(upstream)).await;

    let response = get(proxy, "api.example.com", "/users?id=7").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert_eq!(body(&response), "GET /users?id=7 HTTP/1.1|api.example.com");
    assert_eq!(count.load(Ordering::SeqCst), 1);

    state.trigger_shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_large_body_streamed_in_full() {
    let (upstream, _) = start_http_server(|_| "x".repeat(100_000));
    let (proxy, state) = start_proxy(&single_service(upstream)).await;

    let response = get(proxy, "api.example.com", "/big").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert_eq!(body(&response).len(), 100_000);
    assert!(body(&response).bytes().all(|b| b == b'x'));

    state.trigger_shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_host_gets_503() {
    let (upstream, count) = start_http_server(echo);
    let (proxy, state) = start_proxy(&single_service(upstream)).await;

    let response = get(proxy, "nobody.example.com", "/").await;
    assert!(response.starts_with("HTTP/1.1 503"));
    assert!(response.contains("text/html"));
    assert!(body(&response).contains("Error 503: Service Unavailable"));
    assert_eq!(count.load(Ordering::SeqCst), 0);

    state.trigger_shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_live_instance_gets_503() {
    let (proxy, state) = start_proxy(&single_service(closed_port())).await;

    let response = get(proxy, "api.example.com", "/").await;
    assert!(response.starts_with("HTTP/1.1 503"));
    assert!(body(&response).contains("no service instance found"));

    state.trigger_shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_weighted_distribution() {
    let (heavy, heavy_count) = start_http_server(echo);
    let (light, light_count) = start_http_server(echo);

    let yaml = format!(
        r#"
global:
  metrics:
    enabled: false
nodes:
  - url: http://node-a.test
    name: node-a
    weight: 3
  - url: http://node-b.test
    name: node-b
    weight: 1
services:
  - name: web
    routes: ["www.example.com"]
instances:
  - service: web
    node: node-a
    address: "{}"
  - service: web
    node: node-b
    address: "{}"
"#,
        heavy, light
    );
    let (proxy, state) = start_proxy(&yaml).await;

    for _ in 0..8 {
        let response = get(proxy, "www.example.com", "/").await;
        assert!(response.starts_with("HTTP/1.1 200"));
    }
    assert_eq!(heavy_count.load(Ordering::SeqCst), 6);
    assert_eq!(light_count.load(Ordering::SeqCst), 2);

    state.trigger_shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dead_instance_skipped() {
    let (live, live_count) = start_http_server(echo);

    let yaml = format!(
        r#"
global:
  metrics:
    enabled: false
health_check:
  timeout: 1s
nodes:
  - url: http://node-a.test
    name: node-a
  - url: http://node-b.test
    name: node-b
services:
  - name: web
    routes: ["www.example.com"]
instances:
  - service: web
    node: node-a
    address: "{}"
  - service: web
    node: node-b
    address: "{}"
"#,
        closed_port(),
        live
    );
    let (proxy, state) = start_proxy(&yaml).await;

    for _ in 0..4 {
        let response = get(proxy, "www.example.com", "/").await;
        assert!(response.starts_with("HTTP/1.1 200"));
    }
    assert_eq!(live_count.load(Ordering::SeqCst), 4);

    state.trigger_shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reload_switches_routes() {
    let (upstream, _) = start_http_server(echo);
    let (proxy, state) = start_proxy(&single_service(upstream)).await;

    let replaced = single_service(upstream).replace("api.example.com", "v2.example.com");
    let file = write_config(&replaced);
    state.reload(load_config(file.path()).unwrap()).unwrap();
    HealthChecker::new(state.clone()).run_once().await;

    let response = get(proxy, "api.example.com", "/").await;
    assert!(response.starts_with("HTTP/1.1 503"));

    let response = get(proxy, "v2.example.com", "/").await;
    assert!(response.starts_with("HTTP/1.1 200"));

    state.trigger_shutdown();
}

#[test]
fn test_invalid_topology_rejected_on_load() {
    let file = write_config(
        r#"
services:
  - name: api
instances:
  - service: api
    node: missing
    address: "127.0.0.1:8080"
"#,
    );
    assert!(load_config(file.path()).is_err());
}
