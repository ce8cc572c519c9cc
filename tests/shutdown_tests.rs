//! Graceful-shutdown behavior over real connections.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rmpv::Value;
use tokio::net::TcpStream;

use mux_rpc::{
    map_get, map_value, Registry, RpcClient, Server, ServerConfig, HEALTH_PATTERN,
    SHUTDOWN_TIMEOUT_MS,
};

async fn spawn_server(registry: Registry) -> (Arc<Server>, String) {
    let server = Server::bind(ServerConfig::new("127.0.0.1:0", registry))
        .await
        .unwrap();
    let addr = server.local_addr().to_string();
    (Arc::new(server), addr)
}

fn slow_registry(delay_ms: u64) -> Registry {
    let mut registry = Registry::new();
    registry.register_request("slow", move |_| async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        Ok(Some(Value::from("done")))
    });
    registry
}

#[tokio::test]
async fn in_flight_request_completes_during_drain() {
    let (server, addr) = spawn_server(slow_registry(600)).await;

    // Several idle connections plus one with a long-running request.
    let mut idle_a = RpcClient::connect(&addr).await.unwrap();
    let mut idle_b = RpcClient::connect(&addr).await.unwrap();
    idle_a.call(HEALTH_PATTERN, map_value([])).await.unwrap();
    idle_b.call(HEALTH_PATTERN, map_value([])).await.unwrap();

    let busy_addr = addr.clone();
    let busy = tokio::spawn(async move {
        let mut client = RpcClient::connect(&busy_addr).await.unwrap();
        client.call("slow", map_value([])).await
    });

    // Let the slow request reach its handler before shutting down.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    server.shutdown().await;
    assert!(
        started.elapsed() < Duration::from_millis(SHUTDOWN_TIMEOUT_MS + 1_000),
        "shutdown must return within the drain window"
    );

    // The in-flight reply was delivered before the session closed.
    let reply = busy.await.unwrap().unwrap();
    assert_eq!(reply.data, Value::from("done"));

    // New connections are refused once shutdown has begun.
    assert!(TcpStream::connect(&addr).await.is_err());
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let (server, addr) = spawn_server(Registry::new()).await;

    let mut client = RpcClient::connect(&addr).await.unwrap();
    client.call(HEALTH_PATTERN, map_value([])).await.unwrap();
    drop(client);

    tokio::join!(server.shutdown(), server.shutdown());

    // And once more after completion.
    server.shutdown().await;
    assert!(TcpStream::connect(&addr).await.is_err());
}

#[tokio::test]
async fn stuck_session_is_force_closed_after_the_drain_window() {
    // Handler outlives the drain window; its generous timeout keeps the
    // dispatch in flight the whole time.
    let (server, addr) = spawn_server(slow_registry(30_000)).await;

    let busy_addr = addr.clone();
    let busy = tokio::spawn(async move {
        let mut client = RpcClient::connect(&busy_addr).await.unwrap();
        client
            .call_with_timeout("slow", map_value([]), 60_000)
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    server.shutdown().await;
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(SHUTDOWN_TIMEOUT_MS - 500),
        "drain window was honored"
    );
    assert!(
        elapsed < Duration::from_millis(SHUTDOWN_TIMEOUT_MS + 2_000),
        "force close bounded the wait"
    );

    // The stranded caller sees the connection die, not a reply.
    assert!(busy.await.unwrap().is_err());
}

#[tokio::test]
async fn server_without_traffic_shuts_down_quickly() {
    let (server, addr) = spawn_server(Registry::new()).await;

    let started = Instant::now();
    server.shutdown().await;
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(TcpStream::connect(&addr).await.is_err());
}

#[tokio::test]
async fn health_reports_ok_until_shutdown() {
    let (server, addr) = spawn_server(Registry::new()).await;

    let mut client = RpcClient::connect(&addr).await.unwrap();
    let reply = client.call(HEALTH_PATTERN, map_value([])).await.unwrap();
    assert_eq!(
        map_get(&reply.data, "status").and_then(Value::as_str),
        Some("ok")
    );

    server.shutdown().await;
    assert!(client.call(HEALTH_PATTERN, map_value([])).await.is_err());
}
