//! Server lifecycle integration tests
//!
//! Exercises the full assembly over real sockets: loopback multi-address
//! binding with a shared auto-assigned port, restart port reassignment,
//! database open/close in lockstep with the server, and bind failures.

use kiosk_server::config::{AppLayout, ConnectorSpec, ServerConfig, ThreadPoolSpec};
use kiosk_server::configurator::{Configurator, DatabaseConfigurator, MinimalConfigurator};
use kiosk_server::lifecycle::LifecycleState;
use kiosk_server::resources::{ResourceRegistry, DATA_SOURCE_NAME};
use kiosk_server::server::EmbeddedServer;
use kiosk_server::{net, ServerError};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn install_root() -> (TempDir, AppLayout) {
    let dir = TempDir::new().unwrap();
    let layout = AppLayout::new(dir.path());
    std::fs::create_dir_all(layout.webapp_dir()).unwrap();
    std::fs::write(
        layout.webapp_dir().join("index.html"),
        "<html><body>kiosk test app</body></html>",
    )
    .unwrap();
    (dir, layout)
}

async fn database_server(layout: AppLayout) -> Arc<EmbeddedServer> {
    let configurator = DatabaseConfigurator::new();
    let config = configurator.build(layout, None).unwrap();
    let server = Arc::new(EmbeddedServer::new(config, Arc::new(ResourceRegistry::new())));
    configurator.wire(&server).unwrap();
    server.init().await.unwrap();
    server
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_loopback_connectors_share_one_port() {
    let (_dir, layout) = install_root();
    let server = database_server(layout).await;

    server.start().await.unwrap();

    let ports = server.bound_ports().await;
    assert_eq!(ports.len(), net::loopback_addresses().len());
    let canonical = ports[0];
    assert!(canonical > 0, "first connector must hold a real port");
    for port in &ports {
        assert_eq!(*port, canonical, "all loopback connectors share the port");
    }
    assert_eq!(server.port(), canonical);

    // Every bound address serves the same application.
    let client = client();
    for addr in server.bound_addrs().await {
        let response = client
            .get(format!("http://{addr}/index.html"))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success(), "GET on {addr} failed");
        assert!(response.text().await.unwrap().contains("kiosk test app"));
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_restart_reassigns_shared_port() {
    let (_dir, layout) = install_root();
    let server = database_server(layout).await;

    server.start().await.unwrap();
    let first_port = server.port();
    assert!(first_port > 0);

    server.stop().await.unwrap();
    assert_eq!(server.port(), 0, "stopping resets the group to auto");

    server.start().await.unwrap();
    let second_port = server.port();
    assert!(second_port > 0, "restart assigns a fresh port");
    assert_eq!(server.state(), LifecycleState::Started);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_database_opens_with_server_and_serves_info() {
    let (_dir, layout) = install_root();
    let db_dir = layout.db_dir();
    let server = database_server(layout).await;

    server.start().await.unwrap();
    assert!(db_dir.join("app.db").exists(), "database file created on start");
    assert!(server.registry().data_source(DATA_SOURCE_NAME).is_ok());

    let response = client()
        .get(format!("http://localhost:{}/info", server.port()))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["greeting"], "hello, world!");
    assert!(body["db"]["now"].is_string(), "database probe returns a timestamp");
    assert_eq!(body["db"]["testvalue"], 12345);

    server.stop().await.unwrap();
    assert!(
        server.registry().data_source(DATA_SOURCE_NAME).is_err(),
        "data source unbound after stop"
    );
}

#[tokio::test]
async fn test_stopped_server_refuses_connections() {
    let (_dir, layout) = install_root();
    let server = database_server(layout).await;

    server.start().await.unwrap();
    let port = server.port();
    server.stop().await.unwrap();

    let result = client()
        .get(format!("http://127.0.0.1:{port}/index.html"))
        .send()
        .await;
    assert!(result.is_err(), "stopped listener must not accept connections");
}

#[tokio::test]
async fn test_bind_failure_fails_startup() {
    // Occupy a port, then configure the server onto it.
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let (_dir, layout) = install_root();
    let config = ServerConfig::new(layout).with_listen_port(port).with_connector(
        ConnectorSpec::http(ThreadPoolSpec::new("executor1"))
            .with_bind_addr("127.0.0.1".parse().unwrap()),
    );
    let server = EmbeddedServer::new(config, Arc::new(ResourceRegistry::new()));
    server.init().await.unwrap();

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::Bind { .. }), "got: {err}");
    assert_eq!(server.state(), LifecycleState::Failed);
}

#[tokio::test]
async fn test_minimal_assembly_serves_on_fixed_port() {
    let (_dir, layout) = install_root();
    let port = portpicker::pick_unused_port().expect("no free port");

    let configurator = MinimalConfigurator;
    let config = configurator.build(layout, Some(port)).unwrap();
    let server = Arc::new(EmbeddedServer::new(config, Arc::new(ResourceRegistry::new())));
    configurator.wire(&server).unwrap();
    server.init().await.unwrap();
    server.start().await.unwrap();

    assert_eq!(server.port(), port);
    let response = client()
        .get(format!("http://127.0.0.1:{port}/info"))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    // Minimal assembly runs without a database.
    assert!(body["db"].is_null());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_destroy_after_start_stops_everything() {
    let (_dir, layout) = install_root();
    let server = database_server(layout).await;

    server.start().await.unwrap();
    let port = server.port();

    server.destroy().await.unwrap();
    assert_eq!(server.state(), LifecycleState::Destroyed);
    assert_eq!(server.context_state(), LifecycleState::Destroyed);

    let result = client()
        .get(format!("http://127.0.0.1:{port}/index.html"))
        .send()
        .await;
    assert!(result.is_err());
}
