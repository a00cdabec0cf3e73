use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tollgate_auth::{Client, MemoryCredentialStore};
use tollgate_server::config::ServerConfig;
use tollgate_server::{AppConfig, ServerBuilder, StorageBackend, with_transport_layers};

const ORDERS: &str = "https://api.example.com/orders";
const BILLING: &str = "https://api.example.com/billing";

fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.storage.backend = StorageBackend::Memory;
    cfg.auth.signing.secret = "integration-secret-0123456789abcdef".into();
    // Only size, stop and shutdown drain the buffer in these tests.
    cfg.auth.batch.flush_interval = Duration::from_secs(3600);
    cfg.server.shutdown_timeout = Duration::from_secs(5);
    cfg
}

fn memory_store() -> Arc<MemoryCredentialStore> {
    let store = Arc::new(MemoryCredentialStore::new());
    store.insert_client(Client::new("svc", "s3cret", vec![ORDERS.to_string()]));
    store
}

async fn start_server(
    store: Arc<MemoryCredentialStore>,
) -> (
    String,
    tokio::sync::oneshot::Sender<()>,
    JoinHandle<anyhow::Result<()>>,
) {
    let server = ServerBuilder::new()
        .with_config(test_config())
        .with_store(store)
        .build()
        .await
        .expect("build server");

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        server
            .serve(listener, async move {
                let _ = rx.await;
            })
            .await
    });

    (format!("http://{addr}"), tx, handle)
}

async fn issue(client: &reqwest::Client, base: &str) -> String {
    let resp = client
        .post(format!("{base}/oauth/token"))
        .json(&json!({
            "grant_type": "client_credentials",
            "client_id": "svc",
            "client_secret": "s3cret",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn token_lifecycle_over_http() {
    let (base, shutdown_tx, handle) = start_server(memory_store()).await;
    let client = reqwest::Client::new();

    // GET /healthz
    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert!(resp.status().is_success());
    assert!(resp.headers().contains_key("x-request-id"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    // POST /oauth/token
    let resp = client
        .post(format!("{base}/oauth/token"))
        .json(&json!({
            "grant_type": "client_credentials",
            "client_id": "svc",
            "client_secret": "s3cret",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["cache-control"], "no-store");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    let token = body["access_token"].as_str().unwrap().to_string();

    // POST /oauth/validate
    let resp = client
        .post(format!("{base}/oauth/validate"))
        .bearer_auth(&token)
        .header("x-resource-url", ORDERS)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(body["client_id"], "svc");
    assert_eq!(body["scopes"], json!([ORDERS]));

    // Scope not granted is forbidden, not unauthorized
    let resp = client
        .post(format!("{base}/oauth/validate"))
        .bearer_auth(&token)
        .header("x-resource-url", BILLING)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_scope");

    // Missing resource header
    let resp = client
        .post(format!("{base}/oauth/validate"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // POST /oauth/revoke, then the token no longer validates
    let resp = client
        .post(format!("{base}/oauth/revoke"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "revoked");

    let resp = client
        .post(format!("{base}/oauth/validate"))
        .bearer_auth(&token)
        .header("x-resource-url", ORDERS)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    assert!(resp.headers().contains_key("www-authenticate"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_token");

    let _ = shutdown_tx.send(());
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn token_endpoint_rejections() {
    let (base, shutdown_tx, handle) = start_server(memory_store()).await;
    let client = reqwest::Client::new();
    let token_url = format!("{base}/oauth/token");

    let resp = client
        .post(&token_url)
        .json(&json!({
            "grant_type": "client_credentials",
            "client_id": "svc",
            "client_secret": "wrong",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_client");

    let resp = client
        .post(&token_url)
        .json(&json!({
            "grant_type": "password",
            "client_id": "svc",
            "client_secret": "s3cret",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "unsupported_grant_type");

    let resp = client
        .post(&token_url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base}/oauth/revoke"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let _ = shutdown_tx.send(());
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_flushes_pending_tokens() {
    let store = memory_store();
    let (base, shutdown_tx, handle) = start_server(Arc::clone(&store)).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        issue(&client, &base).await;
    }
    assert_eq!(store.token_count(), 0);

    let resp = client.get(format!("{base}/readyz")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["storage"], "memory");
    assert_eq!(body["batch"]["pending"], 3);

    let _ = shutdown_tx.send(());
    handle.await.unwrap().unwrap();

    assert_eq!(store.token_count(), 3);
    assert!(store.is_closed());
    assert!(client.get(format!("{base}/healthz")).send().await.is_err());
}

async fn boom() -> &'static str {
    panic!("handler exploded")
}

#[tokio::test]
async fn handler_panic_becomes_generic_500() {
    let app = with_transport_layers(
        Router::new()
            .route("/boom", get(boom))
            .route("/fine", get(|| async { "fine" })),
        &ServerConfig::default(),
    );
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let client = reqwest::Client::new();

    let resp = client.get(format!("http://{addr}/boom")).send().await.unwrap();
    assert_eq!(resp.status(), 500);
    assert!(resp.headers().contains_key("x-request-id"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "server_error");
    assert_eq!(body["error_description"], "Internal server error");

    // The server keeps serving after a panic
    let resp = client.get(format!("http://{addr}/fine")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    server.abort();
}
