#![allow(dead_code)]

use ed25519_dalek::SigningKey;
use reqwest::{Client, Response};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tollgate_credential::CredentialCodec;
use tollgate_server::{serve_http, serve_hub, AppState, ServerConfig};
use tollgate_store::{KdfParams, MemoryBackend, StoreConfig};

pub const ADMIN_KEY: &str = "test-admin-key-0123456789";
pub const SECRET: &str = "correct-horse";

pub struct TestServer {
    pub base: String,
    pub hub_addr: SocketAddr,
    pub state: AppState,
    pub http: Client,
}

pub async fn spawn_server() -> TestServer {
    spawn_server_with(ServerConfig::default()).await
}

/// Starts both listeners on OS-assigned ports.
pub async fn spawn_server_with(config: ServerConfig) -> TestServer {
    let state = AppState::assemble(
        Arc::new(MemoryBackend::new()),
        CredentialCodec::new(SigningKey::from_bytes(&[7; 32])),
        StoreConfig {
            kdf: KdfParams::insecure_fast(),
        },
        config,
        ADMIN_KEY,
    );

    let http = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = http.local_addr().unwrap().port();
    tokio::spawn(serve_http(http, state.clone()));

    let hub = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let hub_addr = hub.local_addr().unwrap();
    tokio::spawn(serve_hub(hub, state.clone()));

    TestServer {
        base: format!("http://127.0.0.1:{}", port),
        hub_addr,
        state,
        http: Client::new(),
    }
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base, path)
    }

    pub async fn post(&self, path: &str, body: Value) -> Response {
        self.http.post(self.url(path)).json(&body).send().await.unwrap()
    }

    pub async fn admin_post(&self, path: &str, body: Value) -> Response {
        self.http
            .post(self.url(path))
            .header("x-admin-key", ADMIN_KEY)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn admin_get(&self, path: &str) -> Response {
        self.http
            .get(self.url(path))
            .header("x-admin-key", ADMIN_KEY)
            .send()
            .await
            .unwrap()
    }

    pub async fn admin_delete(&self, path: &str) -> Response {
        self.http
            .delete(self.url(path))
            .header("x-admin-key", ADMIN_KEY)
            .send()
            .await
            .unwrap()
    }

    /// Registers `identity` with secret "correct-horse" on a new license.
    pub async fn register(&self, identity: &str, client_id: &str, plan: &str) {
        let resp = self
            .admin_post(
                "/admin/identities",
                serde_json::json!({
                    "identity": identity,
                    "secret": SECRET,
                    "client_id": client_id,
                    "plan": plan,
                }),
            )
            .await;
        assert_eq!(resp.status(), 201);
    }

    pub async fn authenticate(&self, identity: &str, secret: &str) -> Response {
        self.post(
            "/authenticate",
            serde_json::json!({
                "identity": identity,
                "secret": secret,
                "fingerprint": "fp-test",
            }),
        )
        .await
    }

    /// Registers and logs in. Returns the token.
    pub async fn login(&self, identity: &str, client_id: &str, plan: &str) -> String {
        self.register(identity, client_id, plan).await;
        let resp = self.authenticate(identity, SECRET).await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }
}

/// Returns the `error` code of an error response.
pub async fn error_code(resp: Response) -> String {
    let body: Value = resp.json().await.unwrap();
    body["error"].as_str().unwrap().to_string()
}
