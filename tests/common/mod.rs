#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Request, StatusCode},
};
use http_body_util::BodyExt;
use media_gateway::config::GatewayConfig;
use media_gateway::infrastructure::storage::setup_storage;
use media_gateway::models::Capabilities;
use media_gateway::services::access::JwtAccessResolver;
use media_gateway::services::orchestrator::MediaOrchestrator;
use media_gateway::utils::auth::{TokenSubject, create_jwt};
use media_gateway::{AppState, create_app};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const HELLO_METADATA: &str =
    r#"{"media_id":null,"media_type":"FILE","media_name":"a.txt","file_size":12}"#;

pub struct TestGateway {
    pub app: Router,
    pub config: GatewayConfig,
    // keeps the media directory alive for the test
    pub dir: TempDir,
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|e| {
            panic!(
                "body is not JSON ({}): {}",
                e,
                String::from_utf8_lossy(&self.body)
            )
        })
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("media_gateway=debug")
        .with_test_writer()
        .try_init();
}

pub async fn setup() -> TestGateway {
    setup_with(|_| {}).await
}

pub async fn setup_with(adjust: impl FnOnce(&mut GatewayConfig)) -> TestGateway {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut config = GatewayConfig::development(dir.path());
    adjust(&mut config);

    let store = setup_storage(&config).await.unwrap();
    let state = AppState {
        orchestrator: Arc::new(MediaOrchestrator::new(store, config.clone())),
        resolver: Arc::new(JwtAccessResolver::new(
            config.jwt_secret.clone(),
            config.anonymous_capabilities,
        )),
        config: config.clone(),
    };

    TestGateway {
        app: create_app(state),
        config,
        dir,
    }
}

pub fn token_for(config: &GatewayConfig, name: &str, capabilities: Capabilities) -> String {
    let subject = TokenSubject {
        user_id: name,
        user_name: name,
        group_name: None,
        capabilities,
    };
    create_jwt(&subject, &config.jwt_secret, 1).unwrap()
}

pub fn admin_token(config: &GatewayConfig) -> String {
    token_for(config, "admin", Capabilities::ALL)
}

pub fn caps(read: bool, write: bool, execute: bool) -> Capabilities {
    Capabilities {
        read,
        write,
        execute,
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    Reply {
        status,
        headers,
        body,
    }
}

pub async fn get(app: &Router, uri: &str, token: Option<&str>) -> Reply {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

/// Posts an upload and returns the reply with its parsed event array.
pub async fn upload(
    app: &Router,
    uri: &str,
    token: &str,
    metadata: &str,
    body: impl Into<Body>,
) -> (Reply, Vec<Value>) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .header("file-metadata", metadata)
        .body(body.into())
        .unwrap();
    let reply = send(app, request).await;
    let events = if reply.status == StatusCode::OK {
        reply.json().as_array().cloned().unwrap_or_default()
    } else {
        Vec::new()
    };
    (reply, events)
}

/// The terminal element of an upload event array.
pub fn final_event(events: &[Value]) -> &Value {
    events.last().expect("upload produced no events")
}

/// Uploads `content` into the default zone and returns its media id.
pub async fn store_media(gateway: &TestGateway, name: &str, content: &'static [u8]) -> String {
    let metadata = format!(
        r#"{{"media_type":"FILE","media_name":"{}","file_size":{}}}"#,
        name,
        content.len()
    );
    let token = admin_token(&gateway.config);
    let (reply, events) = upload(&gateway.app, "/post", &token, &metadata, content).await;
    assert_eq!(reply.status, StatusCode::OK);
    let last = final_event(&events);
    assert_eq!(last["status"], "OK", "upload failed: {}", last);
    last["media_id"].as_str().unwrap().to_string()
}

/// Path and query of a connector url, relative to the gateway.
pub fn connector_path(config: &GatewayConfig, url: &str) -> String {
    url.strip_prefix(&config.public_url)
        .unwrap_or(url)
        .to_string()
}
