use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

use portal_core::time::fixed_clock;
use services::http::SessionTokens;
use services::{ApiClient, ApiConfig, ApiError, HeadlessShell, ReqwestTransport};

fn envelope(data: Value) -> Json<Value> {
    Json(json!({
        "code": 200,
        "message": "success",
        "data": data,
        "timestamp": 1_700_000_000_000_i64,
    }))
}

async fn modules(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if bearer != "Bearer secret" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"code": 401, "message": "token expired"})),
        );
    }
    (StatusCode::OK, envelope(json!([{"id": "basics", "title": "Basics"}])))
}

async fn echo(Json(body): Json<Value>) -> Json<Value> {
    envelope(body)
}

async fn refused() -> Json<Value> {
    Json(json!({"code": 4001, "message": "captcha required", "data": null}))
}

async fn serve() -> SocketAddr {
    let app = Router::new()
        .route("/api/v1/learning/modules", get(modules))
        .route("/api/v1/echo", post(echo))
        .route("/api/v1/user/register", post(refused));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr) -> ApiClient {
    let config = ApiConfig::new(Url::parse(&format!("http://{addr}")).unwrap());
    let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
    ApiClient::new(
        Arc::new(transport),
        config,
        fixed_clock(),
        SessionTokens::new(),
        Arc::new(HeadlessShell),
    )
}

#[tokio::test]
async fn sends_bearer_and_unwraps_envelope() {
    let addr = serve().await;
    let client = client_for(addr);
    client.tokens().set(Some("secret".into()));

    let modules: Vec<Value> = client.get("/api/v1/learning/modules").await.unwrap();
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0]["id"], "basics");
}

#[tokio::test]
async fn json_body_reaches_the_server() {
    let addr = serve().await;
    let client = client_for(addr);

    let echoed: Value = client
        .post("/api/v1/echo", &json!({"progress": 40}))
        .await
        .unwrap();
    assert_eq!(echoed, json!({"progress": 40}));
}

#[tokio::test]
async fn http_status_and_envelope_codes_become_business_errors() {
    let addr = serve().await;
    let client = client_for(addr);

    let err = client
        .get::<Vec<Value>>("/api/v1/learning/modules")
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert_eq!(err.code(), Some(401));

    let err = client
        .post::<Value, _>("/api/v1/user/register", &json!({}))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ApiError::Business {
            code: 4001,
            message: "captcha required".into()
        }
    );
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(addr);
    let err = client
        .get::<Value>("/api/v1/learning/modules")
        .await
        .unwrap_err();
    assert!(err.is_network(), "{err:?}");
}
