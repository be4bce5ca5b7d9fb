use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response},
    routing::{get, post},
    Form, Json, Router,
};
use portfolio_api::{app::build_app, config::AppConfig, state::AppState, store::MemoryStore};
use serde_json::{json, Value};
use tower::ServiceExt;

#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub config: AppConfig,
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }
}

#[allow(dead_code)]
pub fn test_app() -> TestApp {
    test_app_with(AppConfig::for_tests())
}

#[allow(dead_code)]
pub fn test_app_with(config: AppConfig) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::from_parts(config.clone(), store.clone()).expect("state");
    TestApp {
        router: build_app(state),
        store,
        config,
    }
}

#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[allow(dead_code)]
pub async fn body_json(res: Response<Body>) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// `name=value` of the first `Set-Cookie` for `name`.
#[allow(dead_code)]
pub fn set_cookie(res: &Response<Body>, name: &str) -> Option<String> {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

/// Cookie pair usable in a `Cookie` request header.
#[allow(dead_code)]
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap_or_default().to_string()
}

/// Local stand-in for the identity provider. `token_status` controls the
/// token endpoint's answer.
#[allow(dead_code)]
pub async fn spawn_provider(token_status: u16, userinfo: Value) -> SocketAddr {
    let token_status = axum::http::StatusCode::from_u16(token_status).unwrap();
    let app = Router::new()
        .route(
            "/oauth/v2/token",
            post(move |Form(form): Form<Vec<(String, String)>>| async move {
                let has = |k: &str, v: &str| form.iter().any(|(a, b)| a == k && b == v);
                assert!(has("grant_type", "authorization_code"));
                assert!(has("client_id", "test-client"));
                assert!(has("client_secret", "test-client-secret"));
                (
                    token_status,
                    Json(json!({"access_token": "provider-access", "token_type": "Bearer"})),
                )
            }),
        )
        .route(
            "/oidc/v1/userinfo",
            get(move |headers: axum::http::HeaderMap| {
                let userinfo = userinfo.clone();
                async move {
                    let auth = headers
                        .get(header::AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    if auth == "Bearer provider-access" {
                        (axum::http::StatusCode::OK, Json(userinfo))
                    } else {
                        (axum::http::StatusCode::UNAUTHORIZED, Json(json!({})))
                    }
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
