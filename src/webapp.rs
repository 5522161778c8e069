//! Application context
//!
//! Builds the router for the deployed web application: static content from
//! the webapp directory at `/`, a JSON info endpoint backed by the resource
//! registry, a per-request unique key, request tracing, and response
//! compression.

use crate::resources::{ResourceRegistry, DATA_SOURCE_NAME, ENV_VALUE_NAME};
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::debug;
use uuid::Uuid;

/// Context-wide greeting attribute, visible through `/info`.
pub const GREETING: &str = "hello, world!";

/// Unique key attached to every request.
#[derive(Debug, Clone, Copy)]
pub struct RequestKey(pub Uuid);

/// State shared by application handlers.
#[derive(Clone)]
pub struct AppState {
    pub greeting: String,
    pub registry: Arc<ResourceRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self {
            greeting: GREETING.to_string(),
            registry,
        }
    }
}

/// Build the application router over the webapp directory.
pub fn build_router(state: AppState, webapp_dir: &Path, cors_enabled: bool) -> Router {
    let mut app = Router::new()
        .route("/info", get(info))
        .fallback_service(ServeDir::new(webapp_dir))
        .with_state(state)
        .layer(middleware::from_fn(attach_request_key))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if cors_enabled {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app
}

/// Attach a fresh unique key to the request and echo it in the response.
async fn attach_request_key(mut req: Request, next: Next) -> Response {
    let key = RequestKey(Uuid::new_v4());
    debug!("request {} {} key={}", req.method(), req.uri().path(), key.0);
    req.extensions_mut().insert(key);

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&key.0.to_string()) {
        response.headers_mut().insert("x-request-key", value);
    }
    response
}

#[derive(Debug, Serialize)]
struct InfoResponse {
    greeting: String,
    request_key: String,
    db: Value,
}

/// Context info: greeting attribute, request key, and a database probe when
/// a data source is bound.
async fn info(
    State(state): State<AppState>,
    Extension(key): Extension<RequestKey>,
) -> impl IntoResponse {
    let db = match state.registry.data_source(DATA_SOURCE_NAME) {
        Ok(handle) => match handle.query("SELECT CURRENT_TIMESTAMP AS now", &[]).await {
            Ok(rows) => {
                let now = rows
                    .first()
                    .and_then(|row| row.get("now").cloned())
                    .unwrap_or(Value::Null);
                json!({
                    "now": now,
                    "testvalue": state.registry.env_value(ENV_VALUE_NAME).ok(),
                })
            }
            Err(err) => json!({ "error": err.to_string() }),
        },
        // No data source bound; the context runs without a database.
        Err(_) => Value::Null,
    };

    Json(InfoResponse {
        greeting: state.greeting.clone(),
        request_key: key.0.to_string(),
        db,
    })
}
