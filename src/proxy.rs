//! Reverse proxy — forwards everything under a path prefix to the REST
//! backend, unchanged apart from hop-by-hop headers.
//!
//! ```text
//! ANY  /api            → <backend>/api
//! ANY  /api/{*rest}    → <backend>/api/{rest}?{query}
//! ANY  anything else   → 404
//! ```
//!
//! Stateless: no retries, no caching. A backend that cannot be reached
//! yields `503 {"error": "Failed to connect to backend"}`.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::any,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ProxyConfig;
use crate::error::AppError;

/// Largest request body forwarded upstream.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const HOP_BY_HOP: [HeaderName; 8] = [
    header::HOST,
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Axum router state. Cheap to clone.
#[derive(Clone)]
pub struct ProxyState {
    http: reqwest::Client,
    backend_url: Arc<str>,
}

impl ProxyState {
    pub fn new(backend_url: &str) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Proxy(format!("cannot build http client: {e}")))?;
        Ok(Self { http, backend_url: Arc::from(backend_url.trim_end_matches('/')) })
    }
}

// ── ProxyServer ───────────────────────────────────────────────────────────────

pub struct ProxyServer {
    bind_addr: String,
    prefix: String,
    state: ProxyState,
}

impl ProxyServer {
    pub fn new(config: &ProxyConfig) -> Result<Self, AppError> {
        Ok(Self {
            bind_addr: config.bind.clone(),
            prefix: config.prefix.clone(),
            state: ProxyState::new(&config.backend_url)?,
        })
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), AppError> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .map_err(|e| AppError::Proxy(format!("bind failed on {}: {e}", self.bind_addr)))?;

        info!(
            bind_addr = %self.bind_addr,
            prefix = %self.prefix,
            backend = %self.state.backend_url,
            "proxy listening"
        );

        axum::serve(listener, build_router(&self.prefix, self.state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| AppError::Proxy(format!("server error: {e}")))?;

        info!("proxy shut down");
        Ok(())
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// An empty prefix forwards every path.
pub fn build_router(prefix: &str, state: ProxyState) -> Router {
    let prefix = prefix.trim_end_matches('/');
    let router = if prefix.is_empty() {
        Router::new().fallback(forward)
    } else {
        Router::new()
            .route(prefix, any(forward))
            .route(&format!("{prefix}/{{*rest}}"), any(forward))
            .fallback(not_found)
    };
    router.with_state(state)
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn forward(State(state): State<ProxyState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let target = format!("{}{path_and_query}", state.backend_url);

    let forward_body = parts.method != Method::GET && parts.method != Method::HEAD;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    if !forward_body {
        // The body is dropped, so its length must not be announced.
        headers.remove(header::CONTENT_LENGTH);
    }

    let mut upstream = state.http.request(parts.method.clone(), &target).headers(headers);
    if forward_body {
        match to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => upstream = upstream.body(bytes),
            Err(e) => {
                warn!(%target, "request body rejected: {e}");
                return StatusCode::PAYLOAD_TOO_LARGE.into_response();
            }
        }
    }

    debug!(method = %parts.method, %target, "forwarding");
    match upstream.send().await {
        Ok(resp) => relay(resp).await,
        Err(e) => {
            error!(%target, "proxy error: {e}");
            backend_unavailable()
        }
    }
}

async fn relay(resp: reqwest::Response) -> Response {
    let status = resp.status();
    let mut headers = resp.headers().clone();
    strip_hop_by_hop(&mut headers);
    // Recomputed for the buffered body.
    headers.remove(header::CONTENT_LENGTH);

    match resp.bytes().await {
        Ok(bytes) => {
            let mut out = Response::new(Body::from(bytes));
            *out.status_mut() = status;
            *out.headers_mut() = headers;
            out
        }
        Err(e) => {
            error!("reading backend response failed: {e}");
            backend_unavailable()
        }
    }
}

fn backend_unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "Failed to connect to backend" })),
    )
        .into_response()
}

/// Remove hop-by-hop headers, including any the `Connection` header names.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}
