//! Path: crates/sim-rpc/src/server.rs
//! Axum transport shell (§4.7): JSON-RPC 2.0 over HTTP POST at `/api`, a
//! liveness probe at `/health`, and a Prometheus exposition endpoint at
//! `/metrics`. Transport layering mirrors the teacher's gateway: rate
//! limiting ahead of the route, then `HandleErrorLayer` -> `LoadShedLayer`
//! -> `ConcurrencyLimitLayer` -> `TimeoutLayer`, then `CatchPanicLayer` ->
//! `TraceLayer` -> `RequestBodyLimitLayer`.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::error_handling::HandleErrorLayer;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use dashmap::DashMap;
use ipnetwork::IpNetwork;
use serde_json::{json, Value};
use sim_engine::ContractHost;
use sim_liveio::MockTable;
use sim_types::ErrorCode;
use tokio::sync::watch;
use tower::limit::ConcurrencyLimitLayer;
use tower::load_shed::LoadShedLayer;
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::dispatcher::{dispatch, DispatcherConfig};
use crate::world::{with_world, WorldHandle};

pub struct ServerConfig {
    pub listen_addr: String,
    pub rps: u32,
    pub burst: u32,
    pub body_limit_kb: usize,
    pub trusted_proxies: Vec<String>,
}

/// The Router's shared state: a handle on the world, the per-submission mock
/// table, the consensus parameters, and the process-wide metrics handle
/// installed once at startup by the caller (sim-node).
pub struct ServerState<H: ContractHost> {
    pub world: WorldHandle<H>,
    pub mocks: Arc<MockTable>,
    pub config: DispatcherConfig,
    pub metrics: &'static sim_telemetry::Metrics,
}

impl<H: ContractHost> Clone for ServerState<H> {
    fn clone(&self) -> Self {
        Self {
            world: self.world.clone(),
            mocks: self.mocks.clone(),
            config: self.config,
            metrics: self.metrics,
        }
    }
}

#[derive(Clone)]
struct IpLimiter {
    buckets: Arc<DashMap<IpAddr, Bucket>>,
    rps: f64,
    burst: f64,
    trusted_proxy_cidrs: Arc<Vec<IpNetwork>>,
}

#[derive(Clone)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

impl IpLimiter {
    fn new(rps: u32, burst: u32, trusted_proxy_cidrs: Arc<Vec<IpNetwork>>) -> Self {
        Self { buckets: Arc::new(DashMap::new()), rps: rps as f64, burst: burst as f64, trusted_proxy_cidrs }
    }

    fn client_ip<B>(&self, req: &Request<B>) -> IpAddr {
        if let Some(peer_ip) = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|c| c.0.ip()) {
            if self.trusted_proxy_cidrs.iter().any(|cidr| cidr.contains(peer_ip)) {
                if let Some(xff) = req.headers().get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
                    if let Some(first) = xff.split(',').next() {
                        if let Ok(ip) = first.trim().parse::<IpAddr>() {
                            return ip;
                        }
                    }
                }
            }
            return peer_ip;
        }
        IpAddr::from([127, 0, 0, 1])
    }

    fn allow<B>(&self, req: &Request<B>) -> bool {
        let ip = self.client_ip(req);
        let now = Instant::now();
        let mut entry = self.buckets.entry(ip).or_insert_with(|| Bucket { tokens: self.burst, last: now });
        let elapsed = now.duration_since(entry.last).as_secs_f64();
        entry.tokens = (entry.tokens + elapsed * self.rps).min(self.burst);
        entry.last = now;
        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

async fn rate_limit_middleware(State(limiter): State<IpLimiter>, req: Request<Body>, next: Next) -> Response {
    if limiter.allow(&req) {
        next.run(req).await
    } else {
        (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response()
    }
}

async fn map_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, Json(json!({"error": {"code": "TIMEOUT", "message": "request timed out"}})))
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": {"code": "OVERLOADED", "message": err.to_string()}})))
    }
}

fn error_response(id: Value, code: i64, message: String) -> Value {
    json!({"jsonrpc": "2.0", "error": {"code": code, "message": message}, "id": id})
}

fn success_response(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "result": result, "id": id})
}

/// Handles one JSON-RPC request object. Malformed-request errors (`-32600`)
/// are caught here rather than propagated, so one bad element of a batch
/// array never aborts its siblings.
async fn handle_one<H>(state: &ServerState<H>, request: Value) -> Value
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let Value::Object(obj) = &request else {
        return error_response(Value::Null, -32600, "request must be a JSON object".to_string());
    };
    let id = obj.get("id").cloned().unwrap_or(Value::Null);

    let Some(method) = obj.get("method").and_then(Value::as_str) else {
        return error_response(id, -32600, "missing or invalid \"method\"".to_string());
    };
    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return error_response(id, -32600, "missing or invalid \"jsonrpc\" version".to_string());
    }
    let params = obj.get("params").cloned().unwrap_or(Value::Null);

    let started = Instant::now();
    let outcome = dispatch(&state.world, &state.mocks, &state.config, method, params).await;
    state.metrics.observe_rpc_latency(method, started.elapsed().as_secs_f64());

    match outcome {
        Ok(result) => {
            state.metrics.inc_rpc_request(method, "ok");
            success_response(id, result)
        }
        Err(err) => {
            state.metrics.inc_rpc_request(method, "error");
            state.metrics.inc_error("dispatch", err.code());
            let rpc_err = err.to_json_rpc();
            error_response(id, rpc_err.code, rpc_err.message)
        }
    }
}

/// `POST /api`: malformed JSON bodies are answered with a `-32700` JSON-RPC
/// error rather than a bare 400, since JSON-RPC errors live in the body.
async fn api_handler<H>(State(state): State<ServerState<H>>, body: Bytes) -> Response
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return Json(error_response(Value::Null, -32700, format!("parse error: {e}"))).into_response(),
    };

    let response = match value {
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(handle_one(&state, item).await);
            }
            Value::Array(out)
        }
        other => handle_one(&state, other).await,
    };
    Json(response).into_response()
}

async fn health_handler<H>(State(state): State<ServerState<H>>) -> Json<Value>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let block_number = with_world(&state.world, |engine| engine.state().block_number).await;
    Json(json!({"status": "ok", "block_number": block_number}))
}

async fn metrics_handler() -> impl IntoResponse {
    match sim_telemetry::metrics_text() {
        Ok(text) => {
            let content_type = prometheus::TextEncoder::new().format_type().to_string();
            ([(axum::http::header::CONTENT_TYPE, content_type)], text).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub fn router<H>(state: ServerState<H>, config: &ServerConfig) -> Router
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let cidrs = Arc::new(config.trusted_proxies.iter().filter_map(|s| IpNetwork::from_str(s).ok()).collect());
    let limiter = IpLimiter::new(config.rps, config.burst, cidrs);

    Router::new()
        .route("/api", post(api_handler::<H>))
        .route("/health", get(health_handler::<H>))
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn_with_state(limiter.clone(), rate_limit_middleware))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_middleware_error))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(128))
                .layer(TimeoutLayer::new(Duration::from_secs(2))),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.body_limit_kb * 1024))
}

/// Binds and serves the Sim's HTTP surface, awaiting `shutdown_rx` for a
/// graceful stop (§4.7/§6.3).
pub async fn run_server<H>(
    state: ServerState<H>,
    config: ServerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()>
where
    H: ContractHost + Send + 'static,
    H::Instance: Clone + Send,
    H::Class: Send,
{
    let addr: SocketAddr = config.listen_addr.parse()?;
    let app = router(state, &config);

    tracing::info!(target: "sim_rpc::server", %addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).with_graceful_shutdown(
        async move {
            shutdown_rx.changed().await.ok();
            tracing::info!(target: "sim_rpc::server", "shutting down gracefully");
        },
    );

    if let Err(e) = server.await {
        tracing::error!(target: "sim_rpc::server", error = %e, "server error");
    }
    Ok(())
}
