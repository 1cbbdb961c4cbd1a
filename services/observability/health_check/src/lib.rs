//! # Torq Health Check System
//!
//! HTTP health surface embedded in Torq services. The service implements
//! [`HealthProvider`]; the server only renders what the provider reports.
//!
//! ## Endpoints
//!
//! - `/health` - liveness, 503 once the service is unhealthy
//! - `/ready` - readiness for traffic (healthy or degraded)
//! - `/metrics` - throughput, error and memory counters
//! - `/strategies` - every strategy's stats snapshot
//! - `/strategies/{id}` - one strategy; 503 with the last error while unhealthy
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use torq_health_check::{HealthCheckServer, HealthProvider};
//!
//! # async fn run<P: HealthProvider>(provider: Arc<P>) -> anyhow::Result<()> {
//! let server = HealthCheckServer::new(provider, 8090);
//! server.serve(async { tokio::signal::ctrl_c().await.ok(); }).await?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use torq_types::StrategyStats;
use tracing::{debug, info, warn};

/// Service health status levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Service is healthy and ready for traffic
    Healthy,
    /// Service is starting up, not ready for traffic
    Starting,
    /// Service has issues but still operational
    Degraded,
    /// Service is not operational
    Unhealthy,
}

impl HealthStatus {
    pub fn is_alive(self) -> bool {
        !matches!(self, HealthStatus::Unhealthy)
    }

    pub fn is_ready(self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

/// Aggregate counters served on `/metrics`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceMetrics {
    pub ticks_ingested: u64,
    pub ticks_processed: u64,
    pub signals_published: u64,
    pub errors: u64,
    pub rate_limited: u64,
    pub publish_drops: u64,
    pub active_workers: usize,
    pub parked_strategies: usize,
    /// False while the memory ceiling is rejecting new strategies
    pub admissions_open: bool,
    pub memory_usage_bytes: u64,
    pub uptime_seconds: u64,
}

/// Source of truth behind the HTTP endpoints
pub trait HealthProvider: Send + Sync + 'static {
    fn service_name(&self) -> &str;

    fn status(&self) -> HealthStatus;

    fn metrics(&self) -> ServiceMetrics;

    fn strategies(&self) -> Vec<StrategyStats>;

    fn strategy(&self, id: &str) -> Option<StrategyStats>;
}

/// HTTP health check server
pub struct HealthCheckServer<P> {
    provider: Arc<P>,
    addr: SocketAddr,
}

impl<P: HealthProvider> HealthCheckServer<P> {
    /// Server bound to localhost on `port`
    pub fn new(provider: Arc<P>, port: u16) -> Self {
        Self::with_addr(provider, SocketAddr::from(([127, 0, 0, 1], port)))
    }

    pub fn with_addr(provider: Arc<P>, addr: SocketAddr) -> Self {
        Self { provider, addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let provider = self.provider;

        let make_svc = make_service_fn(move |_conn| {
            let provider = Arc::clone(&provider);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let provider = Arc::clone(&provider);
                    async move { Ok::<_, Infallible>(handle_request(req, provider.as_ref())) }
                }))
            }
        });

        let server = Server::try_bind(&self.addr)
            .with_context(|| format!("Failed to bind health server on {}", self.addr))?
            .serve(make_svc);

        info!("Health check server listening on http://{}", self.addr);
        info!("Endpoints: /health, /ready, /metrics, /strategies, /strategies/{{id}}");

        server
            .with_graceful_shutdown(shutdown)
            .await
            .context("Health check server error")?;

        info!("Health check server stopped");
        Ok(())
    }
}

/// Route one request against the provider
pub fn handle_request<P: HealthProvider + ?Sized>(
    req: Request<Body>,
    provider: &P,
) -> Response<Body> {
    let path = req.uri().path();
    let method = req.method();

    debug!("Health check request: {} {}", method, path);

    if method != Method::GET {
        return text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    }

    match path {
        "/health" => handle_health_endpoint(provider),
        "/ready" => handle_ready_endpoint(provider),
        "/metrics" => json_response(StatusCode::OK, &provider.metrics()),
        "/strategies" => json_response(StatusCode::OK, &provider.strategies()),
        _ => match path.strip_prefix("/strategies/") {
            Some(id) if !id.is_empty() => handle_strategy_endpoint(provider, id),
            _ => text_response(StatusCode::NOT_FOUND, "Not found"),
        },
    }
}

fn handle_health_endpoint<P: HealthProvider + ?Sized>(provider: &P) -> Response<Body> {
    let status = provider.status();
    let code = if status.is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(
        code,
        &serde_json::json!({
            "status": status,
            "service": provider.service_name(),
            "uptime_seconds": provider.metrics().uptime_seconds,
        }),
    )
}

fn handle_ready_endpoint<P: HealthProvider + ?Sized>(provider: &P) -> Response<Body> {
    let status = provider.status();
    if status.is_ready() {
        json_response(
            StatusCode::OK,
            &serde_json::json!({
                "status": "ready",
                "service": provider.service_name(),
            }),
        )
    } else {
        json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &serde_json::json!({
                "status": "not ready",
                "service": provider.service_name(),
                "current_status": status,
            }),
        )
    }
}

fn handle_strategy_endpoint<P: HealthProvider + ?Sized>(provider: &P, id: &str) -> Response<Body> {
    match provider.strategy(id) {
        Some(stats) if stats.healthy => json_response(StatusCode::OK, &stats),
        Some(stats) => json_response(StatusCode::SERVICE_UNAVAILABLE, &stats),
        None => text_response(StatusCode::NOT_FOUND, "Unknown strategy"),
    }
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec_pretty(body) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            warn!("Failed to serialize health response: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Serialization error")
        }
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}

/// Resident memory of the current process in bytes
#[cfg(target_os = "linux")]
pub fn process_memory_bytes() -> Result<u64> {
    let status = std::fs::read_to_string("/proc/self/status")
        .context("Failed to read /proc/self/status")?;
    parse_vm_rss(&status)
        .ok_or_else(|| anyhow::anyhow!("VmRSS missing from /proc/self/status"))
}

/// Peak resident memory of the current process in bytes
#[cfg(not(target_os = "linux"))]
pub fn process_memory_bytes() -> Result<u64> {
    // MaybeUninit avoids reading a zeroed struct as valid
    let mut rusage = std::mem::MaybeUninit::<libc::rusage>::uninit();
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, rusage.as_mut_ptr()) };
    if rc != 0 {
        let errno = std::io::Error::last_os_error();
        return Err(anyhow::anyhow!(
            "Failed to get memory usage via getrusage: {}",
            errno
        ));
    }
    let rusage = unsafe { rusage.assume_init() };
    let max_rss = rusage.ru_maxrss.max(0) as u64;

    // macOS reports bytes, the BSDs kilobytes
    if cfg!(target_os = "macos") {
        Ok(max_rss)
    } else {
        Ok(max_rss * 1024)
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}
