//! Request middleware: rate limiting, CORS, security headers, request
//! IDs, and access logging.

use std::collections::HashMap;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::RwLock;
use tracing::{info, warn, Span};
use uuid::Uuid;

use crate::metrics;

pub type IpRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Ceiling on distinct client IPs tracked at once; an address-rotating
/// client evicts stale entries instead of growing the map.
const MAX_TRACKED_IPS: usize = 10_000;

const LIMITER_TTL: Duration = Duration::from_secs(3600);

struct LimiterEntry {
    limiter: Arc<IpRateLimiter>,
    created: Instant,
}

/// Lazily-populated per-IP rate limiters sharing one quota.
#[derive(Clone)]
pub struct RateLimiterCache {
    entries: Arc<RwLock<HashMap<IpAddr, LimiterEntry>>>,
    quota: Quota,
}

impl RateLimiterCache {
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second)
            .unwrap_or_else(|| NonZeroU32::new(10).expect("nonzero"));
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            quota: Quota::per_second(rps),
        }
    }

    /// True when the request fits inside the client's budget.
    pub async fn check(&self, ip: IpAddr) -> bool {
        if let Some(entry) = self.entries.read().await.get(&ip) {
            return entry.limiter.check().is_ok();
        }

        let mut entries = self.entries.write().await;
        if entries.len() >= MAX_TRACKED_IPS && !entries.contains_key(&ip) {
            let now = Instant::now();
            entries.retain(|_, e| now.duration_since(e.created) < LIMITER_TTL);
        }
        // The entry API also covers a writer that raced us for this IP.
        let entry = entries.entry(ip).or_insert_with(|| LimiterEntry {
            limiter: Arc::new(RateLimiter::direct(self.quota)),
            created: Instant::now(),
        });
        entry.limiter.check().is_ok()
    }
}

/// Build the CORS layer. Wildcard origins cannot be combined with
/// credentials, so the two configurations diverge.
pub fn cors_layer(origins: &[String]) -> tower_http::cors::CorsLayer {
    use tower_http::cors::{Any, CorsLayer};

    let max_age = Duration::from_secs(600);
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .max_age(max_age);
    }

    let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(max_age)
}

const SECURITY_HEADERS: [(&str, &str); 3] = [
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
    ("Referrer-Policy", "strict-origin-when-cross-origin"),
];

pub async fn security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    for (name, value) in SECURITY_HEADERS {
        response
            .headers_mut()
            .insert(name, HeaderValue::from_static(value));
    }
    response
}

/// Attach a request ID: honour an inbound `X-Request-ID`, otherwise mint
/// one, and echo it on the response.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let id = match request
        .headers()
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
    {
        Some(inbound) => inbound.to_string(),
        None => Uuid::new_v4().to_string(),
    };

    request.extensions_mut().insert(id.clone());
    Span::current().record("request_id", id.as_str());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("X-Request-ID", value);
    }
    response
}

/// Access log line per request; health probes are too chatty to keep.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    let response = next.run(request).await;

    if !matches!(uri.path(), "/health" | "/healthz") {
        info!(
            method = %method,
            uri = %uri,
            status = %response.status(),
            duration_ms = %started.elapsed().as_millis(),
            "Request completed"
        );
    }
    response
}

pub async fn rate_limit_middleware(
    State(limiters): State<Arc<RateLimiterCache>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let Some(ip) = client_ip(&request) else {
        return next.run(request).await;
    };

    if limiters.check(ip).await {
        next.run(request).await
    } else {
        warn!(ip = %ip, "Rate limit exceeded");
        metrics::record_rate_limit_hit(request.uri().path());
        (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", "1")],
            "Rate limit exceeded. Please try again later.",
        )
            .into_response()
    }
}

/// Client address: leftmost `X-Forwarded-For` hop when present (the
/// service sits behind a proxy in deployment), else the socket peer.
fn client_ip(request: &Request<Body>) -> Option<IpAddr> {
    let forwarded = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|chain| chain.split(',').next())
        .and_then(|first| first.trim().parse().ok());

    forwarded.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<std::net::SocketAddr>>()
            .map(|info| info.0.ip())
    })
}
