//! HTTP handlers in front of the limiter.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, trace, warn};

use crate::ratelimit::{Limiter, RateLimited};

/// Shared state handed to every handler.
pub struct AppState<L> {
    limiter: Arc<L>,
    client_header: HeaderName,
}

impl<L> Clone for AppState<L> {
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            client_header: self.client_header.clone(),
        }
    }
}

/// Response body of the blacklist introspection route.
#[derive(Debug, Serialize)]
pub struct BlacklistStatus {
    pub client_id: String,
    pub blacklisted: bool,
    pub blacklisted_since: Option<String>,
}

impl IntoResponse for RateLimited {
    fn into_response(self) -> Response {
        (StatusCode::TOO_MANY_REQUESTS, self.to_string()).into_response()
    }
}

/// Build the router.
///
/// `/health` and `/blacklist/{client_id}` are never rate limited; every
/// other path goes through [`Limiter::admit`].
pub fn router<L: Limiter + 'static>(limiter: Arc<L>, client_header: HeaderName) -> Router {
    let state = AppState {
        limiter,
        client_header,
    };

    Router::new()
        .route("/health", get(health))
        .route("/blacklist/{client_id}", get(blacklist_status::<L>))
        .fallback(admit_request::<L>)
        .with_state(state)
}

#[instrument(
    skip_all,
    fields(method = %request.method(), path = %request.uri().path())
)]
async fn admit_request<L: Limiter>(State(state): State<AppState<L>>, request: Request) -> Response {
    let Some(client_id) = client_id(&request, &state.client_header) else {
        warn!(header = %state.client_header, "Request without client identifier");
        return (StatusCode::BAD_REQUEST, "missing client identifier").into_response();
    };

    match state.limiter.admit(&client_id) {
        Ok(()) => {
            trace!(client = %client_id, "Request admitted");
            (StatusCode::OK, "ok").into_response()
        }
        Err(rejection) => {
            debug!(client = %client_id, "Request rate limited");
            rejection.into_response()
        }
    }
}

async fn blacklist_status<L: Limiter>(
    State(state): State<AppState<L>>,
    Path(client_id): Path<String>,
) -> Json<BlacklistStatus> {
    let since = state.limiter.blacklisted(&client_id);

    Json(BlacklistStatus {
        blacklisted: since.is_some(),
        blacklisted_since: since.map(wall_clock),
        client_id,
    })
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

/// The client identifier for a request.
///
/// Uses the first entry of the configured header, falling back to the peer
/// address of the connection.
fn client_id(request: &Request, header: &HeaderName) -> Option<String> {
    let forwarded = request
        .headers()
        .get(header)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(id) = forwarded {
        return Some(id.to_owned());
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Translate a monotonic instant into an RFC 3339 wall-clock timestamp.
fn wall_clock(at: Instant) -> String {
    let ago = chrono::Duration::from_std(at.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
    (Utc::now() - ago).to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{LimiterSettings, RateLimiter, ShardedRateLimiter};
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_router<L: Limiter + 'static>(limiter: Arc<L>) -> Router {
        router(limiter, HeaderName::from_static("x-forwarded-for"))
    }

    fn forwarded_request(uri: &str, client: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .uri(uri)
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn small_limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(LimiterSettings::new(
            2,
            Duration::from_secs(60),
            Duration::from_secs(60),
        )))
    }

    #[tokio::test]
    async fn test_admitted_request_returns_ok() {
        let app = test_router(small_limiter());

        let response = app.oneshot(forwarded_request("/", "10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");
    }

    #[tokio::test]
    async fn test_over_budget_returns_too_many_requests() {
        let limiter = small_limiter();
        let app = test_router(Arc::clone(&limiter));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(forwarded_request("/any/path", "10.0.0.1"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(forwarded_request("/any/path", "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_string(response).await, "rate limited");
        assert!(limiter.is_blacklisted("10.0.0.1"));

        let response = app
            .oneshot(forwarded_request("/", "10.0.0.2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_first_forwarded_entry_is_the_client() {
        let limiter = small_limiter();
        let app = test_router(Arc::clone(&limiter));

        let response = app
            .oneshot(forwarded_request("/", " 192.0.2.7 , 10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(limiter.in_window_count("192.0.2.7"), 1);
        assert_eq!(limiter.in_window_count("10.0.0.1"), 0);
    }

    #[tokio::test]
    async fn test_peer_address_fallback() {
        let limiter = small_limiter();
        let app = test_router(Arc::clone(&limiter));

        let mut request = HttpRequest::builder().uri("/").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(limiter.in_window_count("127.0.0.1"), 1);
    }

    #[tokio::test]
    async fn test_missing_client_identifier_rejected() {
        let app = test_router(small_limiter());

        let request = HttpRequest::builder()
            .uri("/")
            .header("x-forwarded-for", "  ")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_blacklist_route_reports_status() {
        let limiter = Arc::new(ShardedRateLimiter::new(LimiterSettings::new(
            1,
            Duration::from_secs(60),
            Duration::from_secs(60),
        )));
        let app = test_router(Arc::clone(&limiter));

        let response = app
            .clone()
            .oneshot(forwarded_request("/blacklist/10.0.0.1", "admin"))
            .await
            .unwrap();
        let status: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(status["blacklisted"], false);
        assert!(status["blacklisted_since"].is_null());

        limiter.admit("10.0.0.1").unwrap();
        assert!(limiter.admit("10.0.0.1").is_err());

        let response = app
            .oneshot(forwarded_request("/blacklist/10.0.0.1", "admin"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(status["client_id"], "10.0.0.1");
        assert_eq!(status["blacklisted"], true);
        assert!(status["blacklisted_since"].is_string());

        // Introspection is not counted against anyone.
        assert_eq!(limiter.in_window_count("admin"), 0);
    }

    #[tokio::test]
    async fn test_health_is_not_rate_limited() {
        let limiter = small_limiter();
        let app = test_router(Arc::clone(&limiter));

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(forwarded_request("/health", "10.0.0.1"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }
}
