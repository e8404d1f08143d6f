//! Request pipeline shared by every route of the `SheetSync` server.
//!
//! The browser dashboard calls the API cross-origin with a bearer token and
//! JSON bodies, so CORS is the part of this stack that varies with
//! deployment. Everything else (request ids, tracing, gzip, timeout) is
//! fixed. Layers are listed outermost first.

use axum::extract::{Request, State};
use axum::http::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sheetsync_core::messages::ApiResponse;
use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;
use super::handlers::AppState;

/// Header carrying the per-request id, echoed on every response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

type HttpLayers = Stack<
    PropagateRequestIdLayer,
    Stack<
        TimeoutLayer,
        Stack<
            CorsLayer,
            Stack<
                CompressionLayer,
                Stack<
                    TraceLayer<SharedClassifier<ServerErrorsAsFailures>>,
                    Stack<SetRequestIdLayer<MakeRequestUuid>, Identity>,
                >,
            >,
        >,
    >,
>;

/// Transport layers for the API router.
///
/// The request id is assigned before tracing so every span carries it. A
/// request running past `config.request_timeout` is answered with 408,
/// which also bounds how long a slow upstream spreadsheet call can hold a
/// connection.
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&config.cors_origins))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(request_id))
        .into_inner()
}

/// CORS for the dashboard: `GET`/`POST` with `Authorization` and
/// `Content-Type`, exposing the request id to scripts.
///
/// `"*"` admits any origin. Other entries that are not valid header values
/// are skipped, so a typo only locks that origin out.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| o.parse().ok()))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}

/// Counts every request as in flight for the shutdown drain, and refuses
/// API requests once draining has begun. Probes under `/health` are always
/// answered.
pub async fn track_in_flight(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.shutdown.health_state().accepts_requests() && !request.uri().path().starts_with("/health") {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::<()>::failure("server is shutting down")),
        )
            .into_response();
    }
    let _guard = state.shutdown.in_flight_guard();
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::header::{
        ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS,
        ACCESS_CONTROL_REQUEST_METHOD, ORIGIN,
    };
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;

    fn router(origins: &[&str]) -> Router {
        let config = NetworkConfig {
            cors_origins: origins.iter().map(ToString::to_string).collect(),
            request_timeout: Duration::from_secs(5),
            ..NetworkConfig::default()
        };
        Router::new()
            .route("/api/v1/sheets/metadata", post(|| async { "ok" }))
            .layer(build_http_layers(&config))
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v1/sheets/metadata")
            .header(ORIGIN, origin)
            .header(ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(ACCESS_CONTROL_REQUEST_HEADERS, "authorization,content-type")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn listed_origin_may_send_bearer_json_requests() {
        let resp = router(&["http://localhost:3000", "not a header\u{7f}"])
            .oneshot(preflight("http://localhost:3000"))
            .await
            .unwrap();

        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
        let allowed = resp.headers()[ACCESS_CONTROL_ALLOW_HEADERS].to_str().unwrap();
        assert!(allowed.contains("authorization"));
        assert!(allowed.contains("content-type"));
    }

    #[tokio::test]
    async fn unlisted_origin_gets_no_cors_grant() {
        let resp = router(&["http://localhost:3000"])
            .oneshot(preflight("https://elsewhere.example"))
            .await
            .unwrap();

        assert!(!resp.headers().contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn wildcard_admits_any_origin_and_ids_every_response() {
        let resp = router(&["*"])
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/sheets/metadata")
                    .header(ORIGIN, "https://dash.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(resp.headers().contains_key(REQUEST_ID_HEADER));
    }
}
