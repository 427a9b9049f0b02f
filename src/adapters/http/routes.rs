//! Top-level HTTP router: banner, health check and the chat endpoint.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use http::HeaderValue;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::adapters::websocket::{gateway_router, GatewayState, SessionRegistry};
use crate::domain::foundation::Timestamp;

/// Text served at `GET /`.
pub const BANNER: &str = "Otterly MCP Host v0.1.0";

/// State for the health endpoint.
#[derive(Clone)]
pub struct HealthState {
    registry: Arc<SessionRegistry>,
    started_at: Timestamp,
}

impl HealthState {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            started_at: Timestamp::now(),
        }
    }
}

/// Body returned by `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_sessions: usize,
    pub uptime_secs: u64,
}

async fn banner() -> &'static str {
    BANNER
}

async fn health(State(state): State<HealthState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.registry.count().await,
        uptime_secs: state.started_at.elapsed_secs(),
    })
}

/// Builds a CORS layer; an empty origin list allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(allowed)
    }
}

/// Create the full application router.
///
/// # Routes
///
/// - `GET /` - Banner
/// - `GET /health` - Liveness and session count
/// - `GET /chat?apiKey=...` - WebSocket chat endpoint
pub fn app_router(gateway: GatewayState, cors_origins: &[String]) -> Router {
    let health_state = HealthState::new(gateway.registry.clone());

    Router::new()
        .route("/", get(banner))
        .route("/health", get(health).with_state(health_state))
        .merge(gateway_router(gateway))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockDialogueClient;
    use crate::adapters::websocket::ConnectionLimits;
    use crate::domain::gateway::CredentialValidator;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use secrecy::Secret;
    use tower::ServiceExt;

    fn test_router(origins: &[String]) -> Router {
        let state = GatewayState::new(
            Arc::new(MockDialogueClient::new()),
            CredentialValidator::new(Secret::new("secret".to_string())),
            ConnectionLimits::default(),
        );
        app_router(state, origins)
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn root_serves_banner() {
        let response = test_router(&[])
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, BANNER);
    }

    #[tokio::test]
    async fn health_reports_sessions() {
        let response = test_router(&[])
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["active_sessions"], 0);
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn chat_without_upgrade_is_rejected() {
        let response = test_router(&[])
            .oneshot(
                Request::builder()
                    .uri("/chat?apiKey=secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn cors_allows_any_origin_by_default() {
        let response = test_router(&[])
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Origin", "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn cors_restricts_to_configured_origins() {
        let origins = vec!["http://allowed.dev".to_string()];
        let response = test_router(&origins)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Origin", "http://allowed.dev")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://allowed.dev"
        );
    }
}
