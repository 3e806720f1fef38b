//! HTTP interface to the dispatcher.
//!
//! Routes:
//! - `POST /api/send-bulk-email`: dispatch one message to a list of recipients
//! - `GET /health`: liveness plus dispatcher statistics
//! - `GET /metrics`: Prometheus text format (with the `metrics` feature)

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::request::{DispatchRequest, MISSING_FIELDS};

/// Shared state for request handlers.
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub started_at: DateTime<Utc>,
    #[cfg(feature = "metrics")]
    pub metrics: Option<crate::metrics::DispatchMetrics>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            started_at: Utc::now(),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }
}

/// An API error with HTTP status code and message.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status code.
    pub status: StatusCode,
    /// Short error summary, returned as `error`.
    pub error: String,
    /// Optional detail, returned as `message`.
    pub message: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Malformed request: 400 with the fixed "Missing required fields" error.
    pub fn missing_fields() -> Self {
        Self::new(StatusCode::BAD_REQUEST, MISSING_FIELDS)
    }

    /// Dispatch could not run: 500 with the underlying detail.
    pub fn send_failed(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send emails").with_message(detail)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status.as_u16(), self.error)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.message {
            Some(message) => json!({ "error": self.error, "message": message }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}

impl IntoResponse for DispatchOutcome {
    fn into_response(self) -> Response {
        match self {
            DispatchOutcome::FullSuccess { sent } => (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": format!("Successfully sent {} emails", sent),
                })),
            )
                .into_response(),
            DispatchOutcome::PartialSuccess {
                sent,
                total,
                failed,
            } => multi_status(sent, total, failed),
            // All-failed dispatches are reported like partial ones
            DispatchOutcome::TotalFailure { total, failed } => {
                multi_status(total - failed, total, failed)
            }
            DispatchOutcome::ValidationFailure { .. } => ApiError::missing_fields().into_response(),
            DispatchOutcome::TransportConstructionFailure { message }
            | DispatchOutcome::UnexpectedFailure { message } => {
                ApiError::send_failed(message).into_response()
            }
        }
    }
}

fn multi_status(sent: usize, total: usize, failed: usize) -> Response {
    (
        StatusCode::MULTI_STATUS,
        Json(json!({
            "message": format!("{} of {} emails sent successfully", sent, total),
            "failures": failed,
        })),
    )
        .into_response()
}

/// CORS policy: any origin, the usual methods, JSON and auth headers.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build the Axum router with all routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route("/api/send-bulk-email", post(send_bulk_email))
        .route("/health", get(health));

    #[cfg(feature = "metrics")]
    let router = router.route("/metrics", get(prometheus_metrics));

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

async fn send_bulk_email(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DispatchRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected dispatch body");
            return ApiError::missing_fields().into_response();
        }
    };

    tracing::info!(
        recipients = request.recipients.as_ref().map_or(0, Vec::len),
        "Received bulk email request"
    );

    state.dispatcher.handle(request).await.into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "started_at": state.started_at,
        "uptime_seconds": (Utc::now() - state.started_at).num_seconds(),
        "stats": state.dispatcher.stats(),
    }))
}

#[cfg(feature = "metrics")]
async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(metrics) = &state.metrics else {
        return ApiError::new(StatusCode::NOT_FOUND, "metrics are not enabled").into_response();
    };
    match metrics.render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unexpected_failure_is_server_error() {
        let response = DispatchOutcome::UnexpectedFailure {
            message: "worker pool closed".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Failed to send emails");
        assert_eq!(body["message"], "worker pool closed");
        assert!(body.get("failures").is_none());
    }

    #[tokio::test]
    async fn test_partial_success_body() {
        let response = DispatchOutcome::PartialSuccess {
            sent: 9,
            total: 10,
            failed: 1,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::MULTI_STATUS);
        let body = body_json(response).await;
        assert_eq!(
            body,
            json!({ "message": "9 of 10 emails sent successfully", "failures": 1 })
        );
    }
}
