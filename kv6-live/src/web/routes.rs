//! HTTP route handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use futures::{Stream, StreamExt};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::domain::OperatorCode;
use crate::pipeline::StatusReport;
use crate::store::{VehicleFilter, VehicleState};

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/vehicles", get(list_vehicles))
        .route("/api/vehicles/:vehicle", get(get_vehicle))
        .route("/api/status", get(status))
        .route("/api/stream", get(stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Current vehicles, optionally filtered by line and operator.
async fn list_vehicles(
    State(state): State<AppState>,
    Query(query): Query<VehicleQuery>,
) -> Result<Json<VehicleListResponse>, AppError> {
    let operator = query
        .operator
        .as_deref()
        .map(parse_operator)
        .transpose()?;

    let filter = VehicleFilter {
        line: query.line,
        operator,
        limit: query.limit,
    };
    let vehicles = state.pipeline.store().list_filtered(&filter);

    Ok(Json(VehicleListResponse {
        count: vehicles.len(),
        vehicles,
    }))
}

/// Accept either a code or a friendly name.
fn parse_operator(raw: &str) -> Result<OperatorCode, AppError> {
    OperatorCode::from_name(raw)
        .or_else(|| OperatorCode::parse_normalized(raw).ok())
        .ok_or_else(|| AppError::BadRequest {
            message: format!("Invalid operator: {raw}"),
        })
}

async fn get_vehicle(
    State(state): State<AppState>,
    Path(vehicle): Path<String>,
) -> Result<Json<VehicleState>, AppError> {
    state
        .pipeline
        .store()
        .get(&vehicle)
        .map(Json)
        .ok_or_else(|| AppError::NotFound {
            message: format!("Unknown vehicle: {vehicle}"),
        })
}

async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.pipeline.status_report())
}

/// Server-sent events: `connected`, `initial_data`, then live
/// `vehicle_update` and `status_update` events.
async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, serde_json::Error>>> {
    let subscription = state.pipeline.attach_stream();
    debug!(subscription = ?subscription.id(), "stream client attached");

    let events = subscription
        .map(|item| item.to_json().map(|body| Event::default().event(item.kind()).data(body)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest { message: String },
    NotFound { message: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest { message } => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound { message } => (StatusCode::NOT_FOUND, message),
        };

        warn!(%status, %message, "request failed");

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, header};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::domain::{EventType, Topic, VehicleEvent};
    use crate::feed::FeedConfig;
    use crate::feed::mock::MockTransport;
    use crate::hub::HubEvent;
    use crate::pipeline::{Pipeline, PipelineConfig};

    fn pipeline() -> Pipeline<MockTransport> {
        let config = PipelineConfig::new(FeedConfig::new(
            Topic::parse("/ARR/KV6posinfo").unwrap(),
        ));
        let pipeline = Pipeline::new(MockTransport::default(), config);

        for (vehicle, operator, line) in [
            ("4021", "ARR", "M300"),
            ("4022", "ARR", "401"),
            ("7001", "QBUZZ", "M300"),
        ] {
            let mut event = VehicleEvent::new(
                OperatorCode::parse(operator).unwrap(),
                EventType::Onroute,
                vehicle,
                Utc::now(),
            );
            event.line_number = line.into();
            pipeline.hub().publish(HubEvent::Vehicle(Arc::new(event)));
        }
        pipeline
    }

    fn app(pipeline: &Pipeline<MockTransport>) -> Router {
        create_router(AppState::new(pipeline.handle()))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_is_ok() {
        let pipeline = pipeline();
        let response = app(&pipeline)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn lists_all_vehicles() {
        let pipeline = pipeline();
        let (status, json) = get_json(app(&pipeline), "/api/vehicles").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 3);
        assert_eq!(json["vehicles"][0]["vehicleNumber"], "4021");
        assert_eq!(json["vehicles"][2]["operator"], "QBUZZ");
    }

    #[tokio::test]
    async fn filters_by_line_operator_and_limit() {
        let pipeline = pipeline();

        let (_, json) = get_json(app(&pipeline), "/api/vehicles?line=M300").await;
        assert_eq!(json["count"], 2);

        let (_, json) = get_json(app(&pipeline), "/api/vehicles?line=M300&operator=qbuzz").await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["vehicles"][0]["vehicleNumber"], "7001");

        let (_, json) = get_json(app(&pipeline), "/api/vehicles?operator=ARR&limit=1").await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["vehicles"][0]["vehicleNumber"], "4021");
    }

    #[tokio::test]
    async fn bad_operator_is_rejected() {
        let pipeline = pipeline();
        let (status, json) = get_json(app(&pipeline), "/api/vehicles?operator=not%20valid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid operator: not valid");
    }

    #[tokio::test]
    async fn single_vehicle() {
        let pipeline = pipeline();
        let (status, json) = get_json(app(&pipeline), "/api/vehicles/4022").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["lineNumber"], "401");

        let (status, json) = get_json(app(&pipeline), "/api/vehicles/9999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Unknown vehicle: 9999");
    }

    #[tokio::test]
    async fn status_report() {
        let pipeline = pipeline();
        let (status, json) = get_json(app(&pipeline), "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["topic"], "/ARR/KV6posinfo");
        assert_eq!(json["vehicles"]["total"], 3);
        assert_eq!(json["vehicles"]["active"], 3);
        assert_eq!(json["vehicles"]["byStatus"]["ONROUTE"], 3);
        assert_eq!(json["connection"]["state"], "stopped");
    }

    #[tokio::test]
    async fn stream_opens_with_snapshot() {
        let pipeline = pipeline();
        let response = app(&pipeline)
            .oneshot(Request::builder().uri("/api/stream").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        let mut body = response.into_body();
        let mut text = String::new();
        while !text.contains("event: initial_data") {
            let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
                .await
                .expect("timed out reading stream")
                .expect("stream ended")
                .unwrap();
            if let Ok(data) = frame.into_data() {
                text.push_str(&String::from_utf8_lossy(&data));
            }
        }

        let connected = text.find("event: connected").unwrap();
        let initial = text.find("event: initial_data").unwrap();
        assert!(connected < initial);
        assert!(text.contains("\"count\":3"));
    }
}
