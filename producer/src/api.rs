use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use worldinfo_commons::utils::TimeUtility;

use crate::error::ProduceError;
use crate::producer::{Route, RpcProducer};
use crate::trace::Tracer;

const WORLD_INFO_SEND_PATH: &str = "/api/v1/world-info/send";
const EXT_PROVIDER_SEND_PATH: &str = "/api/v1/ext-provider/send";
const HEALTH_PATH: &str = "/api/v1/health";

/// Shared state behind the trigger endpoints.
#[derive(Clone)]
pub struct ApiState {
    pub producer: Arc<RpcProducer>,
    pub tracer: Arc<dyn Tracer>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(WORLD_INFO_SEND_PATH, post(send_world_info))
        .route(EXT_PROVIDER_SEND_PATH, post(send_ext_provider))
        .route(HEALTH_PATH, get(health))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SendQuery {
    method: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendAck {
    success: bool,
    request_id: String,
    method: String,
    trace_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendFailure {
    success: bool,
    error: String,
    method: String,
}

async fn send_world_info(
    State(state): State<ApiState>,
    Query(query): Query<SendQuery>,
    body: Bytes,
) -> Response {
    send(state, Route::WorldInfo, WORLD_INFO_SEND_PATH, query.method, body).await
}

async fn send_ext_provider(
    State(state): State<ApiState>,
    Query(query): Query<SendQuery>,
    body: Bytes,
) -> Response {
    send(
        state,
        Route::ExtProvider,
        EXT_PROVIDER_SEND_PATH,
        query.method,
        body,
    )
    .await
}

/// Trigger boundary: defaults a missing params body to an empty mapping,
/// shapes the result, and never lets a failure escape as anything but a
/// structured error payload.
async fn send(
    state: ApiState,
    route: Route,
    path: &'static str,
    method: String,
    body: Bytes,
) -> Response {
    let destination = route.destination();
    let mut span = state
        .tracer
        .start_span(&format!("http.request.{}", destination.label));
    span.set_attribute("http.method", "POST");
    span.set_attribute("http.route", path);
    span.set_attribute("rpc.method", method.as_str());

    if method.trim().is_empty() {
        let err = ProduceError::Validation("method must not be blank".to_string());
        span.record_error(&err);
        span.end();
        return failure(StatusCode::BAD_REQUEST, &err, method);
    }

    let params = match parse_params(&body) {
        Ok(params) => params,
        Err(err) => {
            span.record_error(&err);
            span.end();
            return failure(StatusCode::BAD_REQUEST, &err, method);
        }
    };

    info!(
        "Received request to send {} method: {}",
        destination.label, method
    );
    let trace_id = span.context().trace_id.clone();

    match state.producer.publish(route, &method, params).await {
        Ok(request_id) => {
            span.set_ok();
            span.end();
            Json(SendAck {
                success: true,
                request_id,
                method,
                trace_id,
            })
            .into_response()
        }
        Err(err) => {
            span.record_error(&err);
            span.end();
            error!("Failed to send {} request: {}", destination.label, err);
            failure(StatusCode::INTERNAL_SERVER_ERROR, &err, method)
        }
    }
}

fn failure(status: StatusCode, err: &ProduceError, method: String) -> Response {
    let payload = SendFailure {
        success: false,
        error: err.to_string(),
        method,
    };
    (status, Json(payload)).into_response()
}

/// Missing body means an empty parameter mapping; anything present must be a
/// JSON object.
fn parse_params(body: &[u8]) -> Result<Map<String, Value>, ProduceError> {
    if body.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(_) => Err(ProduceError::Validation(
            "params must be a JSON object".to_string(),
        )),
        Err(err) => Err(ProduceError::Serialization(err)),
    }
}

#[derive(Debug, Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
    timestamp: u64,
}

async fn health() -> Json<HealthPayload> {
    Json(HealthPayload {
        status: "UP",
        service: "worldinfo-producer",
        timestamp: TimeUtility::get_timestamp_ms(),
    })
}
