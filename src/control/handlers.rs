use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ControlState;
use crate::health::HealthReport;
use crate::kernel::{KernelState, CONTROL_CALLER};
use crate::msgcore::{DispatchOutcome, Message, MessageType, MSG_MANAGER};
use crate::types::Error;

/// Kernel error rendered as `{"error": {"code", "message", ...}}`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            Error::AccessDenied { .. } => StatusCode::FORBIDDEN,
            Error::Validation(_) | Error::Routing(_) | Error::Serialization(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Registration(_) => StatusCode::CONFLICT,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Transport(_) => StatusCode::BAD_GATEWAY,
            Error::Lifecycle { .. } | Error::Internal(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "code": self.0.code(),
            "message": self.0.to_string(),
        });
        if let Error::Lifecycle { phase, failures } = &self.0 {
            body["phase"] = json!(phase);
            body["failures"] = json!(failures);
        }
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "control_request_failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self.0, "control_request_rejected");
        }
        (status, Json(json!({ "error": body }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub name: String,
    pub state: KernelState,
    pub running: bool,
    pub services: Vec<String>,
}

fn status_of(state: &ControlState) -> StatusResponse {
    StatusResponse {
        name: state.kernel.name().to_string(),
        state: state.kernel.state(),
        running: state.kernel.is_running(),
        services: state.kernel.service_names(),
    }
}

pub(super) async fn start_kernel(
    State(state): State<ControlState>,
) -> ApiResult<Json<StatusResponse>> {
    state.kernel.start().await?;
    Ok(Json(status_of(&state)))
}

pub(super) async fn stop_kernel(
    State(state): State<ControlState>,
) -> ApiResult<Json<StatusResponse>> {
    state.kernel.close().await?;
    Ok(Json(status_of(&state)))
}

pub(super) async fn start_service(
    State(state): State<ControlState>,
    Path(service): Path<String>,
) -> ApiResult<Json<Value>> {
    state.kernel.start_service(&service).await?;
    Ok(Json(json!({ "service": service, "status": "started" })))
}

pub(super) async fn stop_service(
    State(state): State<ControlState>,
    Path(service): Path<String>,
) -> ApiResult<Json<Value>> {
    state.kernel.close_service(&service).await?;
    Ok(Json(json!({ "service": service, "status": "stopped" })))
}

pub(super) async fn status(State(state): State<ControlState>) -> Json<StatusResponse> {
    Json(status_of(&state))
}

/// 200 when the aggregate is OK, 503 otherwise; the report is the body either way.
pub(super) async fn health(State(state): State<ControlState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.kernel.get_health();
    let code = if report.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

pub(super) async fn service_stats(
    State(state): State<ControlState>,
    Path(service): Path<String>,
) -> ApiResult<Json<Value>> {
    Ok(Json(state.kernel.service_stats(&service)?))
}

pub(super) async fn recent_messages(
    State(state): State<ControlState>,
) -> ApiResult<Json<Vec<Message>>> {
    state.kernel.get_service(MSG_MANAGER, CONTROL_CALLER)?;
    Ok(Json(state.dispatcher.recent_messages()))
}

pub(super) async fn handlers(
    State(state): State<ControlState>,
) -> ApiResult<Json<Vec<MessageType>>> {
    state.kernel.get_service(MSG_MANAGER, CONTROL_CALLER)?;
    Ok(Json(state.dispatcher.handler_types()))
}

/// Body of `POST /messages`.
#[derive(Debug, Deserialize)]
pub(super) struct PostMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

pub(super) async fn post_message(
    State(state): State<ControlState>,
    Json(body): Json<PostMessage>,
) -> ApiResult<(StatusCode, Json<DispatchOutcome>)> {
    state.kernel.get_service(MSG_MANAGER, CONTROL_CALLER)?;
    let outcome = state.dispatcher.handle_tagged(&body.kind, body.payload);
    let code = match outcome {
        DispatchOutcome::Handled => StatusCode::ACCEPTED,
        DispatchOutcome::Dropped { .. } | DispatchOutcome::NoHandler => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    };
    Ok((code, Json(outcome)))
}
