use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use conflux_core::error::OrchestratorError;
use serde::Serialize;

#[derive(Debug)]
pub struct ApiError(pub OrchestratorError);

#[derive(Serialize)]
struct ErrorBody {
    code: u32,
    message: String,
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OrchestratorError::RoomNotFound(_)
            | OrchestratorError::UserNotFound(_)
            | OrchestratorError::MediaNotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::MediaInvalidType(_) | OrchestratorError::MediaInvalidOperation(_) => {
                StatusCode::BAD_REQUEST
            }
            OrchestratorError::MediaNoAvailableCodec(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OrchestratorError::MediaServerRequestTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            OrchestratorError::MediaServerGenericError(_) | OrchestratorError::ConnectionError(_) => {
                StatusCode::BAD_GATEWAY
            }
        };

        let body = ErrorBody {
            code: self.0.code(),
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
