//! JSON envelope and the `PressError` → HTTP response mapping.

use crate::drive::DriveFile;
use crate::error::PressError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Body of every JSON response. Absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_content_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Envelope {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn uploaded(file: DriveFile) -> Self {
        Self {
            success: true,
            id: Some(file.id),
            web_view_link: file.web_view_link,
            web_content_link: file.web_content_link,
            ..Self::default()
        }
    }

    pub fn failure(err: &PressError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            kind: Some(err.kind().to_string()),
            ..Self::default()
        }
    }
}

/// HTTP status for an error.
pub fn status_for(err: &PressError) -> StatusCode {
    match err {
        PressError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        PressError::ToolUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        PressError::NotAuthorized => StatusCode::UNAUTHORIZED,
        PressError::UploadFailed { .. } | PressError::RemoteServiceError { .. } => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Handler error: renders a [`PressError`] as a failure [`Envelope`].
#[derive(Debug)]
pub struct ApiError(pub PressError);

impl From<PressError> for ApiError {
    fn from(err: PressError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(kind = self.0.kind(), "{}", self.0);
        } else {
            debug!(kind = self.0.kind(), "{}", self.0);
        }
        (status, Json(Envelope::failure(&self.0))).into_response()
    }
}
