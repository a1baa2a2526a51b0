//! Route handlers.

use crate::error::PressError;
use crate::pipeline::cover::CoverSheet;
use crate::pipeline::input;
use crate::process::{Outcome, Submission};
use crate::server::error::{ApiError, Envelope};
use crate::server::AppState;
use axum::{
    body::Body,
    extract::{
        multipart::MultipartError, rejection::BytesRejection, Multipart, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

/// The multipart field that carries the document.
pub const FILE_FIELD: &str = "pdf";

/// Name sent to the remote service for proxied uploads.
const PROXY_FILENAME: &str = "document.pdf";

type ApiResult<T> = Result<T, ApiError>;

// ── POST /compress ───────────────────────────────────────────────────────

/// The decoded multipart form.
#[derive(Debug, Default)]
struct UploadForm {
    document: Option<Bytes>,
    filename: Option<String>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Read every field, enforcing `limit` on the file while it streams in.
    async fn read(multipart: &mut Multipart, limit: usize) -> Result<Self, PressError> {
        let mut form = UploadForm::default();
        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, limit))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name != FILE_FIELD {
                let value = field.text().await.map_err(|e| multipart_error(e, limit))?;
                form.fields.insert(name, value.trim().to_string());
                continue;
            }

            if form.document.is_some() {
                return Err(PressError::DuplicateUpload { field: name });
            }
            form.filename = field.file_name().map(str::to_owned);

            let mut buf = BytesMut::new();
            while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limit))? {
                input::check_size(buf.len() + chunk.len(), limit)?;
                buf.extend_from_slice(&chunk);
            }
            form.document = Some(buf.freeze());
        }
        Ok(form)
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn into_submission(self) -> Result<Submission, PressError> {
        let cover = self.cover_sheet()?;
        let preset = self.text("preset").map(str::parse).transpose()?;
        let document = self.document.ok_or_else(|| PressError::MissingUpload {
            field: FILE_FIELD.to_string(),
        })?;
        Ok(Submission {
            document,
            filename: self.filename,
            cover,
            preset,
        })
    }

    /// A cover is requested when any of `session`, `name` or `student_id`
    /// is present; all three are then required.
    fn cover_sheet(&self) -> Result<Option<CoverSheet>, PressError> {
        let (session, name, student_id) =
            (self.text("session"), self.text("name"), self.text("student_id"));
        if session.is_none() && name.is_none() && student_id.is_none() {
            return Ok(None);
        }

        let required = |key: &str, value: Option<&str>| {
            value.map(str::to_owned).ok_or_else(|| PressError::InvalidField {
                field: key.to_string(),
                reason: "required when a cover page is requested".into(),
            })
        };
        let session_text = required("session", session)?;
        let session = session_text
            .parse::<u32>()
            .map_err(|_| PressError::InvalidField {
                field: "session".into(),
                reason: format!("'{session_text}' is not a session number"),
            })?;

        let mut sheet = CoverSheet::new(
            session,
            required("name", name)?,
            required("student_id", student_id)?,
        );
        sheet.class_name = self.text("class_name").map(str::to_owned);
        sheet.course = self.text("course").map(str::to_owned);
        sheet.lecturer = self.text("lecturer").map(str::to_owned);
        Ok(Some(sheet))
    }
}

fn multipart_error(e: MultipartError, limit: usize) -> PressError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PressError::PayloadTooLarge { limit }
    } else {
        PressError::InvalidField {
            field: "multipart".into(),
            reason: e.body_text(),
        }
    }
}

fn body_error(e: BytesRejection, limit: usize) -> PressError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PressError::PayloadTooLarge { limit }
    } else {
        PressError::InvalidField {
            field: "body".into(),
            reason: e.body_text(),
        }
    }
}

/// Upload, assemble and compress one document.
pub async fn compress(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let limit = state.pipeline.config().max_upload_bytes;
    let form = UploadForm::read(&mut multipart, limit).await?;
    let submission = form.into_submission()?;
    debug!(
        "Upload accepted: {} bytes, cover: {}",
        submission.document.len(),
        submission.cover.is_some()
    );

    let response = match state.pipeline.submit(submission).await? {
        Outcome::Download { filename, bytes } => pdf_response(bytes, Some(&filename))?,
        Outcome::Compressed { filename, size } => Json(Envelope::message(format!(
            "{filename} compressed to {size} bytes"
        )))
        .into_response(),
        Outcome::Uploaded(file) => Json(Envelope::uploaded(file)).into_response(),
        Outcome::Queued => (
            StatusCode::ACCEPTED,
            Json(Envelope::message(
                "File received; compression continues in the background",
            )),
        )
            .into_response(),
    };
    Ok(response)
}

// ── POST /proxy/compress ─────────────────────────────────────────────────

/// Compress a raw PDF body through the remote service.
pub async fn proxy(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Response> {
    let limit = state.pipeline.config().max_upload_bytes;
    let body = body.map_err(|e| body_error(e, limit))?;
    let remote = state.remote.as_ref().ok_or_else(|| PressError::ToolUnavailable {
        tool: "remote compression".into(),
        detail: "no API key configured. Set ILOVEPDF_PUBLIC_KEY.".into(),
    })?;
    input::check_size(body.len(), limit)?;
    input::validate_pdf(&body)?;

    let compressed = remote.compress(body, PROXY_FILENAME).await?;
    Ok(pdf_response(compressed, None)?)
}

// ── OAuth ────────────────────────────────────────────────────────────────

/// Redirect to the consent screen.
pub async fn auth(State(state): State<AppState>) -> ApiResult<Response> {
    let authorizer = state.authorizer.as_ref().ok_or_else(oauth_not_configured)?;
    let url = authorizer.authorize_url()?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

/// Exchange the authorization code and store the token.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> ApiResult<Json<Envelope>> {
    if let Some(error) = params.error {
        return Err(PressError::InvalidField {
            field: "error".into(),
            reason: format!("authorization was denied: {error}"),
        }
        .into());
    }
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| PressError::InvalidField {
            field: "code".into(),
            reason: "missing authorization code".into(),
        })?;

    let authorizer = state.authorizer.as_ref().ok_or_else(oauth_not_configured)?;
    authorizer.complete(&code).await?;
    Ok(Json(Envelope::message(
        "Authorization complete; uploads to cloud storage are enabled",
    )))
}

fn oauth_not_configured() -> PressError {
    PressError::InvalidConfig("OAuth client is not configured".into())
}

// ── GET /health ──────────────────────────────────────────────────────────

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.pipeline.config();
    Json(json!({
        "status": "ok",
        "delivery": config.delivery.as_str(),
        "backend": config.backend.as_str(),
        "compressor": state.pipeline.compressor().name(),
        "driveUpload": config.upload_to_drive,
    }))
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn pdf_response(bytes: Bytes, filename: Option<&str>) -> Result<Response, PressError> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_LENGTH, bytes.len());
    if let Some(name) = filename {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        );
    }
    builder
        .body(Body::from(bytes))
        .map_err(|e| PressError::Internal(format!("cannot build response: {e}")))
}
