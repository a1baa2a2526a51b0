//! Error types for the pdfpress library.
//!
//! Every fallible operation returns [`PressError`]. The variants follow the
//! failure classes an operator needs to tell apart:
//!
//! * **Client input**: the upload is missing, oversized, or not a PDF.
//!   Nothing was written to disk.
//! * **Environment**: the compressor binary is not installed
//!   ([`PressError::ToolUnavailable`]). This is kept distinct from
//!   [`PressError::CompressionFailed`] so "broken input" and
//!   "broken host" never look alike in logs or responses.
//! * **Collaborators**: Google Drive ([`PressError::UploadFailed`]) and the
//!   remote compression service ([`PressError::RemoteServiceError`]).
//! * **Internal**: workspace, queue, and credential-store I/O.
//!
//! None of these are retried by the library.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Step of the remote compression protocol that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStep {
    Auth,
    Start,
    Upload,
    Process,
    Download,
}

impl RemoteStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteStep::Auth => "auth",
            RemoteStep::Start => "start",
            RemoteStep::Upload => "upload",
            RemoteStep::Process => "process",
            RemoteStep::Download => "download",
        }
    }
}

impl fmt::Display for RemoteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors returned by the pdfpress library.
#[derive(Debug, Error)]
pub enum PressError {
    // ── Client input ──────────────────────────────────────────────────────
    /// The multipart form carried no `pdf` file field.
    #[error("No PDF uploaded: expected a file in form field '{field}'")]
    MissingUpload { field: String },

    /// More than one file field was sent.
    #[error("Exactly one file is accepted; got a second '{field}' field")]
    DuplicateUpload { field: String },

    /// A raw-body endpoint received zero bytes.
    #[error("No PDF data received")]
    EmptyBody,

    /// The upload exceeded the configured size limit.
    #[error("Upload exceeds the {limit}-byte limit")]
    PayloadTooLarge { limit: usize },

    /// The bytes do not start with the `%PDF` magic.
    #[error("Upload is not a PDF (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    /// A form field had an unusable value.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    // ── PDF ───────────────────────────────────────────────────────────────
    /// lopdf could not parse or write a document.
    #[error("PDF could not be processed: {detail}")]
    CorruptPdf { detail: String },

    // ── Compressor ────────────────────────────────────────────────────────
    /// The external compressor could not be started at all. `detail`
    /// carries the remediation hint for the tool in question.
    #[error("Compression tool '{tool}' is unavailable: {detail}")]
    ToolUnavailable { tool: String, detail: String },

    /// The external compressor ran and failed.
    #[error("Compression failed (exit code {}): {stderr}", exit_code_label(.code))]
    CompressionFailed { code: Option<i32>, stderr: String },

    // ── Cloud storage ─────────────────────────────────────────────────────
    /// No OAuth token has been stored yet.
    #[error("Cloud storage is not authorized; visit /auth first")]
    NotAuthorized,

    /// Drive (or the token endpoint) rejected the request.
    #[error("Upload to cloud storage failed: {detail}")]
    UploadFailed { detail: String },

    // ── Remote compression service ────────────────────────────────────────
    /// One step of the remote protocol failed.
    #[error("Remote compression failed at step '{step}': {detail}")]
    RemoteServiceError { step: RemoteStep, detail: String },

    // ── Internal ──────────────────────────────────────────────────────────
    /// Scratch-directory I/O failed.
    #[error("Workspace error at '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The job spool could not be read or written.
    #[error("Queue error: {0}")]
    Queue(String),

    /// The credential store could not be read or written.
    #[error("Credential store error: {0}")]
    Credentials(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_code_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

impl PressError {
    /// Stable machine-readable tag, surfaced as `kind` in JSON envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            PressError::MissingUpload { .. }
            | PressError::DuplicateUpload { .. }
            | PressError::EmptyBody
            | PressError::NotAPdf { .. }
            | PressError::InvalidField { .. } => "client_input",
            PressError::PayloadTooLarge { .. } => "payload_too_large",
            PressError::CorruptPdf { .. } => "corrupt_pdf",
            PressError::ToolUnavailable { .. } => "tool_unavailable",
            PressError::CompressionFailed { .. } => "compression_failed",
            PressError::NotAuthorized => "not_authorized",
            PressError::UploadFailed { .. } => "upload_failed",
            PressError::RemoteServiceError { .. } => "remote_service_error",
            PressError::Workspace { .. } => "workspace",
            PressError::Queue(_) => "queue",
            PressError::Credentials(_) => "credentials",
            PressError::InvalidConfig(_) => "invalid_config",
            PressError::Internal(_) => "internal",
        }
    }

    /// True when the caller sent something unusable (4xx territory).
    pub fn is_client_error(&self) -> bool {
        matches!(self.kind(), "client_input" | "payload_too_large")
    }

    pub(crate) fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PressError::Workspace {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn remote(step: RemoteStep, detail: impl Into<String>) -> Self {
        PressError::RemoteServiceError {
            step,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_failed_display_with_code() {
        let e = PressError::CompressionFailed {
            code: Some(1),
            stderr: "Unrecoverable error".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("exit code 1"), "got: {msg}");
        assert!(msg.contains("Unrecoverable error"));
    }

    #[test]
    fn compression_failed_display_without_code() {
        let e = PressError::CompressionFailed {
            code: None,
            stderr: String::new(),
        };
        assert!(e.to_string().contains("exit code none"));
    }

    #[test]
    fn tool_unavailable_is_distinct_from_compression_failed() {
        let missing = PressError::ToolUnavailable {
            tool: "gs".into(),
            detail: "No such file or directory".into(),
        };
        let failed = PressError::CompressionFailed {
            code: Some(1),
            stderr: String::new(),
        };
        assert_ne!(missing.kind(), failed.kind());
        assert!(missing.to_string().contains("gs"));
    }

    #[test]
    fn remote_error_names_the_step() {
        let e = PressError::remote(RemoteStep::Upload, "413 too big");
        assert!(e.to_string().contains("'upload'"));
        assert!(e.to_string().contains("413 too big"));
    }

    #[test]
    fn client_errors_are_classified() {
        assert!(PressError::EmptyBody.is_client_error());
        assert!(PressError::PayloadTooLarge { limit: 10 }.is_client_error());
        assert!(!PressError::NotAuthorized.is_client_error());
        assert!(!PressError::Internal("x".into()).is_client_error());
    }
}
