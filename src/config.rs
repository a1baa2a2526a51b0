//! Configuration types for the submission pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The stage selection that used to be spread
//! over several near-identical servers (download vs. JSON response, queue vs.
//! inline compression, Drive upload on or off) is expressed here as plain
//! enums, so one binary covers every deployment.
//!
//! Collaborator settings live in their own structs ([`OAuthConfig`],
//! [`DriveConfig`], [`RemoteConfig`]) because they are optional: a server
//! without a Drive folder simply never builds a Drive client.
//!
//! Everything is read once at process start; there is no hot reload.

use crate::error::PressError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default upload limit: 50 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Configuration for the submission pipeline.
///
/// # Example
/// ```rust
/// use pdfpress::{Delivery, PipelineConfig, Preset};
///
/// let config = PipelineConfig::builder()
///     .workspace_root("/tmp/pdfpress")
///     .delivery(Delivery::Json)
///     .preset(Preset::Screen)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root under which every job gets its own scratch directory.
    pub workspace_root: PathBuf,

    /// Spool directory for queued jobs. Default: `<workspace_root>/.spool`.
    pub spool_dir: PathBuf,

    /// Maximum accepted upload in bytes. Default: 50 MiB.
    ///
    /// Checked while the body streams in, so an oversized upload is rejected
    /// without being buffered in full or touching the disk.
    pub max_upload_bytes: usize,

    /// How a finished job is handed back to the caller. Default: [`Delivery::Download`].
    pub delivery: Delivery,

    /// Which compressor runs the compress stage. Default: [`Backend::Ghostscript`].
    pub backend: Backend,

    /// Preset used when the request does not name one. Default: [`Preset::Ebook`].
    pub preset: Preset,

    /// Ghostscript executable name or path. Default: `gs`.
    pub gs_binary: String,

    /// Push the compressed file to Google Drive after compression. Default: false.
    pub upload_to_drive: bool,

    /// Values printed on cover pages when the request leaves them out.
    pub cover_defaults: CoverDefaults,

    /// How long an idle queue worker sleeps before re-scanning the spool. Default: 500.
    pub queue_poll_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let workspace_root = std::env::temp_dir().join("pdfpress");
        Self {
            spool_dir: workspace_root.join(".spool"),
            workspace_root,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            delivery: Delivery::default(),
            backend: Backend::default(),
            preset: Preset::default(),
            gs_binary: "gs".to_string(),
            upload_to_drive: false,
            cover_defaults: CoverDefaults::default(),
            queue_poll_ms: 500,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
            spool_dir_set: false,
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
    spool_dir_set: bool,
}

impl PipelineConfigBuilder {
    /// Set the scratch root. Also moves the default spool directory under it
    /// unless [`spool_dir`](Self::spool_dir) was set explicitly.
    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.workspace_root = root.into();
        if !self.spool_dir_set {
            self.config.spool_dir = self.config.workspace_root.join(".spool");
        }
        self
    }

    pub fn spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.spool_dir = dir.into();
        self.spool_dir_set = true;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    /// Convenience for the `PDFPRESS_MAX_UPLOAD_MB` setting.
    pub fn max_upload_mb(self, mb: usize) -> Self {
        self.max_upload_bytes(mb.saturating_mul(1024 * 1024))
    }

    pub fn delivery(mut self, delivery: Delivery) -> Self {
        self.config.delivery = delivery;
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn preset(mut self, preset: Preset) -> Self {
        self.config.preset = preset;
        self
    }

    pub fn gs_binary(mut self, bin: impl Into<String>) -> Self {
        self.config.gs_binary = bin.into();
        self
    }

    pub fn upload_to_drive(mut self, v: bool) -> Self {
        self.config.upload_to_drive = v;
        self
    }

    pub fn cover_defaults(mut self, defaults: CoverDefaults) -> Self {
        self.config.cover_defaults = defaults;
        self
    }

    pub fn queue_poll_ms(mut self, ms: u64) -> Self {
        self.config.queue_poll_ms = ms.max(10);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PressError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(PressError::InvalidConfig(
                "Upload limit must be at least 1 byte".into(),
            ));
        }
        if c.gs_binary.trim().is_empty() && c.backend == Backend::Ghostscript {
            return Err(PressError::InvalidConfig(
                "Ghostscript backend needs a binary name".into(),
            ));
        }
        if c.delivery == Delivery::Queue && c.upload_to_drive {
            return Err(PressError::InvalidConfig(
                "Drive upload is not available with queue delivery: \
                 the worker has no caller to report links to"
                    .into(),
            ));
        }
        if c.spool_dir == c.workspace_root {
            return Err(PressError::InvalidConfig(
                "Spool directory must differ from the workspace root".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Ghostscript `-dPDFSETTINGS` quality tier.
///
/// | Preset | Image DPI | Use case |
/// |--------|-----------|----------|
/// | screen | 72 | Smallest files, on-screen reading |
/// | ebook | 150 | Good balance (default) |
/// | printer | 300 | Office printing |
/// | prepress | 300, colour-preserving | Print shops |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Screen,
    #[default]
    Ebook,
    Printer,
    Prepress,
}

impl Preset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Screen => "screen",
            Preset::Ebook => "ebook",
            Preset::Printer => "printer",
            Preset::Prepress => "prepress",
        }
    }

    /// The `-dPDFSETTINGS` value, e.g. `/ebook`.
    pub fn pdf_settings(&self) -> String {
        format!("/{}", self.as_str())
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = PressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('/').to_lowercase().as_str() {
            "screen" => Ok(Preset::Screen),
            "ebook" => Ok(Preset::Ebook),
            "printer" => Ok(Preset::Printer),
            "prepress" => Ok(Preset::Prepress),
            other => Err(PressError::InvalidField {
                field: "preset".into(),
                reason: format!("unknown preset '{other}' (screen, ebook, printer, prepress)"),
            }),
        }
    }
}

/// How the upload endpoint hands the result back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// Stream the compressed PDF back as an attachment. (default)
    #[default]
    Download,
    /// Reply with a JSON envelope (Drive links when upload is enabled).
    Json,
    /// Persist the input, enqueue it, and acknowledge immediately.
    Queue,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::Download => "download",
            Delivery::Json => "json",
            Delivery::Queue => "queue",
        }
    }
}

impl FromStr for Delivery {
    type Err = PressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "download" => Ok(Delivery::Download),
            "json" => Ok(Delivery::Json),
            "queue" => Ok(Delivery::Queue),
            other => Err(PressError::InvalidConfig(format!(
                "unknown delivery '{other}' (download, json, queue)"
            ))),
        }
    }
}

/// Which compressor implementation runs the compress stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Local Ghostscript subprocess. (default)
    #[default]
    Ghostscript,
    /// Third-party compression API.
    Remote,
    /// Copy input to output unchanged (cover + merge only).
    Passthrough,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Ghostscript => "ghostscript",
            Backend::Remote => "remote",
            Backend::Passthrough => "passthrough",
        }
    }
}

impl FromStr for Backend {
    type Err = PressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ghostscript" | "gs" => Ok(Backend::Ghostscript),
            "remote" | "ilovepdf" => Ok(Backend::Remote),
            "passthrough" | "none" => Ok(Backend::Passthrough),
            other => Err(PressError::InvalidConfig(format!(
                "unknown backend '{other}' (ghostscript, remote, passthrough)"
            ))),
        }
    }
}

// ── Cover defaults ───────────────────────────────────────────────────────

/// Values printed on every cover page unless the request overrides them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverDefaults {
    pub class_name: Option<String>,
    pub course: Option<String>,
    pub lecturer: Option<String>,
}

// ── Collaborators ────────────────────────────────────────────────────────

/// Google OAuth client used for the Drive authorization-code flow.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Consent screen. Default: Google's v2 auth endpoint.
    pub auth_url: String,
    /// Token exchange endpoint. Default: `https://oauth2.googleapis.com/token`.
    pub token_url: String,
    /// Requested scope. Default: `drive.file`.
    pub scope: String,
}

impl OAuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            scope: "https://www.googleapis.com/auth/drive.file".to_string(),
        }
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("token_url", &self.token_url)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Destination for cloud uploads.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Parent folder id for uploaded files.
    pub folder_id: Option<String>,
    /// Multipart upload endpoint.
    pub upload_url: String,
    /// Files API root, used for permission grants.
    pub api_url: String,
}

impl DriveConfig {
    pub fn new(folder_id: Option<String>) -> Self {
        Self {
            folder_id,
            upload_url: "https://www.googleapis.com/upload/drive/v3/files".to_string(),
            api_url: "https://www.googleapis.com/drive/v3/files".to_string(),
        }
    }

    /// Point both endpoints at another host (used by tests).
    pub fn with_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.upload_url = format!("{base}/upload/drive/v3/files");
        self.api_url = format!("{base}/drive/v3/files");
        self
    }
}

/// Third-party compression API.
#[derive(Clone)]
pub struct RemoteConfig {
    /// Public project key exchanged for a short-lived token.
    pub public_key: String,
    /// API root for `auth` and `start`. Default: `https://api.ilovepdf.com/v1`.
    pub api_base: String,
    /// Scheme used for the task server returned by `start`. Default: `https`.
    pub server_scheme: String,
    /// `compression_level` sent with `process`. Default: `recommended`.
    pub compression_level: String,
}

impl RemoteConfig {
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            api_base: "https://api.ilovepdf.com/v1".to_string(),
            server_scheme: "https".to_string(),
            compression_level: "recommended".to_string(),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>, scheme: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self.server_scheme = scheme.into();
        self
    }

    pub fn with_compression_level(mut self, level: impl Into<String>) -> Self {
        self.compression_level = level.into();
        self
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("public_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("server_scheme", &self.server_scheme)
            .field("compression_level", &self.compression_level)
            .finish()
    }
}
