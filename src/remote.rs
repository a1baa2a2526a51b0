//! Third-party compression API client (iLovePDF protocol).
//!
//! ```text
//! auth ──▶ start ──▶ upload ──▶ process ──▶ download
//! token    server,    server_     (compress,   bytes
//!          task       filename    level)
//! ```
//!
//! `auth` and `start` go to the public API root; the remaining steps go
//! to the task server returned by `start`. Every step after `auth` carries
//! the bearer token. A failure at any step is reported as
//! [`PressError::RemoteServiceError`] naming the step, with the remote
//! response body as detail. Nothing is retried.

use crate::config::{Preset, RemoteConfig};
use crate::error::{PressError, RemoteStep};
use crate::pipeline::compress::Compressor;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    server: String,
    task: String,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    server_filename: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    server_filename: Option<String>,
    #[serde(default)]
    files: Vec<UploadedFile>,
}

impl UploadResponse {
    fn server_filename(self) -> Option<String> {
        self.server_filename
            .or_else(|| self.files.into_iter().next().map(|f| f.server_filename))
    }
}

/// A started task: where to send the file and how to authenticate.
#[derive(Debug)]
struct Task {
    token: String,
    base: String,
    id: String,
}

/// Client for the remote compression service.
#[derive(Debug, Clone)]
pub struct RemoteCompressor {
    config: RemoteConfig,
    http: reqwest::Client,
}

impl RemoteCompressor {
    pub fn new(config: RemoteConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: RemoteConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    /// Compress with the configured compression level.
    pub async fn compress(&self, pdf: Bytes, filename: &str) -> Result<Bytes, PressError> {
        let level = self.config.compression_level.clone();
        self.compress_with_level(pdf, filename, &level).await
    }

    /// Run the full protocol for one document.
    pub async fn compress_with_level(
        &self,
        pdf: Bytes,
        filename: &str,
        level: &str,
    ) -> Result<Bytes, PressError> {
        if pdf.is_empty() {
            return Err(PressError::EmptyBody);
        }
        let start = Instant::now();
        let input_len = pdf.len();

        let task = self.start_task().await?;
        debug!("Remote task {} on {}", task.id, task.base);
        let server_filename = self.upload(&task, pdf, filename).await?;
        self.process(&task, &server_filename, filename, level).await?;
        let out = self.download(&task).await?;

        info!(
            "Remote compression: {} → {} bytes in {}ms",
            input_len,
            out.len(),
            start.elapsed().as_millis()
        );
        Ok(out)
    }

    async fn start_task(&self) -> Result<Task, PressError> {
        let resp = self
            .http
            .post(format!("{}/auth", self.config.api_base))
            .form(&[("public_key", self.config.public_key.as_str())])
            .send()
            .await;
        let auth: AuthResponse = parse_json(RemoteStep::Auth, resp).await?;

        let resp = self
            .http
            .get(format!("{}/start/compress", self.config.api_base))
            .bearer_auth(&auth.token)
            .send()
            .await;
        let started: StartResponse = parse_json(RemoteStep::Start, resp).await?;

        Ok(Task {
            token: auth.token,
            base: format!("{}://{}/v1", self.config.server_scheme, started.server),
            id: started.task,
        })
    }

    async fn upload(&self, task: &Task, pdf: Bytes, filename: &str) -> Result<String, PressError> {
        let len = pdf.len() as u64;
        let file = Part::stream_with_length(pdf, len)
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .map_err(|e| PressError::remote(RemoteStep::Upload, e.to_string()))?;
        let form = Form::new().part("file", file).text("task", task.id.clone());

        let resp = self
            .http
            .post(format!("{}/upload", task.base))
            .bearer_auth(&task.token)
            .multipart(form)
            .send()
            .await;
        let uploaded: UploadResponse = parse_json(RemoteStep::Upload, resp).await?;
        uploaded
            .server_filename()
            .ok_or_else(|| {
                PressError::remote(RemoteStep::Upload, "response carried no server_filename")
            })
    }

    async fn process(
        &self,
        task: &Task,
        server_filename: &str,
        filename: &str,
        level: &str,
    ) -> Result<(), PressError> {
        let body = json!({
            "task": task.id,
            "tool": "compress",
            "files": [{ "server_filename": server_filename, "filename": filename }],
            "compression_level": level,
        });
        let resp = self
            .http
            .post(format!("{}/process", task.base))
            .bearer_auth(&task.token)
            .json(&body)
            .send()
            .await;
        checked(RemoteStep::Process, resp).await?;
        Ok(())
    }

    async fn download(&self, task: &Task) -> Result<Bytes, PressError> {
        let resp = self
            .http
            .get(format!("{}/download/{}", task.base, task.id))
            .bearer_auth(&task.token)
            .send()
            .await;
        checked(RemoteStep::Download, resp)
            .await?
            .bytes()
            .await
            .map_err(|e| PressError::remote(RemoteStep::Download, e.to_string()))
    }
}

/// Map a transport error or a non-2xx status to a step error.
async fn checked(
    step: RemoteStep,
    resp: reqwest::Result<reqwest::Response>,
) -> Result<reqwest::Response, PressError> {
    let resp = resp.map_err(|e| PressError::remote(step, e.to_string()))?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        body
    };
    Err(PressError::remote(step, detail))
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    step: RemoteStep,
    resp: reqwest::Result<reqwest::Response>,
) -> Result<T, PressError> {
    checked(step, resp)
        .await?
        .json()
        .await
        .map_err(|e| PressError::remote(step, format!("unexpected response: {e}")))
}

/// Remote compression level for a Ghostscript-style preset.
pub fn level_for(preset: Preset) -> &'static str {
    match preset {
        Preset::Screen => "extreme",
        Preset::Ebook => "recommended",
        Preset::Printer | Preset::Prepress => "low",
    }
}

// ── Pipeline adapter ─────────────────────────────────────────────────────

/// Lets the remote service act as the pipeline's compress stage.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    client: Arc<RemoteCompressor>,
}

impl RemoteBackend {
    pub fn new(client: Arc<RemoteCompressor>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Compressor for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        preset: Preset,
    ) -> Result<(), PressError> {
        let pdf = tokio::fs::read(input)
            .await
            .map_err(|e| PressError::workspace(input, e))?;
        let filename = input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("input.pdf");
        let out = self
            .client
            .compress_with_level(Bytes::from(pdf), filename, level_for(preset))
            .await?;
        tokio::fs::write(output, &out)
            .await
            .map_err(|e| PressError::workspace(output, e))
    }
}
