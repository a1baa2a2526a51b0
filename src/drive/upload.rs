//! Google Drive file creation.

use crate::config::DriveConfig;
use crate::drive::oauth::Authorizer;
use crate::error::PressError;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// A file created on Drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub web_view_link: Option<String>,
    #[serde(default)]
    pub web_content_link: Option<String>,
}

/// Uploads files with a token from an [`Authorizer`].
pub struct DriveClient {
    config: DriveConfig,
    http: reqwest::Client,
    auth: Arc<Authorizer>,
}

impl DriveClient {
    pub fn new(config: DriveConfig, auth: Arc<Authorizer>) -> Self {
        Self::with_client(config, auth, reqwest::Client::new())
    }

    pub fn with_client(config: DriveConfig, auth: Arc<Authorizer>, http: reqwest::Client) -> Self {
        Self { config, http, auth }
    }

    pub fn authorizer(&self) -> &Arc<Authorizer> {
        &self.auth
    }

    /// Upload `path` as `name` and make it readable by anyone with the link.
    ///
    /// A failed permission grant is logged; the upload still succeeds.
    pub async fn upload(&self, path: &Path, name: &str) -> Result<DriveFile, PressError> {
        let start = Instant::now();
        let token = self.auth.access_token().await?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PressError::workspace(path, e))?;
        let size = bytes.len();

        let mut metadata = json!({ "name": name, "mimeType": "application/pdf" });
        if let Some(folder) = &self.config.folder_id {
            metadata["parents"] = json!([folder]);
        }

        let form = Form::new()
            .part(
                "metadata",
                Part::text(metadata.to_string())
                    .mime_str("application/json; charset=UTF-8")
                    .map_err(upload_failed)?,
            )
            .part(
                "file",
                Part::bytes(bytes)
                    .file_name(name.to_string())
                    .mime_str("application/pdf")
                    .map_err(upload_failed)?,
            );

        let resp = self
            .http
            .post(&self.config.upload_url)
            .query(&[
                ("uploadType", "multipart"),
                ("fields", "id,webViewLink,webContentLink"),
            ])
            .bearer_auth(&token)
            .multipart(form)
            .send()
            .await
            .map_err(upload_failed)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PressError::UploadFailed {
                detail: format!("Drive returned {status}: {body}"),
            });
        }
        let mut file: DriveFile = resp.json().await.map_err(upload_failed)?;
        if file.web_view_link.is_none() {
            file.web_view_link = Some(format!("https://drive.google.com/file/d/{}/view", file.id));
        }

        self.share_with_anyone(&token, &file.id).await;
        info!(
            "Uploaded {} ({} bytes) to Drive as {} in {}ms",
            name,
            size,
            file.id,
            start.elapsed().as_millis()
        );
        Ok(file)
    }

    async fn share_with_anyone(&self, token: &str, file_id: &str) {
        let url = format!("{}/{}/permissions", self.config.api_url, file_id);
        let result = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "role": "reader", "type": "anyone" }))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                warn!("Could not share {}: {} {}", file_id, status, body);
            }
            Err(e) => warn!("Could not share {}: {}", file_id, e),
        }
    }
}

fn upload_failed(e: reqwest::Error) -> PressError {
    PressError::UploadFailed {
        detail: e.to_string(),
    }
}
