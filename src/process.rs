//! The submission pipeline: validate → [cover + merge] → persist →
//! compress → [upload] → outcome.
//!
//! One [`Pipeline`] replaces the family of near-identical servers: which
//! optional stages run, and how the result is handed back, is decided by
//! [`PipelineConfig`].
//!
//! | Delivery | Drive upload | Outcome |
//! |----------|--------------|---------|
//! | download | off | [`Outcome::Download`] (bytes in memory) |
//! | json     | off | [`Outcome::Compressed`] |
//! | any but queue | on | [`Outcome::Uploaded`] |
//! | queue    | –   | [`Outcome::Queued`] |
//!
//! The job's scratch directory is released before [`Pipeline::submit`]
//! returns, except for queued jobs, whose directory is handed to the worker.

use crate::config::{Backend, Delivery, PipelineConfig, Preset};
use crate::drive::{DriveClient, DriveFile};
use crate::error::PressError;
use crate::pipeline::compress::{Compressor, Ghostscript, Passthrough};
use crate::pipeline::cover::{CoverLabels, CoverSheet};
use crate::pipeline::{input, merge};
use crate::queue::SpoolQueue;
use crate::remote::{RemoteBackend, RemoteCompressor};
use crate::workspace::{JobWorkspace, Workspace};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One uploaded document and its per-request options.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub document: Bytes,
    /// Original filename, used for the download and Drive names.
    pub filename: Option<String>,
    /// Prepend a cover page built from these fields.
    pub cover: Option<CoverSheet>,
    /// Overrides the configured preset.
    pub preset: Option<Preset>,
}

impl Submission {
    pub fn new(document: impl Into<Bytes>) -> Self {
        Self {
            document: document.into(),
            ..Self::default()
        }
    }

    pub fn with_filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }

    pub fn with_cover(mut self, cover: CoverSheet) -> Self {
        self.cover = Some(cover);
        self
    }

    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = Some(preset);
        self
    }
}

/// What [`Pipeline::submit`] produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Compressed bytes to be sent back as an attachment.
    Download { filename: String, bytes: Bytes },
    /// Compressed, nothing to return but the size.
    Compressed { filename: String, size: u64 },
    /// Compressed and uploaded to Drive.
    Uploaded(DriveFile),
    /// Accepted for background compression.
    Queued,
}

/// Build the compressor for `config.backend`.
///
/// `remote` is required for [`Backend::Remote`].
pub fn compressor_for(
    config: &PipelineConfig,
    remote: Option<Arc<RemoteCompressor>>,
) -> Result<Arc<dyn Compressor>, PressError> {
    Ok(match config.backend {
        Backend::Ghostscript => Arc::new(Ghostscript::new(config.gs_binary.clone())),
        Backend::Passthrough => Arc::new(Passthrough),
        Backend::Remote => {
            let client = remote.ok_or_else(|| {
                PressError::InvalidConfig(
                    "remote backend selected but no API key configured".into(),
                )
            })?;
            Arc::new(RemoteBackend::new(client))
        }
    })
}

/// Runs submissions through the configured stages.
pub struct Pipeline {
    config: PipelineConfig,
    workspace: Workspace,
    compressor: Arc<dyn Compressor>,
    queue: SpoolQueue,
    drive: Option<DriveClient>,
    labels: CoverLabels,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, compressor: Arc<dyn Compressor>) -> Self {
        Self {
            workspace: Workspace::new(config.workspace_root.clone()),
            queue: SpoolQueue::new(config.spool_dir.clone()),
            config,
            compressor,
            drive: None,
            labels: CoverLabels::default(),
        }
    }

    pub fn with_drive(mut self, drive: DriveClient) -> Self {
        self.drive = Some(drive);
        self
    }

    pub fn with_labels(mut self, labels: CoverLabels) -> Self {
        self.labels = labels;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn queue(&self) -> &SpoolQueue {
        &self.queue
    }

    pub fn compressor(&self) -> &Arc<dyn Compressor> {
        &self.compressor
    }

    pub fn drive(&self) -> Option<&DriveClient> {
        self.drive.as_ref()
    }

    /// Run one submission to completion (or to the queue).
    pub async fn submit(&self, submission: Submission) -> Result<Outcome, PressError> {
        let total_start = Instant::now();
        let Submission {
            document,
            filename,
            cover,
            preset,
        } = submission;

        // ── Step 1: Validate ─────────────────────────────────────────────
        input::check_size(document.len(), self.config.max_upload_bytes)?;
        input::validate_pdf(&document)?;
        let filename = input::output_filename(filename.as_deref());
        if self.config.delivery == Delivery::Queue && preset.is_some() {
            // Queued jobs run with the worker's preset.
            return Err(PressError::InvalidField {
                field: "preset".into(),
                reason: "not supported with queue delivery".into(),
            });
        }
        let preset = preset.unwrap_or(self.config.preset);
        let drive = if self.config.upload_to_drive {
            Some(self.drive.as_ref().ok_or_else(|| {
                PressError::InvalidConfig(
                    "Drive upload enabled but no Drive client configured".into(),
                )
            })?)
        } else {
            None
        };

        // ── Step 2: Cover + merge ────────────────────────────────────────
        let document = match cover {
            Some(sheet) => {
                let sheet = sheet.with_defaults(&self.config.cover_defaults);
                debug!("Attaching cover for session {}", sheet.session);
                Bytes::from(merge::attach_cover(sheet, self.labels.clone(), document).await?)
            }
            None => document,
        };

        // ── Step 3: Persist ──────────────────────────────────────────────
        let job = self.workspace.allocate().await?;
        job.write_input(&document).await?;
        info!("Job {}: {} ({} bytes)", job.id(), filename, document.len());
        drop(document);

        if self.config.delivery == Delivery::Queue {
            let payload = job.payload();
            self.queue.enqueue(&payload).await?;
            job.detach();
            return Ok(Outcome::Queued);
        }

        // ── Step 4-6: Compress, upload, collect ──────────────────────────
        let result = self.finish(&job, &filename, preset, drive).await;
        job.release().await;

        match &result {
            Ok(_) => info!("Job finished in {}ms", total_start.elapsed().as_millis()),
            Err(e) => warn!("Job failed [{}]: {}", e.kind(), e),
        }
        result
    }

    async fn finish(
        &self,
        job: &JobWorkspace,
        filename: &str,
        preset: Preset,
        drive: Option<&DriveClient>,
    ) -> Result<Outcome, PressError> {
        self.compressor
            .compress(job.input_path(), job.output_path(), preset)
            .await?;

        if let Some(drive) = drive {
            let file = drive.upload(job.output_path(), filename).await?;
            return Ok(Outcome::Uploaded(file));
        }

        match self.config.delivery {
            Delivery::Download => Ok(Outcome::Download {
                filename: filename.to_string(),
                bytes: job.read_output().await?,
            }),
            _ => {
                let size = tokio::fs::metadata(job.output_path())
                    .await
                    .map_err(|e| PressError::workspace(job.output_path(), e))?
                    .len();
                Ok(Outcome::Compressed {
                    filename: filename.to_string(),
                    size,
                })
            }
        }
    }
}
