//! # pdfpress
//!
//! Assemble, compress and publish per-session PDF submissions.
//!
//! A submission is one uploaded PDF, optionally preceded by a generated
//! cover page (session number, student name and id, class). The merged
//! document is compressed with Ghostscript or a remote compression API and
//! either handed back, uploaded to Google Drive, or queued for a background
//! worker.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Validate  size limit, %PDF magic            (pipeline::input)
//!  ├─ 2. Cover     one-page A4 cover + merge (lopdf)  (pipeline::cover, merge)
//!  ├─ 3. Persist   <workspace>/<uuid>/input.pdf       (workspace)
//!  ├─ 4. Compress  gs / remote API / passthrough      (pipeline::compress, remote)
//!  ├─ 5. Upload    Google Drive, optional             (drive)
//!  └─ 6. Respond   download, JSON envelope, or 202    (server)
//!                  └─ queue delivery stops after 3    (queue)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfpress::{compressor_for, Backend, Outcome, Pipeline, PipelineConfig, Submission};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .backend(Backend::Ghostscript)
//!         .build()?;
//!     let compressor = compressor_for(&config, None)?;
//!     let pipeline = Pipeline::new(config, compressor);
//!
//!     let bytes = std::fs::read("tugas.pdf")?;
//!     if let Outcome::Download { filename, bytes } =
//!         pipeline.submit(Submission::new(bytes).with_filename("tugas.pdf")).await?
//!     {
//!         std::fs::write(filename, bytes)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `server` | on | axum router and handlers ([`server`]) |
//! | `cli`    | on | the `pdfpress` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Library-only use:
//! ```toml
//! pdfpress = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod drive;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod queue;
pub mod remote;
#[cfg(feature = "server")]
pub mod server;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    Backend, CoverDefaults, Delivery, DriveConfig, OAuthConfig, PipelineConfig,
    PipelineConfigBuilder, Preset, RemoteConfig,
};
pub use drive::{
    Authorizer, CredentialStore, DriveClient, DriveFile, FileCredentialStore,
    MemoryCredentialStore, OAuthClient, StoredToken,
};
pub use error::{PressError, RemoteStep};
pub use pipeline::compress::{Compressor, Ghostscript, Passthrough};
pub use pipeline::cover::{render_cover, CoverLabels, CoverSheet};
pub use pipeline::merge::{merge_documents, page_count};
pub use process::{compressor_for, Outcome, Pipeline, Submission};
pub use queue::{JobPayload, SpoolQueue, Worker};
pub use remote::{RemoteBackend, RemoteCompressor};
pub use workspace::{JobWorkspace, Workspace};
