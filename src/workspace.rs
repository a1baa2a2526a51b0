//! Scratch-directory allocation for jobs.
//!
//! Every job gets one directory under the workspace root, named after a
//! random UUID. The directory holds exactly two files, `input.pdf` and
//! `output.pdf`, and is removed once the job's outcome is known.
//!
//! [`JobWorkspace`] is a scoped handle:
//!
//! * [`JobWorkspace::release`] removes the directory asynchronously. Request
//!   handlers call it before responding.
//! * `Drop` removes it synchronously if the handle goes away without being
//!   released: an early `?` return, a panic, or a cancelled request future.
//! * [`JobWorkspace::detach`] disarms the handle once the queue has accepted
//!   the job's [`JobWorkspace::payload`]. The worker re-adopts the directory
//!   with [`Workspace::adopt`], which re-arms the same guarantees on its side.
//!
//! Cleanup failures are logged and never escalated.

use crate::error::PressError;
use crate::queue::JobPayload;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const INPUT_FILE: &str = "input.pdf";
const OUTPUT_FILE: &str = "output.pdf";

/// Allocator for per-job scratch directories.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a fresh, empty job directory.
    pub async fn allocate(&self) -> Result<JobWorkspace, PressError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PressError::workspace(&self.root, e))?;

        let id = Uuid::new_v4();
        let dir = self.root.join(id.to_string());
        // `create_dir`, not `create_dir_all`: an existing path is an error,
        // so two jobs can never share a directory.
        tokio::fs::create_dir(&dir)
            .await
            .map_err(|e| PressError::workspace(&dir, e))?;

        debug!("Allocated workspace {}", dir.display());
        Ok(JobWorkspace::armed(id, dir))
    }

    /// Take ownership of a directory previously handed to the queue.
    ///
    /// The payload must name a job directory directly under this root, with
    /// the input and output files inside it. Anything else is rejected so a
    /// tampered spool entry cannot make the worker delete arbitrary paths.
    pub fn adopt(&self, payload: &JobPayload) -> Result<JobWorkspace, PressError> {
        let dir = &payload.temp_dir;
        if dir.parent() != Some(self.root.as_path()) {
            return Err(PressError::Queue(format!(
                "job directory '{}' is outside workspace root '{}'",
                dir.display(),
                self.root.display()
            )));
        }

        let id = dir
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| Uuid::parse_str(n).ok())
            .ok_or_else(|| {
                PressError::Queue(format!("'{}' is not a job directory", dir.display()))
            })?;

        if payload.input_path.parent() != Some(dir.as_path())
            || payload.output_path.parent() != Some(dir.as_path())
        {
            return Err(PressError::Queue(format!(
                "job {id}: input/output paths must live inside '{}'",
                dir.display()
            )));
        }

        Ok(JobWorkspace {
            id,
            dir: dir.clone(),
            input: payload.input_path.clone(),
            output: payload.output_path.clone(),
            armed: true,
        })
    }
}

/// One job's scratch directory. Removed when released or dropped.
#[derive(Debug)]
pub struct JobWorkspace {
    id: Uuid,
    dir: PathBuf,
    input: PathBuf,
    output: PathBuf,
    armed: bool,
}

impl JobWorkspace {
    fn armed(id: Uuid, dir: PathBuf) -> Self {
        Self {
            id,
            input: dir.join(INPUT_FILE),
            output: dir.join(OUTPUT_FILE),
            dir,
            armed: true,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Persist the uploaded bytes as this job's input.
    pub async fn write_input(&self, bytes: &[u8]) -> Result<(), PressError> {
        tokio::fs::write(&self.input, bytes)
            .await
            .map_err(|e| PressError::workspace(&self.input, e))
    }

    /// Read the compressor's output into memory.
    pub async fn read_output(&self) -> Result<Bytes, PressError> {
        tokio::fs::read(&self.output)
            .await
            .map(Bytes::from)
            .map_err(|e| PressError::workspace(&self.output, e))
    }

    /// The queue message describing this job.
    pub fn payload(&self) -> JobPayload {
        JobPayload {
            input_path: self.input.clone(),
            output_path: self.output.clone(),
            temp_dir: self.dir.clone(),
        }
    }

    /// Give up ownership of the directory. The handle no longer removes it.
    pub fn detach(mut self) {
        self.armed = false;
    }

    /// Remove the directory now.
    pub async fn release(mut self) {
        self.armed = false;
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!("Released workspace {}", self.dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove workspace {}: {} (directory leaked)",
                self.dir.display(),
                e
            ),
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!("Dropped workspace {}", self.dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove workspace {} on drop: {}",
                self.dir.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allocate_creates_unique_directories() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::new(root.path());

        let a = ws.allocate().await.unwrap();
        let b = ws.allocate().await.unwrap();

        assert!(a.dir().is_dir());
        assert!(b.dir().is_dir());
        assert_ne!(a.dir(), b.dir());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.input_path(), a.dir().join("input.pdf"));
        assert_eq!(a.output_path(), a.dir().join("output.pdf"));
    }

    #[tokio::test]
    async fn allocate_creates_missing_root() {
        let parent = tempfile::tempdir().unwrap();
        let ws = Workspace::new(parent.path().join("nested/root"));
        let job = ws.allocate().await.unwrap();
        assert!(job.dir().starts_with(parent.path().join("nested/root")));
    }

    #[tokio::test]
    async fn release_removes_directory_and_files() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::new(root.path());
        let job = ws.allocate().await.unwrap();
        job.write_input(b"%PDF-1.4").await.unwrap();
        let dir = job.dir().to_path_buf();

        job.release().await;
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::new(root.path());
        let dir = {
            let job = ws.allocate().await.unwrap();
            job.write_input(b"%PDF-1.4").await.unwrap();
            job.dir().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn release_tolerates_already_removed_directory() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::new(root.path());
        let job = ws.allocate().await.unwrap();
        std::fs::remove_dir_all(job.dir()).unwrap();
        job.release().await;
    }

    #[tokio::test]
    async fn payload_handoff_keeps_directory_until_adopted_handle_drops() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::new(root.path());
        let job = ws.allocate().await.unwrap();
        job.write_input(b"%PDF-1.4").await.unwrap();

        let payload = job.payload();
        job.detach();
        assert!(payload.temp_dir.is_dir(), "handoff must not delete");

        let adopted = ws.adopt(&payload).unwrap();
        assert_eq!(adopted.input_path(), payload.input_path);
        drop(adopted);
        assert!(!payload.temp_dir.exists());
    }

    #[tokio::test]
    async fn adopt_rejects_paths_outside_root() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::new(root.path());
        let outside = tempfile::tempdir().unwrap();
        let dir = outside.path().join(Uuid::new_v4().to_string());
        let payload = JobPayload {
            input_path: dir.join("input.pdf"),
            output_path: dir.join("output.pdf"),
            temp_dir: dir,
        };
        assert!(matches!(ws.adopt(&payload), Err(PressError::Queue(_))));
        assert!(outside.path().exists());
    }

    #[tokio::test]
    async fn adopt_rejects_non_job_directory_names() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::new(root.path());
        let dir = root.path().join("not-a-uuid");
        let payload = JobPayload {
            input_path: dir.join("input.pdf"),
            output_path: dir.join("output.pdf"),
            temp_dir: dir,
        };
        assert!(ws.adopt(&payload).is_err());
    }

    #[tokio::test]
    async fn adopt_rejects_files_outside_job_directory() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::new(root.path());
        let dir = root.path().join(Uuid::new_v4().to_string());
        let payload = JobPayload {
            input_path: root.path().join("elsewhere.pdf"),
            output_path: dir.join("output.pdf"),
            temp_dir: dir,
        };
        assert!(ws.adopt(&payload).is_err());
    }
}
