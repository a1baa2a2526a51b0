//! Durable job queue backed by a spool directory.
//!
//! With [`crate::Delivery::Queue`] the upload handler stops after writing
//! `input.pdf`, enqueues a [`JobPayload`], and acknowledges the caller. A
//! [`Worker`] picks the job up later, compresses it, and removes the
//! scratch directory. Nothing is reported back to the original caller.
//!
//! ## Spool layout
//!
//! ```text
//! <spool>/
//!   00001739958000123456789-0000000003-<uuid>.json     pending
//!   00001739958000123999999-0000000004-<uuid>.claimed  being processed
//! ```
//!
//! Entry names start with a zero-padded timestamp and a per-process
//! sequence number, so lexical order is submission order. Entries are
//! written as `.tmp` and renamed into place, so a reader never sees a
//! half-written file. A worker claims an entry by renaming `.json` to
//! `.claimed`; rename is atomic, so two workers never claim the same job.
//!
//! Claims left behind by a crashed worker are returned to the pending state
//! by [`SpoolQueue::recover_claims`], which [`Worker::run`] calls once at
//! startup. Several workers may share one spool, but restarting one of them
//! while the others are busy also returns their in-flight jobs to the queue.

use crate::config::Preset;
use crate::error::PressError;
use crate::pipeline::compress::Compressor;
use crate::workspace::Workspace;
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_stream::wrappers::ReadDirStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const PENDING_EXT: &str = "json";
const CLAIMED_EXT: &str = "claimed";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// The queue message. This is the entire payload: no job id, no caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub temp_dir: PathBuf,
}

/// FIFO queue of [`JobPayload`]s stored as files.
#[derive(Debug, Clone)]
pub struct SpoolQueue {
    dir: PathBuf,
    notify: Arc<Notify>,
}

impl SpoolQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append a job.
    pub async fn enqueue(&self, payload: &JobPayload) -> Result<(), PressError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| spool_io("create", &self.dir, e))?;

        let body = serde_json::to_vec(payload)
            .map_err(|e| PressError::Queue(format!("cannot encode job: {e}")))?;
        let stem = entry_stem();
        let tmp = self.dir.join(format!("{stem}.tmp"));
        let entry = self.dir.join(format!("{stem}.{PENDING_EXT}"));

        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| spool_io("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &entry)
            .await
            .map_err(|e| spool_io("publish", &entry, e))?;

        self.notify.notify_one();
        info!("Queued job {}", payload.temp_dir.display());
        Ok(())
    }

    /// Claim the oldest pending job, if any.
    ///
    /// Entries that cannot be decoded are discarded with a warning.
    pub async fn claim(&self) -> Result<Option<ClaimedJob>, PressError> {
        for pending in self.entries(PENDING_EXT).await? {
            let claimed = pending.with_extension(CLAIMED_EXT);
            match tokio::fs::rename(&pending, &claimed).await {
                Ok(()) => {}
                // Another worker got there first.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(spool_io("claim", &pending, e)),
            }

            let bytes = tokio::fs::read(&claimed)
                .await
                .map_err(|e| spool_io("read", &claimed, e))?;
            match serde_json::from_slice::<JobPayload>(&bytes) {
                Ok(payload) => {
                    debug!("Claimed {}", claimed.display());
                    return Ok(Some(ClaimedJob {
                        payload,
                        entry: claimed,
                    }));
                }
                Err(e) => {
                    warn!("Discarding unreadable spool entry {}: {}", claimed.display(), e);
                    remove_entry(&claimed).await;
                }
            }
        }
        Ok(None)
    }

    /// Return every claimed entry to the pending state.
    pub async fn recover_claims(&self) -> Result<usize, PressError> {
        let mut recovered = 0;
        for claimed in self.entries(CLAIMED_EXT).await? {
            let pending = claimed.with_extension(PENDING_EXT);
            match tokio::fs::rename(&claimed, &pending).await {
                Ok(()) => recovered += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(spool_io("recover", &claimed, e)),
            }
        }
        if recovered > 0 {
            info!("Recovered {} interrupted job(s)", recovered);
        }
        Ok(recovered)
    }

    /// Number of pending (unclaimed) jobs.
    pub async fn pending(&self) -> Result<usize, PressError> {
        Ok(self.entries(PENDING_EXT).await?.len())
    }

    /// Resolves after the next in-process [`enqueue`](Self::enqueue).
    pub async fn notified(&self) {
        self.notify.notified().await
    }

    async fn entries(&self, ext: &str) -> Result<Vec<PathBuf>, PressError> {
        let read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(spool_io("list", &self.dir, e)),
        };

        let mut stream = ReadDirStream::new(read_dir);
        let mut paths = Vec::new();
        while let Some(entry) = stream.next().await {
            let path = entry.map_err(|e| spool_io("list", &self.dir, e))?.path();
            if path.extension().and_then(|x| x.to_str()) == Some(ext) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// A job taken off the queue. Call [`complete`](Self::complete) when done.
#[derive(Debug)]
pub struct ClaimedJob {
    payload: JobPayload,
    entry: PathBuf,
}

impl ClaimedJob {
    pub fn payload(&self) -> &JobPayload {
        &self.payload
    }

    /// Remove the spool entry.
    pub async fn complete(self) {
        remove_entry(&self.entry).await;
    }
}

fn entry_stem() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:020}-{seq:010}-{}", Uuid::new_v4().simple())
}

async fn remove_entry(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove spool entry {}: {}", path.display(), e);
        }
    }
}

fn spool_io(action: &str, path: &Path, e: std::io::Error) -> PressError {
    PressError::Queue(format!("cannot {action} '{}': {e}", path.display()))
}

// ── Worker ───────────────────────────────────────────────────────────────

/// Consumes a [`SpoolQueue`] one job at a time.
///
/// Every outcome is logged and then dropped. The scratch directory and the
/// spool entry are removed whether compression succeeded or not.
pub struct Worker {
    queue: SpoolQueue,
    workspace: Workspace,
    compressor: Arc<dyn Compressor>,
    preset: Preset,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        queue: SpoolQueue,
        workspace: Workspace,
        compressor: Arc<dyn Compressor>,
        preset: Preset,
    ) -> Self {
        Self {
            queue,
            workspace,
            compressor,
            preset,
            poll_interval: Duration::from_millis(500),
        }
    }

    /// How long to sleep when the spool is empty.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Process at most one job. Returns `true` if a job was taken.
    pub async fn process_one(&self) -> bool {
        let claimed = match self.queue.claim().await {
            Ok(Some(job)) => job,
            Ok(None) => return false,
            Err(e) => {
                error!("Queue read failed: {}", e);
                return false;
            }
        };

        self.handle(claimed.payload()).await;
        claimed.complete().await;
        true
    }

    /// Process jobs until the spool is empty. Returns how many were taken.
    pub async fn drain(&self) -> usize {
        let mut n = 0;
        while self.process_one().await {
            n += 1;
        }
        n
    }

    /// Run until `shutdown` resolves. A job in progress is finished first.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        if let Err(e) = self.queue.recover_claims().await {
            error!("Could not recover interrupted jobs: {}", e);
        }
        info!(
            "Worker started on {} ({}, {})",
            self.queue.dir().display(),
            self.compressor.name(),
            self.preset
        );

        tokio::pin!(shutdown);
        loop {
            if self.process_one().await {
                if (&mut shutdown).now_or_never().is_some() {
                    break;
                }
                continue;
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.queue.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!("Worker stopped");
    }

    async fn handle(&self, payload: &JobPayload) {
        let job = match self.workspace.adopt(payload) {
            Ok(job) => job,
            Err(e) => {
                error!("Rejected queued job: {}", e);
                return;
            }
        };

        let start = Instant::now();
        info!("Processing job {}", job.id());
        match self
            .compressor
            .compress(job.input_path(), job.output_path(), self.preset)
            .await
        {
            Ok(()) => info!(
                "Job {} compressed in {}ms",
                job.id(),
                start.elapsed().as_millis()
            ),
            Err(e) => error!("Job {} failed [{}]: {}", job.id(), e.kind(), e),
        }
        job.release().await;
    }
}
