//! Shared helpers for the integration tests.

#![allow(dead_code)]

use pdfpress::{merge_documents, render_cover, CoverLabels, CoverSheet};
use std::path::{Path, PathBuf};

/// Route library logs to the test harness. `RUST_LOG` overrides the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// ── Sample documents ─────────────────────────────────────────────────────────

/// A valid PDF with `pages` pages, built from cover pages.
pub fn sample_pdf(pages: u32) -> Vec<u8> {
    let docs: Vec<Vec<u8>> = (1..=pages)
        .map(|n| {
            render_cover(&CoverSheet::new(n, "Sample", "0000"), &CoverLabels::default()).unwrap()
        })
        .collect();
    let refs: Vec<&[u8]> = docs.iter().map(Vec::as_slice).collect();
    merge_documents(&refs).unwrap()
}

// ── Fake Ghostscript ─────────────────────────────────────────────────────────

/// Copies the last argument to the `-sOutputFile=` target.
pub const GS_COPY: &str = r#"out=""
for arg in "$@"; do
  case "$arg" in -sOutputFile=*) out="${arg#-sOutputFile=}" ;; esac
  last="$arg"
done
cp "$last" "$out""#;

/// Fails the way Ghostscript does on a damaged file.
pub const GS_FAIL: &str = r#"echo "Unrecoverable error, exit code 1" >&2
exit 1"#;

/// Writes an executable shell script and returns its path.
#[cfg(unix)]
pub fn fake_gs(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    wait_until_executable(&path);
    path
}

/// Runs `path` until exec stops failing with ETXTBSY. A child forked by a
/// parallel test can briefly hold the write handle; after one successful
/// exec no copy of it remains.
#[cfg(unix)]
pub fn wait_until_executable(path: &Path) {
    const ETXTBSY: i32 = 26;
    for _ in 0..100 {
        match std::process::Command::new(path).arg("--version").output() {
            Err(e) if e.raw_os_error() == Some(ETXTBSY) => {
                std::thread::sleep(std::time::Duration::from_millis(10))
            }
            _ => return,
        }
    }
    panic!("{} stayed busy", path.display());
}

/// Job directories under `root`, ignoring the spool.
pub fn job_dirs(root: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(root)
        .map(|rd| {
            rd.filter_map(Result::ok)
                .filter(|e| e.file_name() != ".spool")
                .map(|e| e.path())
                .collect()
        })
        .unwrap_or_default()
}

// ── Multipart bodies ─────────────────────────────────────────────────────────

pub const BOUNDARY: &str = "pdfpress-test-boundary";

/// Builds a `multipart/form-data` body by hand.
#[derive(Default)]
pub struct MultipartBody {
    buf: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.buf.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        self.buf.extend_from_slice(bytes);
        self.buf.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.buf
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.buf
    }

    pub fn content_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }
}
