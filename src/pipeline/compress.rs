//! Compress stage: turn `input.pdf` into `output.pdf`.
//!
//! [`Compressor`] is the seam between the pipeline and whatever does the
//! actual work. Implementations:
//!
//! | Type | Backend |
//! |------|---------|
//! | [`Ghostscript`] | local `gs` subprocess (`pdfwrite` device) |
//! | [`Passthrough`] | copies the input unchanged |
//! | [`crate::remote::RemoteBackend`] | third-party compression API |
//!
//! ## Failure classes
//!
//! A Ghostscript binary that cannot be spawned is
//! [`PressError::ToolUnavailable`]; one that runs and fails is
//! [`PressError::CompressionFailed`]. A zero exit status that left no output
//! file behind also counts as `CompressionFailed`.
//!
//! The subprocess is not killed if the awaiting future is dropped: once
//! started, a compression runs to completion.

use crate::config::Preset;
use crate::error::PressError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

const GS_HINT: &str = "Install Ghostscript or set PDFPRESS_GS_BIN.";

/// Produces `output` from `input`.
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Short name for logs and `/health`.
    fn name(&self) -> &'static str;

    /// Write a compressed copy of `input` to `output`.
    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        preset: Preset,
    ) -> Result<(), PressError>;
}

// ── Ghostscript ──────────────────────────────────────────────────────────

/// Local Ghostscript subprocess.
#[derive(Debug, Clone)]
pub struct Ghostscript {
    binary: String,
}

impl Ghostscript {
    /// `binary` is a name looked up on `PATH`, or a path.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Full argument vector passed to the binary.
    pub fn args(input: &Path, output: &Path, preset: Preset) -> Vec<OsString> {
        let mut output_arg = OsString::from("-sOutputFile=");
        output_arg.push(output);
        vec![
            "-sDEVICE=pdfwrite".into(),
            "-dCompatibilityLevel=1.4".into(),
            format!("-dPDFSETTINGS={}", preset.pdf_settings()).into(),
            "-dNOPAUSE".into(),
            "-dQUIET".into(),
            "-dBATCH".into(),
            output_arg,
            input.as_os_str().to_owned(),
        ]
    }
}

impl Default for Ghostscript {
    fn default() -> Self {
        Self::new("gs")
    }
}

#[async_trait]
impl Compressor for Ghostscript {
    fn name(&self) -> &'static str {
        "ghostscript"
    }

    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        preset: Preset,
    ) -> Result<(), PressError> {
        let start = Instant::now();
        debug!(
            "Running {} ({}) on {}",
            self.binary,
            preset,
            input.display()
        );

        let result = Command::new(&self.binary)
            .args(Self::args(input, output, preset))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                let reason = if e.kind() == std::io::ErrorKind::NotFound {
                    "executable not found".to_string()
                } else {
                    e.to_string()
                };
                let detail = format!("{reason}. {GS_HINT}");
                warn!("Cannot start {}: {}", self.binary, detail);
                return Err(PressError::ToolUnavailable {
                    tool: self.binary.clone(),
                    detail,
                });
            }
        };

        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        if !out.status.success() {
            return Err(PressError::CompressionFailed {
                code: out.status.code(),
                stderr,
            });
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.is_file() => {
                info!(
                    "Compressed {} → {} bytes in {}ms",
                    input.display(),
                    meta.len(),
                    start.elapsed().as_millis()
                );
                Ok(())
            }
            _ => Err(PressError::CompressionFailed {
                code: out.status.code(),
                stderr: if stderr.is_empty() {
                    "compressor exited successfully but wrote no output".to_string()
                } else {
                    stderr
                },
            }),
        }
    }
}

// ── Passthrough ──────────────────────────────────────────────────────────

/// Copies the input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

#[async_trait]
impl Compressor for Passthrough {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        _preset: Preset,
    ) -> Result<(), PressError> {
        tokio::fs::copy(input, output)
            .await
            .map_err(|e| PressError::workspace(output, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghostscript_argument_order() {
        let args = Ghostscript::args(
            Path::new("/w/in.pdf"),
            Path::new("/w/out.pdf"),
            Preset::Screen,
        );
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-sDEVICE=pdfwrite",
                "-dCompatibilityLevel=1.4",
                "-dPDFSETTINGS=/screen",
                "-dNOPAUSE",
                "-dQUIET",
                "-dBATCH",
                "-sOutputFile=/w/out.pdf",
                "/w/in.pdf",
            ]
        );
    }

    #[tokio::test]
    async fn missing_binary_is_tool_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.pdf");
        std::fs::write(&input, b"%PDF-1.4").unwrap();

        let gs = Ghostscript::new("pdfpress-no-such-gs-binary");
        let err = gs
            .compress(&input, &dir.path().join("out.pdf"), Preset::Ebook)
            .await
            .unwrap_err();
        match err {
            PressError::ToolUnavailable { tool, detail } => {
                assert_eq!(tool, "pdfpress-no-such-gs-binary");
                assert!(detail.contains("PDFPRESS_GS_BIN"), "{detail}");
            }
            other => panic!("expected ToolUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn passthrough_copies_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.pdf");
        let output = dir.path().join("out.pdf");
        std::fs::write(&input, b"%PDF-1.4 body").unwrap();

        Passthrough.compress(&input, &output, Preset::Ebook).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"%PDF-1.4 body");
    }

    #[cfg(unix)]
    mod fake_gs {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            wait_until_executable(&path);
            path
        }

        /// A child forked by a parallel test can still hold the write handle
        /// for a moment, and exec then fails with ETXTBSY. Once one exec
        /// succeeds, no copy of that handle remains.
        fn wait_until_executable(path: &Path) {
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

        const COPY: &str = r#"out=""
for arg in "$@"; do
  case "$arg" in -sOutputFile=*) out="${arg#-sOutputFile=}" ;; esac
  last="$arg"
done
cp "$last" "$out""#;

        async fn run(body: &str) -> (tempfile::TempDir, Result<(), PressError>) {
            let dir = tempfile::tempdir().unwrap();
            let gs = script(dir.path(), "gs", body);
            let input = dir.path().join("in.pdf");
            std::fs::write(&input, b"%PDF-1.4 data").unwrap();
            let result = Ghostscript::new(gs.to_string_lossy())
                .compress(&input, &dir.path().join("out.pdf"), Preset::Ebook)
                .await;
            (dir, result)
        }

        #[tokio::test]
        async fn successful_run_produces_output() {
            let (dir, result) = run(COPY).await;
            result.unwrap();
            assert_eq!(std::fs::read(dir.path().join("out.pdf")).unwrap(), b"%PDF-1.4 data");
        }

        #[tokio::test]
        async fn nonzero_exit_is_compression_failed_with_stderr() {
            let (_dir, result) = run("echo 'Unrecoverable error' >&2\nexit 1").await;
            match result {
                Err(PressError::CompressionFailed { code, stderr }) => {
                    assert_eq!(code, Some(1));
                    assert_eq!(stderr, "Unrecoverable error");
                }
                other => panic!("expected CompressionFailed, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn zero_exit_without_output_is_compression_failed() {
            let (_dir, result) = run("exit 0").await;
            assert!(matches!(
                result,
                Err(PressError::CompressionFailed { code: Some(0), .. })
            ));
        }
    }
}
