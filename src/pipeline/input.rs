//! Input validation: check uploaded bytes and derive a safe output name.
//!
//! Validation runs before anything touches the disk. A body that is empty
//! or does not start with the `%PDF` magic is rejected here, so the
//! workspace is never allocated for garbage and the compressor never sees
//! non-PDF input.

use crate::error::PressError;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Fallback download name when the upload carried no usable filename.
pub const DEFAULT_OUTPUT_NAME: &str = "compressed.pdf";

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9 ._()\-]").expect("static regex"));

static REPEATED_UNDERSCORES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_{2,}").expect("static regex"));

/// Ensure `bytes` is a non-empty PDF.
pub fn validate_pdf(bytes: &[u8]) -> Result<(), PressError> {
    if bytes.is_empty() {
        return Err(PressError::EmptyBody);
    }
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let magic = bytes.iter().take(4).copied().collect();
        return Err(PressError::NotAPdf { magic });
    }
    debug!("Validated PDF upload: {} bytes", bytes.len());
    Ok(())
}

/// Ensure `bytes` fits within `limit`.
pub fn check_size(len: usize, limit: usize) -> Result<(), PressError> {
    if len > limit {
        Err(PressError::PayloadTooLarge { limit })
    } else {
        Ok(())
    }
}

/// Replace anything outside `[A-Za-z0-9 ._()-]` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = UNSAFE_FILENAME_CHARS.replace_all(name.trim(), "_");
    REPEATED_UNDERSCORES
        .replace_all(&replaced, "_")
        .trim_matches(|c: char| c == '.' || c == ' ')
        .to_string()
}

/// Derive the attachment name for a compressed upload.
///
/// Path components are stripped, unsafe characters replaced, and the
/// extension forced to `.pdf`. Falls back to [`DEFAULT_OUTPUT_NAME`].
pub fn output_filename(original: Option<&str>) -> String {
    let Some(original) = original else {
        return DEFAULT_OUTPUT_NAME.to_string();
    };

    // Browsers on Windows may send a full path.
    let base = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let stem = match base.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => base,
    };

    let clean = sanitize_filename(stem);
    if clean.is_empty() || clean.chars().all(|c| c == '_') {
        DEFAULT_OUTPUT_NAME.to_string()
    } else {
        format!("{clean}.pdf")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_pdf_magic() {
        assert!(validate_pdf(b"%PDF-1.7\n...").is_ok());
    }

    #[test]
    fn rejects_empty_body() {
        assert!(matches!(validate_pdf(b""), Err(PressError::EmptyBody)));
    }

    #[test]
    fn rejects_non_pdf_and_reports_magic() {
        match validate_pdf(b"PK\x03\x04zip") {
            Err(PressError::NotAPdf { magic }) => assert_eq!(magic, b"PK\x03\x04".to_vec()),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
        assert!(matches!(validate_pdf(b"%P"), Err(PressError::NotAPdf { .. })));
    }

    #[test]
    fn size_check_is_inclusive() {
        assert!(check_size(10, 10).is_ok());
        assert!(matches!(
            check_size(11, 10),
            Err(PressError::PayloadTooLarge { limit: 10 })
        ));
    }

    #[test]
    fn output_filename_variants() {
        assert_eq!(output_filename(None), "compressed.pdf");
        assert_eq!(output_filename(Some("tugas 3.pdf")), "tugas 3.pdf");
        assert_eq!(output_filename(Some("scan.PDF")), "scan.pdf");
        assert_eq!(output_filename(Some("C:\\Users\\me\\report.pdf")), "report.pdf");
        assert_eq!(output_filename(Some("../../etc/passwd")), "passwd.pdf");
        assert_eq!(output_filename(Some("ümlaut/ünïcode.pdf")), "_n_code.pdf");
        assert_eq!(output_filename(Some("???.pdf")), "compressed.pdf");
        assert_eq!(output_filename(Some(".pdf")), "compressed.pdf");
    }

    #[test]
    fn sanitize_keeps_parentheses_and_spaces() {
        assert_eq!(
            sanitize_filename("Budi (2401) TI.25.A.2"),
            "Budi (2401) TI.25.A.2"
        );
        assert_eq!(sanitize_filename("a/b:c"), "a_b_c");
    }
}
