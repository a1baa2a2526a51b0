//! Pipeline stages for PDF submissions.
//!
//! Each submodule implements exactly one transformation step, so each can
//! be tested without HTTP and without the others.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ input ──▶ cover + merge ──▶ workspace ──▶ compress ──▶ [drive]
//! (bytes)   (%PDF?)      (lopdf)       (input.pdf)    (gs/remote)
//! ```
//!
//! 1. [`input`]   — size and magic checks, output filename
//! 2. [`cover`]   — render the one-page cover sheet
//! 3. [`merge`]   — concatenate cover and upload; runs in `spawn_blocking`
//!    because lopdf is synchronous
//! 4. [`compress`] — the [`compress::Compressor`] seam and its local
//!    implementations
//!
//! The stages are wired together by [`crate::process::Pipeline`].

pub mod compress;
pub mod cover;
pub mod input;
pub mod merge;
