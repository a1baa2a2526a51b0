//! Cover page generation.
//!
//! Produces a single A4 page with a large session title and a label/value
//! table (name, student id, class, optionally course and lecturer), set in
//! the standard Times-Roman Type1 font. Standard fonts are never embedded,
//! so the page is a few hundred bytes.
//!
//! ```text
//!  Pertemuan 3                          ← 32 pt at (50, h − 64)
//!
//!  Nama          : Budi Santoso         ← 12 pt rows at h − 7·k,
//!  NIM           : 2401001                k = 13, 16, 19, 22, 25
//!  Kelas         : TI.25.A.2
//! ```

use crate::error::PressError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A4 in points, rounded to whole units.
pub const PAGE_WIDTH: i64 = 595;
pub const PAGE_HEIGHT: i64 = 842;

const LABEL_X: i64 = 50;
const COLON_X: i64 = LABEL_X + 90;
const VALUE_X: i64 = 145;
const TITLE_SIZE: i64 = 32;
const ROW_SIZE: i64 = 12;
const ROW_STEPS: [i64; 5] = [13, 16, 19, 22, 25];

/// Per-session data printed on the cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverSheet {
    /// Session (meeting) number shown in the title.
    pub session: u32,
    pub name: String,
    pub student_id: String,
    pub class_name: Option<String>,
    pub course: Option<String>,
    pub lecturer: Option<String>,
}

impl CoverSheet {
    pub fn new(session: u32, name: impl Into<String>, student_id: impl Into<String>) -> Self {
        Self {
            session,
            name: name.into(),
            student_id: student_id.into(),
            class_name: None,
            course: None,
            lecturer: None,
        }
    }

    /// Fill unset optional fields from `defaults`.
    pub fn with_defaults(mut self, defaults: &crate::config::CoverDefaults) -> Self {
        if self.class_name.is_none() {
            self.class_name = defaults.class_name.clone();
        }
        if self.course.is_none() {
            self.course = defaults.course.clone();
        }
        if self.lecturer.is_none() {
            self.lecturer = defaults.lecturer.clone();
        }
        self
    }

    fn rows<'a>(&'a self, labels: &'a CoverLabels) -> Vec<(&'a str, &'a str)> {
        let mut rows = vec![
            (labels.name.as_str(), self.name.as_str()),
            (labels.student_id.as_str(), self.student_id.as_str()),
        ];
        // Class is always printed; an unknown class shows as blank.
        rows.push((
            labels.class_name.as_str(),
            self.class_name.as_deref().unwrap_or(""),
        ));
        if let Some(course) = self.course.as_deref() {
            rows.push((labels.course.as_str(), course));
        }
        if let Some(lecturer) = self.lecturer.as_deref() {
            rows.push((labels.lecturer.as_str(), lecturer));
        }
        rows
    }
}

/// Text of the cover's fixed labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverLabels {
    pub session: String,
    pub name: String,
    pub student_id: String,
    pub class_name: String,
    pub course: String,
    pub lecturer: String,
}

impl Default for CoverLabels {
    fn default() -> Self {
        Self {
            session: "Pertemuan".to_string(),
            name: "Nama".to_string(),
            student_id: "NIM".to_string(),
            class_name: "Kelas".to_string(),
            course: "Mata Kuliah".to_string(),
            lecturer: "Dosen Pengampu".to_string(),
        }
    }
}

/// Render a one-page cover PDF.
pub fn render_cover(sheet: &CoverSheet, labels: &CoverLabels) -> Result<Vec<u8>, PressError> {
    let mut ops = Vec::new();
    let title = format!("{} {}", labels.session, sheet.session);
    push_text(&mut ops, LABEL_X, PAGE_HEIGHT - 2 * TITLE_SIZE, TITLE_SIZE, &title);

    for ((label, value), step) in sheet.rows(labels).into_iter().zip(ROW_STEPS) {
        let y = PAGE_HEIGHT - 7 * step;
        push_text(&mut ops, LABEL_X, y, ROW_SIZE, label);
        push_text(&mut ops, COLON_X, y, ROW_SIZE, ":");
        push_text(&mut ops, VALUE_X, y, ROW_SIZE, value);
    }

    let content = Content { operations: ops }
        .encode()
        .map_err(|e| PressError::CorruptPdf {
            detail: format!("cover content encoding failed: {e}"),
        })?;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Times-Roman",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    // Resources and MediaBox sit on the page-tree node and are inherited.
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(PAGE_WIDTH),
            Object::Integer(PAGE_HEIGHT),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(|e| PressError::CorruptPdf {
        detail: format!("cover save failed: {e}"),
    })?;
    debug!("Rendered cover for session {}: {} bytes", sheet.session, out.len());
    Ok(out)
}

fn push_text(ops: &mut Vec<Operation>, x: i64, y: i64, size: i64, text: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![Object::Name(b"F1".to_vec()), Object::Integer(size)],
    ));
    ops.push(Operation::new(
        "Td",
        vec![Object::Integer(x), Object::Integer(y)],
    ));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(encode_winansi(text), StringFormat::Literal)],
    ));
    ops.push(Operation::new("ET", vec![]));
}

/// Map text to single-byte WinAnsi; anything outside Latin-1 becomes `?`.
pub fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}
