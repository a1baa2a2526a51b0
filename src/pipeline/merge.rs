//! PDF concatenation.
//!
//! Each input is loaded with lopdf, renumbered into a disjoint object-id
//! range, and stripped of its catalog and page-tree nodes. Its pages are
//! re-parented under one fresh `Pages` node. Everything else (content
//! streams, fonts, images) is carried over untouched.
//!
//! Page-tree nodes can hold `Resources`, `MediaBox`, `CropBox` and `Rotate`
//! for their descendants. Those nodes are discarded, so the values are
//! copied down onto each page first; otherwise pages would lose their
//! fonts or fall back to a default page size.

use crate::error::PressError;
use crate::pipeline::cover::{render_cover, CoverLabels, CoverSheet};
use bytes::Bytes;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use tracing::{debug, info};

const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Structural object types that are rebuilt rather than copied.
const SKIPPED_TYPES: [&[u8]; 7] = [
    b"Catalog", b"Pages", b"Page", b"Outlines", b"Outline", b"ObjStm", b"XRef",
];

/// Concatenate `inputs` in order into one compressed PDF.
pub fn merge_documents(inputs: &[&[u8]]) -> Result<Vec<u8>, PressError> {
    if inputs.is_empty() {
        return Err(PressError::Internal("merge called with no documents".into()));
    }

    let mut merged = Document::with_version("1.5");
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut max_id = 1;

    for (i, bytes) in inputs.iter().enumerate() {
        let mut doc = Document::load_mem(bytes).map_err(|e| PressError::CorruptPdf {
            detail: format!("document {} could not be parsed: {e}", i + 1),
        })?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        debug!("Merging document {}: {} pages", i + 1, page_ids.len());

        for page_id in page_ids {
            let mut page = doc
                .get_dictionary(page_id)
                .map_err(|e| PressError::CorruptPdf {
                    detail: format!("document {}: page {:?} unreadable: {e}", i + 1, page_id),
                })?
                .clone();
            inherit_attributes(&doc, &mut page);
            pages.push((page_id, page));
        }

        for (id, object) in doc.objects {
            if object_type(&object).is_some_and(|t| SKIPPED_TYPES.contains(&t)) {
                continue;
            }
            merged.objects.insert(id, object);
        }
    }

    merged.max_id = max_id;
    let pages_id = merged.new_object_id();

    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
    let count = pages.len() as i64;
    for (id, mut page) in pages {
        page.set("Parent", pages_id);
        merged.objects.insert(id, Object::Dictionary(page));
    }
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);
    merged.compress();

    let mut out = Vec::new();
    merged.save_to(&mut out).map_err(|e| PressError::CorruptPdf {
        detail: format!("merged document could not be written: {e}"),
    })?;
    info!("Merged {} documents → {} pages, {} bytes", inputs.len(), count, out.len());
    Ok(out)
}

/// Number of pages in a PDF.
pub fn page_count(bytes: &[u8]) -> Result<usize, PressError> {
    let doc = Document::load_mem(bytes).map_err(|e| PressError::CorruptPdf {
        detail: e.to_string(),
    })?;
    Ok(doc.get_pages().len())
}

/// Render a cover for `sheet` and place it in front of `document`.
///
/// lopdf is synchronous and CPU-bound, so the work runs on the blocking pool.
pub async fn attach_cover(
    sheet: CoverSheet,
    labels: CoverLabels,
    document: Bytes,
) -> Result<Vec<u8>, PressError> {
    tokio::task::spawn_blocking(move || {
        let cover = render_cover(&sheet, &labels)?;
        merge_documents(&[&cover, &document])
    })
    .await
    .map_err(|e| PressError::Internal(format!("Merge task panicked: {e}")))?
}

/// Copy inheritable attributes from the page's ancestors onto the page.
fn inherit_attributes(doc: &Document, page: &mut Dictionary) {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    // Guards against cyclic Parent chains in malformed files.
    let mut depth = 0;
    while let Some(parent_id) = parent {
        if depth > 64 {
            break;
        }
        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }
}

fn object_type(object: &Object) -> Option<&[u8]> {
    let dict = match object {
        Object::Dictionary(d) => d,
        Object::Stream(s) => &s.dict,
        _ => return None,
    };
    dict.get(b"Type").and_then(Object::as_name).ok()
}
