//! Bookmark writing: extraction batch → clamped outline → PDF `/Outlines` tree.
//!
//! Two steps, kept apart so the arithmetic is testable without a document:
//!
//! 1. [`map_entries`]: add the page offset to every printed page number and
//!    clamp the result into `[1, page_count]`. Order is preserved verbatim;
//!    nothing is re-sorted or deduplicated. A hallucinated page 900 in a
//!    50-page file becomes page 50, never an error.
//! 2. [`commit_outline`]: replace the document's outline with the mapped
//!    items. Levels are not validated: a level-3 item directly after a level-1
//!    item is nested under that level-1 item, and a first item at level 4 is
//!    simply a top-level item.
//!
//! pdfium (used for rendering) can read bookmarks but not create them, so the
//! outline is written with `lopdf`.

use crate::error::Pdf2TocError;
use crate::output::{BookmarkItem, TocEntry};
use lopdf::{dictionary, Document, Object, ObjectId, StringFormat};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Offset and clamp every entry, preserving order.
pub fn map_entries(entries: &[TocEntry], page_offset: i64, page_count: usize) -> Vec<BookmarkItem> {
    let upper = page_count.max(1) as i64;
    entries
        .iter()
        .map(|entry| BookmarkItem {
            level: entry.level,
            title: entry.title.clone(),
            page: entry.page.saturating_add(page_offset).clamp(1, upper) as u32,
        })
        .collect()
}

/// Load a PDF for outline editing.
pub fn load_document(path: &Path) -> Result<Document, Pdf2TocError> {
    let doc = Document::load(path).map_err(|e| Pdf2TocError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    ensure_writable(doc, path)
}

/// Load a PDF held in memory for outline editing.
pub fn load_document_from_bytes(bytes: &[u8]) -> Result<Document, Pdf2TocError> {
    let path = Path::new("<memory>");
    let doc = Document::load_mem(bytes).map_err(|e| Pdf2TocError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    ensure_writable(doc, path)
}

fn ensure_writable(doc: Document, path: &Path) -> Result<Document, Pdf2TocError> {
    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(Pdf2TocError::EncryptedPdf {
            path: path.to_path_buf(),
        });
    }
    Ok(doc)
}

/// Number of pages in the document's page tree.
pub fn page_count(doc: &Document) -> usize {
    doc.get_pages().len()
}

/// Map `entries` against `doc` and commit them as its outline.
///
/// Returns the items exactly as written.
pub fn apply(
    doc: &mut Document,
    entries: &[TocEntry],
    page_offset: i64,
) -> Result<Vec<BookmarkItem>, Pdf2TocError> {
    let items = map_entries(entries, page_offset, page_count(doc));
    commit_outline(doc, &items)?;
    Ok(items)
}

struct OutlineNode {
    id: ObjectId,
    title: String,
    page_id: ObjectId,
    children: Vec<usize>,
}

/// Replace the document outline with `items`.
///
/// Any previous outline is detached from the catalog (its objects are dropped
/// by [`finalize`]). An empty `items` list leaves the document with no
/// outline. Returns the id of the new `/Outlines` dictionary, if one was made.
pub fn commit_outline(
    doc: &mut Document,
    items: &[BookmarkItem],
) -> Result<Option<ObjectId>, Pdf2TocError> {
    let root_id = doc.trailer.get(b"Root")?.as_reference()?;
    doc.get_object_mut(root_id)?.as_dict_mut()?.remove(b"Outlines");

    if items.is_empty() {
        info!("Cleared document outline");
        return Ok(None);
    }

    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    if page_ids.is_empty() {
        return Err(Pdf2TocError::OutlineWriteFailed(
            "document has no pages to point bookmarks at".into(),
        ));
    }

    let mut nodes: Vec<OutlineNode> = Vec::with_capacity(items.len());
    let mut roots: Vec<usize> = Vec::new();
    let mut level_stack: Vec<(i64, usize)> = Vec::new();

    for item in items {
        while level_stack
            .last()
            .is_some_and(|&(level, _)| level >= item.level)
        {
            level_stack.pop();
        }

        let page_idx = (item.page.max(1) as usize - 1).min(page_ids.len() - 1);
        let idx = nodes.len();
        nodes.push(OutlineNode {
            id: doc.new_object_id(),
            title: item.title.clone(),
            page_id: page_ids[page_idx],
            children: Vec::new(),
        });

        match level_stack.last() {
            Some(&(_, parent)) => nodes[parent].children.push(idx),
            None => roots.push(idx),
        }
        level_stack.push((item.level, idx));
    }

    let outlines_id = doc.new_object_id();
    write_siblings(doc, &nodes, &roots, outlines_id);

    let first = nodes[roots[0]].id;
    let last = nodes[roots[roots.len() - 1]].id;
    doc.objects.insert(
        outlines_id,
        Object::Dictionary(dictionary! {
            "Type" => "Outlines",
            "First" => first,
            "Last" => last,
            "Count" => roots.len() as i64,
        }),
    );

    doc.get_object_mut(root_id)?
        .as_dict_mut()?
        .set("Outlines", outlines_id);

    info!(
        "Committed outline: {} items, {} top-level",
        nodes.len(),
        roots.len()
    );
    Ok(Some(outlines_id))
}

/// Write one sibling chain; children start collapsed.
fn write_siblings(doc: &mut Document, nodes: &[OutlineNode], siblings: &[usize], parent_id: ObjectId) {
    for (i, &idx) in siblings.iter().enumerate() {
        let node = &nodes[idx];
        let dest = vec![
            Object::Reference(node.page_id),
            "XYZ".into(),
            Object::Null,
            Object::Null,
            Object::Null,
        ];
        let mut dict = dictionary! {
            "Title" => pdf_text_string(&node.title),
            "Parent" => parent_id,
            "Dest" => dest,
        };
        if i > 0 {
            dict.set("Prev", nodes[siblings[i - 1]].id);
        }
        if let Some(&next) = siblings.get(i + 1) {
            dict.set("Next", nodes[next].id);
        }
        if let (Some(&first), Some(&last)) = (node.children.first(), node.children.last()) {
            dict.set("First", nodes[first].id);
            dict.set("Last", nodes[last].id);
            dict.set("Count", -(node.children.len() as i64));
            write_siblings(doc, nodes, &node.children, node.id);
        }
        doc.objects.insert(node.id, Object::Dictionary(dict));
    }
}

/// Encode a PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
fn pdf_text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::String(s.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = Vec::with_capacity(2 + s.len() * 2);
    bytes.extend_from_slice(&[0xFE, 0xFF]);
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn decode_text_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Flatten the document's outline to `[level, title, page]` items in reading order.
///
/// Depth is the actual nesting depth, so a writer-side level jump (1 → 3)
/// reads back as 1 → 2. Destinations that cannot be resolved to a page
/// (named destinations, remote targets) report page 0.
pub fn read_outline(doc: &Document) -> Result<Vec<BookmarkItem>, Pdf2TocError> {
    let root_id = doc.trailer.get(b"Root")?.as_reference()?;
    let catalog = doc.get_dictionary(root_id)?;
    let outlines = match catalog.get(b"Outlines") {
        Ok(obj) => resolve(doc, obj)?.as_dict()?,
        Err(_) => return Ok(Vec::new()),
    };

    let page_numbers: HashMap<ObjectId, u32> = doc
        .get_pages()
        .into_iter()
        .map(|(num, id)| (id, num))
        .collect();

    let mut items = Vec::new();
    let mut visited = HashSet::new();
    if let Ok(first) = outlines.get(b"First").and_then(Object::as_reference) {
        read_siblings(doc, first, 1, &page_numbers, &mut visited, &mut items)?;
    }
    Ok(items)
}

fn read_siblings(
    doc: &Document,
    first: ObjectId,
    level: i64,
    page_numbers: &HashMap<ObjectId, u32>,
    visited: &mut HashSet<ObjectId>,
    items: &mut Vec<BookmarkItem>,
) -> Result<(), Pdf2TocError> {
    let mut current = Some(first);
    while let Some(id) = current {
        if !visited.insert(id) {
            debug!("Outline cycle at {:?}; stopping", id);
            break;
        }
        let dict = doc.get_dictionary(id)?;

        let title = match dict.get(b"Title").and_then(|t| resolve(doc, t)) {
            Ok(Object::String(bytes, _)) => decode_text_string(bytes),
            _ => String::new(),
        };
        let page = destination_page(doc, dict, page_numbers).unwrap_or(0);
        items.push(BookmarkItem { level, title, page });

        if let Ok(child) = dict.get(b"First").and_then(Object::as_reference) {
            read_siblings(doc, child, level + 1, page_numbers, visited, items)?;
        }
        current = dict.get(b"Next").and_then(Object::as_reference).ok();
    }
    Ok(())
}

fn destination_page(
    doc: &Document,
    item: &lopdf::Dictionary,
    page_numbers: &HashMap<ObjectId, u32>,
) -> Option<u32> {
    let dest = match item.get(b"Dest") {
        Ok(dest) => resolve(doc, dest).ok()?,
        Err(_) => {
            let action = resolve(doc, item.get(b"A").ok()?).ok()?.as_dict().ok()?;
            resolve(doc, action.get(b"D").ok()?).ok()?
        }
    };
    let page_id = dest.as_array().ok()?.first()?.as_reference().ok()?;
    page_numbers.get(&page_id).copied()
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object, lopdf::Error> {
    match obj {
        Object::Reference(id) => doc.get_object(*id),
        other => Ok(other),
    }
}

/// Drop unreachable objects (including a replaced outline) and compress streams.
pub fn finalize(doc: &mut Document) {
    let pruned = doc.prune_objects();
    doc.delete_zero_length_streams();
    doc.renumber_objects();
    doc.compress();
    debug!("Pruned {} unreferenced objects", pruned.len());
}

/// Serialise the document to memory after [`finalize`].
pub fn save_to_bytes(doc: &mut Document) -> Result<Vec<u8>, Pdf2TocError> {
    finalize(doc);
    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| Pdf2TocError::OutlineWriteFailed(format!("serialise PDF: {e}")))?;
    Ok(buf)
}

/// Serialise the document to `path` after [`finalize`].
///
/// Uses atomic write (temp file + rename) so a failed save never leaves a
/// truncated PDF behind.
pub fn save_to_file(doc: &mut Document, path: &Path) -> Result<(), Pdf2TocError> {
    let bytes = save_to_bytes(doc)?;
    let write_err = |source| Pdf2TocError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp_path = path.with_extension("pdf.tmp");
    std::fs::write(&tmp_path, &bytes).map_err(write_err)?;
    std::fs::rename(&tmp_path, path).map_err(write_err)?;

    info!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
