//! Entry points: extract a table of contents, then write it as bookmarks.
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ model ──▶ normalize ──▶ batch ──▶ outline
//! (path/URL)  (pdfium)   (PNG)     (VLM)     (shapes)     (order)   (lopdf)
//! ```
//!
//! Pages are processed in range order. With `concurrency > 1` several model
//! calls are in flight, but `buffered` yields results in submission order so
//! the batch is identical to a sequential run. The document is written once,
//! after the last page, and only when the batch is non-empty.

use crate::config::ExtractionConfig;
use crate::error::{PageError, Pdf2TocError};
use crate::output::{BookmarkReport, DocumentInfo, ExtractionOutput, PageResult};
use crate::pipeline::llm::{self, VisionClient};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::pipeline::{encode, input, outline};
use futures::stream::{self, StreamExt};
use lopdf::Document;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Prefix for the default output file name.
pub const OUTPUT_PREFIX: &str = "bookmarked_";

/// `bookmarked_<name>`, next to the input.
pub fn default_output_path(input_path: &Path) -> PathBuf {
    let name = input_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());
    input_path.with_file_name(format!("{OUTPUT_PREFIX}{name}"))
}

/// Run the extractor over `config.pages` with explicit collaborators.
///
/// Never fails because of a single page: render and model failures are
/// recorded on the page's [`PageResult`]. Fails only when the range does
/// not fit the document.
pub async fn extract_with(
    renderer: Arc<dyn PageRenderer>,
    client: Arc<dyn VisionClient>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2TocError> {
    let run_start = Instant::now();
    let total_pages = renderer.page_count();
    let indices = config.pages.to_indices(total_pages)?;
    let selected = indices.len();

    info!(
        "Extracting ToC from pages {} ({} of {}) with {}",
        config.pages,
        selected,
        total_pages,
        client.describe()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(selected);
    }

    let pages: Vec<PageResult> = stream::iter(indices.into_iter().map(|idx| {
        let renderer = Arc::clone(&renderer);
        let client = Arc::clone(&client);
        async move { process_page(renderer, client.as_ref(), idx, selected, config).await }
    }))
    .buffered(config.concurrency)
    .collect()
    .await;

    let output = ExtractionOutput::from_pages(
        pages,
        total_pages,
        run_start.elapsed().as_millis() as u64,
    );

    info!(
        "Extracted {} entries from {} pages ({} failed, {} empty) in {}ms",
        output.stats.total_entries,
        selected,
        output.stats.failed_pages,
        output.stats.empty_pages,
        output.stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(selected, output.stats.total_entries);
    }
    Ok(output)
}

async fn process_page(
    renderer: Arc<dyn PageRenderer>,
    client: &dyn VisionClient,
    idx: usize,
    selected: usize,
    config: &ExtractionConfig,
) -> PageResult {
    let page_num = idx + 1;
    let started = Instant::now();
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page_num, selected);
    }

    let result = match render_and_encode(renderer, idx, config).await {
        Ok(image) => llm::extract_page(client, page_num, image, config).await,
        Err(e) => PageResult::failed(page_num, e, started.elapsed().as_millis() as u64),
    };

    match &result.error {
        None => {
            if result.entries.is_empty() {
                warn!("Page {}: no entries", page_num);
            }
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_complete(page_num, selected, result.entries.len());
            }
        }
        Some(e) => {
            warn!("{}", e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_error(page_num, selected, e.to_string());
            }
        }
    }
    result
}

async fn render_and_encode(
    renderer: Arc<dyn PageRenderer>,
    idx: usize,
    config: &ExtractionConfig,
) -> Result<edgequake_llm::ImageData, PageError> {
    let page_num = idx + 1;
    let (dpi, max_px) = (config.dpi, config.max_rendered_pixels);
    let image = tokio::task::spawn_blocking(move || renderer.render_page(idx, dpi, max_px))
        .await
        .map_err(|e| PageError::RenderFailed {
            page: page_num,
            detail: format!("render task panicked: {e}"),
        })??;
    encode::encode_page(page_num, &image)
}

async fn open_renderer(path: &Path) -> Result<Arc<dyn PageRenderer>, Pdf2TocError> {
    let path = path.to_path_buf();
    let renderer = tokio::task::spawn_blocking(move || PdfiumRenderer::open(&path))
        .await
        .map_err(|e| Pdf2TocError::Internal(format!("Render task panicked: {e}")))??;
    Ok(Arc::new(renderer))
}

async fn load_document(path: &Path) -> Result<Document, Pdf2TocError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || outline::load_document(&path))
        .await
        .map_err(|e| Pdf2TocError::Internal(format!("Load task panicked: {e}")))?
}

/// Extract the table of contents from a path or URL without writing anything.
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2TocError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let client = llm::resolve_client(config)?;
    let renderer = open_renderer(resolved.path()).await?;
    extract_with(renderer, client, config).await
}

/// Commit an extraction batch to `doc` as its outline.
///
/// An empty batch is refused with [`Pdf2TocError::NothingExtracted`] and the
/// document is left untouched.
pub fn write_bookmarks(
    doc: &mut Document,
    output: &ExtractionOutput,
    page_offset: i64,
) -> Result<BookmarkReport, Pdf2TocError> {
    if output.entries.is_empty() {
        return Err(Pdf2TocError::NothingExtracted {
            pages: output.pages.len(),
        });
    }
    let bookmarks = outline::apply(doc, &output.entries, page_offset)?;
    Ok(BookmarkReport {
        bookmarks,
        page_offset,
        stats: output.stats.clone(),
    })
}

/// Extract with explicit collaborators and commit the result to `doc`.
pub async fn bookmark_with(
    doc: &mut Document,
    renderer: Arc<dyn PageRenderer>,
    client: Arc<dyn VisionClient>,
    config: &ExtractionConfig,
) -> Result<BookmarkReport, Pdf2TocError> {
    let output = extract_with(renderer, client, config).await?;
    write_bookmarks(doc, &output, config.page_offset)
}

async fn bookmark_resolved(
    resolved: &input::ResolvedInput,
    config: &ExtractionConfig,
) -> Result<(Document, BookmarkReport), Pdf2TocError> {
    let client = llm::resolve_client(config)?;
    // Parse for writing first: an encrypted or unparsable file fails before any model call.
    let mut doc = load_document(resolved.path()).await?;
    let renderer = open_renderer(resolved.path()).await?;
    let report = bookmark_with(&mut doc, renderer, client, config).await?;
    Ok((doc, report))
}

/// Extract, bookmark, and save to `output_path` (atomic temp file + rename).
pub async fn bookmark_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<BookmarkReport, Pdf2TocError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let (mut doc, report) = bookmark_resolved(&resolved, config).await?;

    let path = output_path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || outline::save_to_file(&mut doc, &path))
        .await
        .map_err(|e| Pdf2TocError::Internal(format!("Save task panicked: {e}")))??;

    info!("Wrote {} bookmarks", report.bookmarks.len());
    Ok(report)
}

/// Extract and bookmark an in-memory PDF, returning the new file's bytes.
///
/// The input is spilled to a managed temp file for the renderer and removed
/// on return.
pub async fn bookmark_to_bytes(
    bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<(Vec<u8>, BookmarkReport), Pdf2TocError> {
    let resolved = input::spill_bytes(bytes, "document.pdf")?;
    let (mut doc, report) = bookmark_resolved(&resolved, config).await?;
    let out = tokio::task::spawn_blocking(move || outline::save_to_bytes(&mut doc))
        .await
        .map_err(|e| Pdf2TocError::Internal(format!("Save task panicked: {e}")))??;
    Ok((out, report))
}

/// Synchronous wrapper around [`bookmark_to_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn bookmark_sync(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<BookmarkReport, Pdf2TocError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2TocError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(bookmark_to_file(input_str, output_path, config))
}

/// Page count, version and current outline, without a model.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentInfo, Pdf2TocError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    let path = resolved.path().to_path_buf();
    tokio::task::spawn_blocking(move || inspect_path(&path))
        .await
        .map_err(|e| Pdf2TocError::Internal(format!("Inspect task panicked: {e}")))?
}

fn inspect_path(path: &Path) -> Result<DocumentInfo, Pdf2TocError> {
    let doc = Document::load(path).map_err(|e| Pdf2TocError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(document_info(&doc))
}

/// Describe an already-loaded document.
pub fn document_info(doc: &Document) -> DocumentInfo {
    let is_encrypted = doc.trailer.get(b"Encrypt").is_ok();
    let bookmarks = if is_encrypted {
        Vec::new()
    } else {
        outline::read_outline(doc).unwrap_or_else(|e| {
            warn!("Could not read existing outline: {}", e);
            Vec::new()
        })
    };
    DocumentInfo {
        page_count: outline::page_count(doc),
        pdf_version: doc.version.clone(),
        is_encrypted,
        bookmarks,
    }
}
