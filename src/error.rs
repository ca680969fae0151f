//! Error types for the edgequake-pdf2toc library.
//!
//! Three error types, one per failure scope:
//!
//! * [`Pdf2TocError`]: **Fatal**: the run cannot proceed or produced nothing
//!   to write (bad input file, encrypted PDF, no provider, empty batch).
//!   Returned as `Err(Pdf2TocError)` from the top-level entry points.
//!
//! * [`PageError`]: **Non-fatal**: one page could not be rendered or the
//!   model call for it failed. Stored inside [`crate::output::PageResult`];
//!   the page contributes zero entries and the run continues.
//!
//! * [`TransportError`]: returned by a [`crate::pipeline::llm::VisionClient`]
//!   implementation. The extractor folds it into a [`PageError`].
//!
//! A malformed model answer is not an error at all: it degrades to an empty
//! page (see [`crate::pipeline::normalize`]).

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2toc library.
#[derive(Debug, Error)]
pub enum Pdf2TocError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Encrypted documents cannot have their outline rewritten.
    #[error("PDF '{path}' is encrypted; decrypt it first (e.g. qpdf --decrypt in.pdf out.pdf)")]
    EncryptedPdf { path: PathBuf },

    /// The selected page range starts beyond the end of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// Start page is after end page, or zero.
    #[error("Invalid page range {start}-{end}: pages are 1-indexed and start must be <= end")]
    InvalidPageRange { start: usize, end: usize },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// No vision client could be constructed (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Outcome errors ────────────────────────────────────────────────────
    /// Every processed page yielded zero entries; the document is left untouched.
    #[error("No bookmarks were extracted from {pages} page(s); document left unmodified")]
    NothingExtracted { pages: usize },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The outline could not be committed to the document structure.
    #[error("Failed to write bookmarks: {0}")]
    OutlineWriteFailed(String),

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Persisted settings could not be read or written.
    #[error("Settings file '{path}': {detail}")]
    Settings { path: PathBuf, detail: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<lopdf::Error> for Pdf2TocError {
    fn from(e: lopdf::Error) -> Self {
        Pdf2TocError::OutlineWriteFailed(e.to_string())
    }
}

/// A non-fatal error for a single page.
///
/// The page contributes zero entries; the run continues with the next page.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The rendered image could not be PNG-encoded.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// Model call failed (after retries, if any were configured).
    #[error("Page {page}: LLM call failed after {retries} retries: {detail}")]
    LlmFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// Model call timed out.
    #[error("Page {page}: LLM call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },
}

impl PageError {
    /// 1-indexed page number the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. }
            | PageError::LlmFailed { page, .. }
            | PageError::Timeout { page, .. } => *page,
        }
    }
}

/// Failure of a single vision-model round trip.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, TLS or request-building failure.
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered with a non-success status (401, 429, 5xx, …).
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The response envelope could not be decoded.
    #[error("invalid response envelope: {0}")]
    InvalidResponse(String),

    /// Error reported by an `edgequake_llm` provider.
    #[error("{0}")]
    Provider(String),
}

impl TransportError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Http { .. } | TransportError::Provider(_) => true,
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::InvalidResponse(_) => false,
        }
    }
}
