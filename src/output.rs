//! Value types produced by an extraction run.
//!
//! A run flows through three shapes:
//!
//! ```text
//! model JSON ──▶ TocEntry (per page) ──▶ Vec<TocEntry> (batch) ──▶ BookmarkItem (committed)
//! ```
//!
//! [`TocEntry`] carries printed page numbers exactly as the model reported them.
//! [`BookmarkItem`] carries physical page numbers: offset-adjusted and clamped
//! to the document. Each stage builds a new list; nothing is edited in place.

use crate::error::PageError;
use serde::{Deserialize, Serialize};

/// One bookmark candidate read off a table-of-contents page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    /// Page number as printed in the table of contents (before offsetting).
    pub page: i64,
    /// Hierarchy depth, 1 = top level.
    pub level: i64,
}

impl TocEntry {
    pub fn new(title: impl Into<String>, page: i64, level: i64) -> Self {
        Self {
            title: title.into(),
            page,
            level,
        }
    }
}

/// A committed outline item: `[level, title, page]` with a physical 1-based page.
///
/// Serialises as the three-element array so JSON output matches the flat
/// outline representation viewers and tooling expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "(i64, String, u32)", from = "(i64, String, u32)")]
pub struct BookmarkItem {
    pub level: i64,
    pub title: String,
    pub page: u32,
}

impl From<BookmarkItem> for (i64, String, u32) {
    fn from(item: BookmarkItem) -> Self {
        (item.level, item.title, item.page)
    }
}

impl From<(i64, String, u32)> for BookmarkItem {
    fn from((level, title, page): (i64, String, u32)) -> Self {
        Self { level, title, page }
    }
}

/// Outcome of processing one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed physical page number.
    pub page_num: usize,
    /// Entries extracted from this page (empty on failure or malformed output).
    pub entries: Vec<TocEntry>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    /// Number of retries used before the final attempt.
    pub retries: u32,
    /// Set when rendering or the model call failed.
    pub error: Option<PageError>,
}

impl PageResult {
    pub(crate) fn failed(page_num: usize, error: PageError, duration_ms: u64) -> Self {
        Self {
            page_num,
            entries: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms,
            retries: 0,
            error: Some(error),
        }
    }

    /// The page's entries, or the error that left it empty.
    pub fn into_result(self) -> Result<Vec<TocEntry>, PageError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.entries),
        }
    }
}

/// Aggregate statistics for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages in the whole document.
    pub total_pages: usize,
    /// Pages whose model call succeeded (including those with zero entries).
    pub processed_pages: usize,
    /// Pages that failed to render or whose model call failed.
    pub failed_pages: usize,
    /// Successful pages that still yielded zero entries.
    pub empty_pages: usize,
    pub total_entries: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

/// Everything an extraction run produced, before anything is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// The extraction batch, in page order then model order.
    pub entries: Vec<TocEntry>,
    /// Per-page outcomes, in page order.
    pub pages: Vec<PageResult>,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    /// Assemble an output from per-page results that are already in page order.
    pub(crate) fn from_pages(pages: Vec<PageResult>, total_pages: usize, duration_ms: u64) -> Self {
        let entries: Vec<TocEntry> = pages.iter().flat_map(|p| p.entries.iter().cloned()).collect();

        let failed = pages.iter().filter(|p| p.error.is_some()).count();
        let empty = pages
            .iter()
            .filter(|p| p.error.is_none() && p.entries.is_empty())
            .count();

        let stats = ExtractionStats {
            total_pages,
            processed_pages: pages.len() - failed,
            failed_pages: failed,
            empty_pages: empty,
            total_entries: entries.len(),
            total_input_tokens: pages.iter().map(|p| p.input_tokens as u64).sum(),
            total_output_tokens: pages.iter().map(|p| p.output_tokens as u64).sum(),
            total_duration_ms: duration_ms,
        };

        Self {
            entries,
            pages,
            stats,
        }
    }
}

/// Summary returned once bookmarks have been written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkReport {
    /// The outline exactly as committed.
    pub bookmarks: Vec<BookmarkItem>,
    pub page_offset: i64,
    pub stats: ExtractionStats,
}

/// What [`crate::inspect`] reports about a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub pdf_version: String,
    pub is_encrypted: bool,
    /// The existing outline, flattened.
    pub bookmarks: Vec<BookmarkItem>,
}
