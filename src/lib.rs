//! # edgequake-pdf2toc
//!
//! Read a PDF's printed table of contents with a vision model and write it
//! back as navigable bookmarks.
//!
//! Scanned books and many exported PDFs ship without an outline even though
//! the ToC pages are right there. Text extraction falls apart on dot leaders,
//! dual columns and roman-numeral front matter; a vision model reads them the
//! way a person does. The hard part is what comes back: the model's JSON
//! arrives in several shapes, with stringly page numbers, and printed page
//! numbers are not physical page numbers. This crate normalizes the answer,
//! applies a page offset, clamps every target into the document, and
//! replaces the outline.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file, URL download or byte buffer
//!  ├─ 2. Render     rasterise the ToC page range via pdfium (spawn_blocking)
//!  ├─ 3. Encode     PNG → base64 ImageData, detail "high"
//!  ├─ 4. VLM        one call per page, JSON requested
//!  ├─ 5. Normalize  bare list / {"toc": …} / first list member → TocEntry
//!  └─ 6. Outline    + offset, clamp to [1, page_count], commit via lopdf
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2toc::{bookmark_to_file, ExtractionConfig, PageRange};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // ToC printed on physical pages 3–6; chapter 1 ("page 1") is physical page 15.
//!     let config = ExtractionConfig::builder()
//!         .pages(PageRange::new(3, 6))
//!         .page_offset(14)
//!         .build()?;
//!     let report = bookmark_to_file("book.pdf", "bookmarked_book.pdf", &config).await?;
//!     for item in &report.bookmarks {
//!         println!("{}{} → p.{}", "  ".repeat(item.level.max(1) as usize - 1), item.title, item.page);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2toc` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ```toml
//! edgequake-pdf2toc = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Model
//!
//! Any vision-capable chat model works. Connect either through an
//! `edgequake_llm` provider (auto-detected from `OPENAI_API_KEY`,
//! `ANTHROPIC_API_KEY`, …) or directly to an OpenAI-compatible endpoint with
//! [`ExtractionConfigBuilder::base_url`] and [`ExtractionConfigBuilder::api_key`].
//! ToC pages are few, so a stronger model costs little more per book.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_support;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageRange};
pub use error::{PageError, Pdf2TocError, TransportError};
pub use extract::{
    bookmark_sync, bookmark_to_bytes, bookmark_to_file, bookmark_with, default_output_path,
    extract, extract_with, inspect, write_bookmarks,
};
pub use output::{
    BookmarkItem, BookmarkReport, DocumentInfo, ExtractionOutput, ExtractionStats, PageResult,
    TocEntry,
};
pub use pipeline::llm::{VisionClient, VisionRequest, VisionResponse};
pub use pipeline::outline::{map_entries, read_outline};
pub use pipeline::render::PageRenderer;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use settings::Settings;
