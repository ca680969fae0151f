//! Pipeline stages for ToC extraction and bookmark writing.
//!
//! Each submodule implements one transformation step and is testable alone.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ normalize ──▶ outline
//! (URL/path)  (pdfium)  (base64)  (VLM)    (shapes)      (lopdf)
//! ```
//!
//! 1. [`input`]    : materialise a path, URL or buffer as a local PDF
//! 2. [`render`]   : rasterise one page behind the `PageRenderer` seam
//! 3. [`encode`]   : PNG-encode and base64-wrap the image
//! 4. [`llm`]      : the `VisionClient` seam, timeout and retry; [`openai`]
//!    is the direct HTTP transport
//! 5. [`normalize`]: model text → `TocEntry` list, never an error
//! 6. [`outline`]  : offset, clamp, and commit the document outline

pub mod encode;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod openai;
pub mod outline;
pub mod render;
