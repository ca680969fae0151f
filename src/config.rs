//! Configuration types for table-of-contents extraction.
//!
//! Every knob of a run lives in one [`ExtractionConfig`] value, built via
//! [`ExtractionConfigBuilder`] and passed in at call time. There is no
//! process-wide default state: two runs with two configs never interfere.

use crate::error::Pdf2TocError;
use crate::pipeline::llm::VisionClient;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for one extraction run.
///
/// # Example
/// ```rust
/// use edgequake_pdf2toc::{ExtractionConfig, PageRange};
///
/// let config = ExtractionConfig::builder()
///     .pages(PageRange::new(3, 6))
///     .page_offset(14)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.page_offset, 14);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI for ToC pages. Range: 72–600. Default: 300.
    ///
    /// ToC pages are dense with small print and dotted leaders; 300 DPI keeps
    /// page numbers legible to the model.
    pub dpi: u32,

    /// Cap on either rendered image edge, in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Contiguous page range believed to contain the table of contents.
    pub pages: PageRange,

    /// Added to every extracted page number (printed → physical). Default: 0.
    ///
    /// Negative when printed numbers run ahead of physical positions,
    /// positive when front matter pushes chapter 1 further into the file.
    pub page_offset: i64,

    /// Model identifier, e.g. "gpt-4o", "deepseek-chat".
    pub model: Option<String>,

    /// `edgequake_llm` provider name ("openai", "anthropic", "gemini", …).
    pub provider_name: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint, e.g. `https://openrouter.ai/api/v1`.
    ///
    /// When set together with `api_key`, requests go straight to
    /// `{base_url}/chat/completions` instead of through an `edgequake_llm` provider.
    pub base_url: Option<String>,

    /// Bearer key for `base_url`.
    pub api_key: Option<String>,

    /// Pre-constructed client. Takes precedence over everything else.
    pub client: Option<Arc<dyn VisionClient>>,

    /// Sampling temperature. Default: 0.1 (near-deterministic structured output).
    pub temperature: f32,

    /// Maximum output tokens per page. Default: 2000.
    pub max_tokens: usize,

    /// Per-call timeout in seconds. Default: 30.
    pub api_timeout_secs: u64,

    /// Retries on a transient transport failure. Default: 0 (a failed page is skipped).
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Pages in flight at once. Default: 1 (strictly sequential).
    ///
    /// Results are always reassembled in page order regardless of this value.
    pub concurrency: usize,

    /// Custom system prompt. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 4000,
            pages: PageRange::default(),
            page_offset: 0,
            model: None,
            provider_name: None,
            base_url: None,
            api_key: None,
            client: None,
            temperature: 0.1,
            max_tokens: 2000,
            api_timeout_secs: 30,
            max_retries: 0,
            retry_backoff_ms: 500,
            concurrency: 1,
            system_prompt: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pages", &self.pages)
            .field("page_offset", &self.page_offset)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("client", &self.client.as_ref().map(|_| "<dyn VisionClient>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pages(mut self, range: PageRange) -> Self {
        self.config.pages = range;
        self
    }

    pub fn page_offset(mut self, offset: i64) -> Self {
        self.config.page_offset = offset;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn client(mut self, client: Arc<dyn VisionClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2TocError> {
        let c = &self.config;
        if c.pages.start == 0 || c.pages.start > c.pages.end {
            return Err(Pdf2TocError::InvalidPageRange {
                start: c.pages.start,
                end: c.pages.end,
            });
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2TocError::InvalidConfig(
                "API timeout must be at least 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(Pdf2TocError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

/// A contiguous, 1-indexed, inclusive page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl Default for PageRange {
    /// The first ten pages; clipped to the document when resolved.
    fn default() -> Self {
        Self { start: 1, end: 10 }
    }
}

impl PageRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(page: usize) -> Self {
        Self {
            start: page,
            end: page,
        }
    }

    /// Resolve to 0-indexed page indices, clipping `end` to the document.
    ///
    /// A range that starts past the last page is an error rather than an
    /// empty run, so the caller hears about the typo.
    pub fn to_indices(&self, total_pages: usize) -> Result<Vec<usize>, Pdf2TocError> {
        if self.start == 0 || self.start > self.end {
            return Err(Pdf2TocError::InvalidPageRange {
                start: self.start,
                end: self.end,
            });
        }
        if self.start > total_pages {
            return Err(Pdf2TocError::PageOutOfRange {
                page: self.start,
                total: total_pages,
            });
        }
        let end = self.end.min(total_pages);
        Ok((self.start - 1..end).collect())
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_low_temperature_operation() {
        let c = ExtractionConfig::default();
        assert_eq!(c.dpi, 300);
        assert_eq!(c.max_tokens, 2000);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_retries, 0);
        assert!((c.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(c.pages, PageRange::new(1, 10));
    }

    #[test]
    fn builder_clamps_out_of_range_values() {
        let c = ExtractionConfig::builder()
            .dpi(5000)
            .temperature(9.0)
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 600);
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn builder_rejects_inverted_range() {
        let err = ExtractionConfig::builder()
            .pages(PageRange::new(8, 3))
            .build()
            .unwrap_err();
        assert!(matches!(err, Pdf2TocError::InvalidPageRange { start: 8, end: 3 }));
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ExtractionConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn range_clips_to_document() {
        assert_eq!(PageRange::new(3, 10).to_indices(4).unwrap(), vec![2, 3]);
        assert_eq!(PageRange::single(1).to_indices(1).unwrap(), vec![0]);
    }

    #[test]
    fn range_past_end_is_an_error() {
        let err = PageRange::new(9, 12).to_indices(5).unwrap_err();
        assert!(matches!(err, Pdf2TocError::PageOutOfRange { page: 9, total: 5 }));
    }

    #[test]
    fn zero_start_is_invalid() {
        assert!(PageRange::new(0, 2).to_indices(5).is_err());
    }
}
