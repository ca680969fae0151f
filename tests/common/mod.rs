//! Shared fakes for integration tests: no pdfium, no network.

#![allow(dead_code)]

use edgequake_pdf2toc::{
    PageError, PageRenderer, TransportError, VisionClient, VisionRequest, VisionResponse,
};
use futures::future::BoxFuture;
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// Renders every page as a small white image; listed pages fail.
pub struct FakeRenderer {
    pub pages: usize,
    pub broken: HashSet<usize>,
}

impl FakeRenderer {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            broken: HashSet::new(),
        }
    }

    /// Make the 1-indexed `page_num` fail to render.
    pub fn with_broken(mut self, page_num: usize) -> Self {
        self.broken.insert(page_num);
        self
    }
}

impl PageRenderer for FakeRenderer {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn render_page(&self, index: usize, _dpi: u32, _max_pixels: u32) -> Result<DynamicImage, PageError> {
        if index >= self.pages || self.broken.contains(&(index + 1)) {
            return Err(PageError::RenderFailed {
                page: index + 1,
                detail: "synthetic render failure".into(),
            });
        }
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([255, 255, 255]))))
    }
}

pub enum Reply {
    Text(String),
    Fail(u16),
    /// Answer after a delay, to shuffle completion order under concurrency.
    Slow(u64, String),
}

/// Answers by physical page number; pages with no script reply `[]`.
pub struct ScriptedClient {
    replies: HashMap<usize, Reply>,
    pub seen_pages: Mutex<Vec<usize>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            seen_pages: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, page_num: usize, text: &str) -> Self {
        self.replies.insert(page_num, Reply::Text(text.to_string()));
        self
    }

    pub fn fail(mut self, page_num: usize, status: u16) -> Self {
        self.replies.insert(page_num, Reply::Fail(status));
        self
    }

    pub fn slow(mut self, page_num: usize, millis: u64, text: &str) -> Self {
        self.replies
            .insert(page_num, Reply::Slow(millis, text.to_string()));
        self
    }
}

impl VisionClient for ScriptedClient {
    fn complete<'a>(
        &'a self,
        request: &'a VisionRequest,
    ) -> BoxFuture<'a, Result<VisionResponse, TransportError>> {
        self.seen_pages.lock().unwrap().push(request.page_num);
        self.prompts
            .lock()
            .unwrap()
            .push(request.system_prompt.clone());
        Box::pin(async move {
            let ok = |content: &str| VisionResponse {
                content: content.to_string(),
                input_tokens: 1000,
                output_tokens: 50,
            };
            match self.replies.get(&request.page_num) {
                None => Ok(ok("[]")),
                Some(Reply::Text(t)) => Ok(ok(t)),
                Some(Reply::Fail(status)) => Err(TransportError::Status {
                    status: *status,
                    message: "scripted failure".into(),
                }),
                Some(Reply::Slow(ms, t)) => {
                    tokio::time::sleep(Duration::from_millis(*ms)).await;
                    Ok(ok(t))
                }
            }
        })
    }

    fn describe(&self) -> String {
        "scripted".into()
    }
}

#[path = "../../src/test_support.rs"]
mod test_support;

pub use test_support::{blank_pdf, blank_pdf_bytes};
