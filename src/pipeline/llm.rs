//! Vision-model interaction: one page image in, zero or more ToC entries out.
//!
//! The transport sits behind [`VisionClient`] so the extractor never knows
//! whether it is talking to an `edgequake_llm` provider, a raw
//! OpenAI-compatible endpoint, or a scripted fake in a test.
//!
//! ## Failure handling
//!
//! [`extract_page`] never returns `Err`. A transport failure or timeout
//! becomes a [`PageError`] on the [`PageResult`] and the page contributes
//! nothing. An answer the normalizer cannot read is not a failure at all:
//! the page simply has zero entries.
//!
//! With `max_retries > 0`, retryable failures (timeouts, connection errors,
//! 429 and 5xx) back off exponentially: `retry_backoff_ms * 2^(attempt-1)`,
//! capped at one minute.

use crate::config::ExtractionConfig;
use crate::error::{PageError, Pdf2TocError, TransportError};
use crate::output::PageResult;
use crate::pipeline::normalize::normalize_response;
use crate::pipeline::openai::OpenAiCompatibleClient;
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Default model when a provider is chosen without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// One page-image request.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    /// 1-indexed physical page number, for logging and fakes.
    pub page_num: usize,
    pub model: Option<String>,
    pub system_prompt: String,
    /// Base64 PNG of the rendered page.
    pub image: ImageData,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// Raw model answer for one page.
#[derive(Debug, Clone, Default)]
pub struct VisionResponse {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// A transport that can send one image-bearing chat request.
pub trait VisionClient: Send + Sync {
    fn complete<'a>(
        &'a self,
        request: &'a VisionRequest,
    ) -> BoxFuture<'a, Result<VisionResponse, TransportError>>;

    /// Short label for logs, e.g. `"openai/gpt-4o"`.
    fn describe(&self) -> String {
        "vision-client".to_string()
    }
}

/// [`VisionClient`] over an `edgequake_llm` provider.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

impl VisionClient for ProviderClient {
    fn complete<'a>(
        &'a self,
        request: &'a VisionRequest,
    ) -> BoxFuture<'a, Result<VisionResponse, TransportError>> {
        Box::pin(async move {
            let messages = vec![
                ChatMessage::system(request.system_prompt.as_str()),
                // Empty text: the image carries the content.
                ChatMessage::user_with_images("", vec![request.image.clone()]),
            ];
            let options = build_options(request);
            let response = self
                .provider
                .chat(&messages, Some(&options))
                .await
                .map_err(|e| TransportError::Provider(e.to_string()))?;
            Ok(VisionResponse {
                content: response.content,
                input_tokens: response.prompt_tokens,
                output_tokens: response.completion_tokens,
            })
        })
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

fn build_options(request: &VisionRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_tokens),
        response_format: Some("json_object".to_string()),
        ..Default::default()
    }
}

/// Build the request for one page from the run configuration.
pub fn build_request(page_num: usize, image: ImageData, config: &ExtractionConfig) -> VisionRequest {
    VisionRequest {
        page_num,
        model: config.model.clone(),
        system_prompt: config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        image,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    }
}

/// Send one page to the model and normalize the answer.
///
/// Always returns a `PageResult`; check `result.error`.
pub async fn extract_page(
    client: &dyn VisionClient,
    page_num: usize,
    image: ImageData,
    config: &ExtractionConfig,
) -> PageResult {
    let start = Instant::now();
    let request = build_request(page_num, image, config);
    let call_timeout = Duration::from_secs(config.api_timeout_secs);

    let mut last_err: Option<PageError> = None;
    let mut retries_used = 0;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            retries_used = attempt;
            let backoff = retry_backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_num, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let (err, retryable) = match timeout(call_timeout, client.complete(&request)).await {
            Ok(Ok(response)) => {
                let entries = normalize_response(&response.content, page_num);
                let duration = start.elapsed();
                debug!(
                    "Page {}: {} entries, {} input tokens, {} output tokens, {:?}",
                    page_num,
                    entries.len(),
                    response.input_tokens,
                    response.output_tokens,
                    duration
                );
                return PageResult {
                    page_num,
                    entries,
                    input_tokens: response.input_tokens,
                    output_tokens: response.output_tokens,
                    duration_ms: duration.as_millis() as u64,
                    retries: attempt,
                    error: None,
                };
            }
            Ok(Err(e)) => {
                warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, e);
                let retryable = e.is_retryable();
                (
                    PageError::LlmFailed {
                        page: page_num,
                        retries: attempt,
                        detail: e.to_string(),
                    },
                    retryable,
                )
            }
            Err(_) => {
                warn!(
                    "Page {}: attempt {} timed out after {}s",
                    page_num,
                    attempt + 1,
                    config.api_timeout_secs
                );
                (
                    PageError::Timeout {
                        page: page_num,
                        secs: config.api_timeout_secs,
                    },
                    true,
                )
            }
        };

        last_err = Some(err);
        if !retryable {
            break;
        }
    }

    let error = last_err.unwrap_or_else(|| PageError::LlmFailed {
        page: page_num,
        retries: config.max_retries,
        detail: "no attempt was made".to_string(),
    });
    let mut result = PageResult::failed(page_num, error, start.elapsed().as_millis() as u64);
    result.retries = retries_used;
    result
}

/// Upper bound on a single retry delay.
const MAX_BACKOFF_MS: u64 = 60_000;

/// `base * 2^(attempt-1)`, saturating, capped at [`MAX_BACKOFF_MS`].
fn retry_backoff_ms(base: u64, attempt: u32) -> u64 {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

fn provider_client(provider_name: &str, model: &str) -> Result<Arc<dyn VisionClient>, Pdf2TocError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2TocError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok(Arc::new(ProviderClient::new(
        provider,
        format!("{provider_name}/{model}"),
    )))
}

/// Resolve the vision client, from most to least specific.
///
/// 1. `config.client`, used as-is.
/// 2. `config.base_url` + `config.api_key`: a direct OpenAI-compatible endpoint.
/// 3. `config.provider_name` (+ `config.model`) via `ProviderFactory`.
/// 4. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set.
/// 5. OpenAI when `OPENAI_API_KEY` is set.
/// 6. `ProviderFactory::from_env` auto-detection.
pub fn resolve_client(config: &ExtractionConfig) -> Result<Arc<dyn VisionClient>, Pdf2TocError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }

    if let (Some(base_url), Some(api_key)) = (&config.base_url, &config.api_key) {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let client = OpenAiCompatibleClient::new(base_url, api_key, model, config.api_timeout_secs)?;
        info!("Using OpenAI-compatible endpoint {}", base_url);
        return Ok(Arc::new(client));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return provider_client(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return provider_client(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return provider_client("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2TocError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision model could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, pass --base-url with --api-key, or save settings.\n\
                Error: {e}"
            ),
        })?;
    Ok(Arc::new(ProviderClient::new(llm_provider, "auto")))
}
