//! Direct client for OpenAI-compatible `/chat/completions` endpoints.
//!
//! Covers DeepSeek, OpenRouter, vLLM, LM Studio and anything else that speaks
//! the OpenAI chat schema with `image_url` content parts. Requests ask for
//! `response_format: json_object`; the normalizer accepts both a bare list
//! and an object wrapping one, so either answer works.

use crate::error::{Pdf2TocError, TransportError};
use crate::pipeline::encode::data_url;
use crate::pipeline::llm::{VisionClient, VisionRequest, VisionResponse};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// `VisionClient` over a raw OpenAI-compatible HTTP endpoint.
pub struct OpenAiCompatibleClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    json_mode: bool,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout_secs: u64,
    ) -> Result<Self, Pdf2TocError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Pdf2TocError::ProviderNotConfigured {
                provider: base_url.to_string(),
                hint: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            json_mode: true,
        })
    }

    /// Disable `response_format` for servers that reject it.
    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body<'a>(&'a self, request: &'a VisionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(&request.system_prompt),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(vec![ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url(&request.image),
                            detail: "high",
                        },
                    }]),
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: self.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }
}

impl VisionClient for OpenAiCompatibleClient {
    fn complete<'a>(
        &'a self,
        request: &'a VisionRequest,
    ) -> BoxFuture<'a, Result<VisionResponse, TransportError>> {
        Box::pin(async move {
            let url = self.endpoint();
            let body = self.build_body(request);

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| TransportError::Http {
                    url: url.clone(),
                    source: e,
                })?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    message: truncate(&message, 300),
                });
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
            let reply = into_vision_response(parsed);
            debug!(
                "Page {}: {} prompt tokens, {} completion tokens",
                request.page_num, reply.input_tokens, reply.output_tokens
            );
            Ok(reply)
        })
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.base_url, self.model)
    }
}

/// A missing or blank message becomes empty content; the normalizer turns
/// that into an empty page rather than a failure.
fn into_vision_response(parsed: ChatResponse) -> VisionResponse {
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    let usage = parsed.usage.unwrap_or_default();
    VisionResponse {
        content,
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::pipeline::llm::extract_page;
    use edgequake_llm::ImageData;
    use serde_json::{json, Value};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn client() -> OpenAiCompatibleClient {
        OpenAiCompatibleClient::new("https://api.deepseek.com/", "sk-test", "deepseek-chat", 30).unwrap()
    }

    fn request() -> VisionRequest {
        VisionRequest {
            page_num: 2,
            model: None,
            system_prompt: "Extract the ToC.".into(),
            image: ImageData::new("QUJD", "image/png").with_detail("high"),
            max_tokens: 2000,
            temperature: 0.1,
        }
    }

    #[test]
    fn endpoint_drops_trailing_slash() {
        assert_eq!(client().endpoint(), "https://api.deepseek.com/chat/completions");
    }

    #[test]
    fn body_matches_chat_completions_schema() {
        let c = client();
        let req = request();
        let body: Value = serde_json::to_value(c.build_body(&req)).unwrap();
        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["max_tokens"], 2000);
        assert_eq!(body["response_format"], json!({"type": "json_object"}));
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "Extract the ToC."}));
        assert_eq!(
            body["messages"][1]["content"][0],
            json!({
                "type": "image_url",
                "image_url": {"url": "data:image/png;base64,QUJD", "detail": "high"}
            })
        );
    }

    #[test]
    fn request_model_overrides_client_default() {
        let c = client();
        let mut req = request();
        req.model = Some("deepseek-vl".into());
        let body: Value = serde_json::to_value(c.build_body(&req)).unwrap();
        assert_eq!(body["model"], "deepseek-vl");
    }

    #[test]
    fn json_mode_can_be_disabled() {
        let c = client().with_json_mode(false);
        let req = request();
        let body: Value = serde_json::to_value(c.build_body(&req)).unwrap();
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn reply_content_and_usage_are_read() {
        let parsed: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "[]"}}],
            "usage": {"prompt_tokens": 812, "completion_tokens": 9}
        }))
        .unwrap();
        let reply = into_vision_response(parsed);
        assert_eq!(reply.content, "[]");
        assert_eq!(reply.input_tokens, 812);
        assert_eq!(reply.output_tokens, 9);
    }

    #[test]
    fn missing_content_reads_as_empty() {
        let parsed: ChatResponse =
            serde_json::from_value(json!({"choices": [{"message": {"content": null}}]})).unwrap();
        assert_eq!(into_vision_response(parsed).content, "");

        let parsed: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert_eq!(into_vision_response(parsed).content, "");
    }

    /// Serve one canned HTTP response on a loopback port.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            let reply = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/v1")
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + length {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn blank_reply_is_an_empty_page_not_a_failure() {
        let base = serve_once("200 OK", r#"{"choices":[{"message":{"content":""}}]}"#).await;
        let client = OpenAiCompatibleClient::new(&base, "sk-test", "deepseek-chat", 5).unwrap();
        let config = ExtractionConfig::default();

        let result = extract_page(&client, 1, request().image, &config).await;
        assert!(result.error.is_none(), "got {:?}", result.error);
        assert!(result.entries.is_empty());
    }

    #[tokio::test]
    async fn entries_arrive_through_the_wire() {
        let base = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"content":"{\"toc\":[{\"title\":\"Intro\",\"page\":3,\"level\":1}]}"}}],"usage":{"prompt_tokens":700,"completion_tokens":12}}"#,
        )
        .await;
        let client = OpenAiCompatibleClient::new(&base, "sk-test", "deepseek-chat", 5).unwrap();

        let result = extract_page(&client, 2, request().image, &ExtractionConfig::default()).await;
        assert!(result.error.is_none());
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].title, "Intro");
        assert_eq!(result.input_tokens, 700);
    }

    #[tokio::test]
    async fn server_error_is_a_page_failure() {
        let base = serve_once("503 Service Unavailable", r#"{"error":"overloaded"}"#).await;
        let client = OpenAiCompatibleClient::new(&base, "sk-test", "deepseek-chat", 5).unwrap();

        let result = extract_page(&client, 4, request().image, &ExtractionConfig::default()).await;
        assert!(matches!(
            result.error,
            Some(crate::error::PageError::LlmFailed { page: 4, .. })
        ));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let long = "x".repeat(1000);
        assert_eq!(truncate(&long, 300).chars().count(), 301);
        assert_eq!(truncate("short", 300), "short");
    }
}
