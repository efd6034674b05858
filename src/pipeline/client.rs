//! Inference: send one page image to an OpenAI-compatible chat-completions
//! endpoint and classify what came back.
//!
//! The request is a single user turn holding the instruction text and the
//! page as a `data:image/png;base64,...` URL. Responses are sorted into an
//! [`InferenceOutcome`]; retry decisions are made by
//! [`crate::pipeline::retry`], never here.

use crate::config::ExtractionConfig;
use crate::error::ScribeError;
use crate::pipeline::encode::EncodedPage;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Longest slice of an error response body kept in a failure detail.
const ERROR_BODY_PREVIEW_CHARS: usize = 300;

/// What a single inference call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceOutcome {
    /// The service answered; the text may be empty.
    Text(String),
    /// HTTP 429. Back off before trying again.
    RateLimited { detail: String },
    /// Non-2xx status, malformed body, timeout, or transport failure.
    Transient { detail: String, timed_out: bool },
    /// The request could not be made at all; retrying cannot help.
    Fatal { detail: String },
}

impl InferenceOutcome {
    pub fn transient(detail: impl Into<String>) -> Self {
        InferenceOutcome::Transient {
            detail: detail.into(),
            timed_out: false,
        }
    }
}

/// One remote transcription call per page.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn transcribe(&self, page: &EncodedPage) -> InferenceOutcome;
}

// ── Wire types ───────────────────────────────────────────────────────────

/// Chat-completions request body.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

// ── Classification ───────────────────────────────────────────────────────

/// Classify an HTTP response by status and body.
pub fn classify_response(status: StatusCode, body: &str) -> InferenceOutcome {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return InferenceOutcome::RateLimited {
            detail: format!("HTTP {}", status),
        };
    }

    if status != StatusCode::OK {
        return InferenceOutcome::transient(format!(
            "HTTP {}: {}",
            status,
            preview(body)
        ));
    }

    match serde_json::from_str::<ChatResponse>(body) {
        Ok(parsed) => match parsed.choices.into_iter().next() {
            Some(choice) => InferenceOutcome::Text(
                choice
                    .message
                    .and_then(|m| m.content)
                    .unwrap_or_default(),
            ),
            None => InferenceOutcome::transient("response contained no choices"),
        },
        Err(e) => InferenceOutcome::transient(format!("malformed response body: {}", e)),
    }
}

/// Classify a `reqwest` failure that happened before a status was available.
pub fn classify_transport_error(e: &reqwest::Error) -> InferenceOutcome {
    if e.is_builder() {
        InferenceOutcome::Fatal {
            detail: format!("invalid request: {}", e),
        }
    } else if e.is_timeout() {
        InferenceOutcome::Transient {
            detail: format!("request timed out: {}", e),
            timed_out: true,
        }
    } else {
        InferenceOutcome::transient(format!("request failed: {}", e))
    }
}

fn preview(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > ERROR_BODY_PREVIEW_CHARS {
        let head: String = trimmed.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
        format!("{}\u{2026}", head)
    } else {
        trimmed.to_string()
    }
}

// ── HTTP client ──────────────────────────────────────────────────────────

/// [`InferenceClient`] that POSTs directly to the configured endpoint.
pub struct HttpInferenceClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    instruction: String,
    max_tokens: usize,
    temperature: f32,
}

impl std::fmt::Debug for HttpInferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpInferenceClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl HttpInferenceClient {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ScribeError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ScribeError::MissingApiKey)?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ScribeError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            instruction: config.instruction_text().to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// The request body for `page`.
    pub fn build_request(&self, page: &EncodedPage) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: &self.instruction,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: page.data_url(),
                        },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn transcribe(&self, page: &EncodedPage) -> InferenceOutcome {
        let body = self.build_request(page);

        let response = match self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return classify_transport_error(&e),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => return classify_transport_error(&e),
        };
        debug!(
            "Page {}: HTTP {} with {} byte body",
            page.page_num,
            status,
            text.len()
        );

        classify_response(status, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> EncodedPage {
        EncodedPage {
            page_num: 1,
            base64: "iVBORw0KGgo=".into(),
            mime_type: "image/png",
            width: 1,
            height: 1,
        }
    }

    fn client() -> HttpInferenceClient {
        let config = ExtractionConfig::builder()
            .api_key("sk-test")
            .model("vision-model")
            .max_tokens(1234)
            .temperature(0.2)
            .build()
            .unwrap();
        HttpInferenceClient::new(&config).unwrap()
    }

    #[test]
    fn request_body_shape() {
        let c = client();
        let v = serde_json::to_value(c.build_request(&page())).unwrap();

        assert_eq!(v["model"], "vision-model");
        assert_eq!(v["max_tokens"], 1234);
        assert!((v["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(v["messages"].as_array().unwrap().len(), 1);
        assert_eq!(v["messages"][0]["role"], "user");

        let content = &v["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], crate::prompts::DEFAULT_INSTRUCTION);
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(
            content[1]["image_url"]["url"],
            "data:image/png;base64,iVBORw0KGgo="
        );
    }

    #[test]
    fn new_requires_key() {
        let config = ExtractionConfig::default();
        assert!(matches!(
            HttpInferenceClient::new(&config),
            Err(ScribeError::MissingApiKey)
        ));
    }

    #[test]
    fn ok_response_yields_text() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Hello page"}}]}"#;
        assert_eq!(
            classify_response(StatusCode::OK, body),
            InferenceOutcome::Text("Hello page".into())
        );
    }

    #[test]
    fn ok_response_with_empty_or_null_content_is_still_text() {
        let empty = r#"{"choices":[{"message":{"content":""}}]}"#;
        let null = r#"{"choices":[{"message":{"content":null}}]}"#;
        let missing = r#"{"choices":[{}]}"#;
        for body in [empty, null, missing] {
            assert_eq!(
                classify_response(StatusCode::OK, body),
                InferenceOutcome::Text(String::new()),
                "body: {body}"
            );
        }
    }

    #[test]
    fn ok_response_without_choices_is_transient() {
        let outcome = classify_response(StatusCode::OK, r#"{"choices":[]}"#);
        assert!(matches!(outcome, InferenceOutcome::Transient { timed_out: false, .. }));
    }

    #[test]
    fn malformed_body_is_transient() {
        let outcome = classify_response(StatusCode::OK, "<html>oops</html>");
        match outcome {
            InferenceOutcome::Transient { detail, .. } => assert!(detail.contains("malformed")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn status_429_is_rate_limited() {
        let outcome = classify_response(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(outcome, InferenceOutcome::RateLimited { .. }));
    }

    #[test]
    fn other_statuses_are_transient_with_detail() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            match classify_response(status, "{\"error\":\"nope\"}") {
                InferenceOutcome::Transient { detail, timed_out } => {
                    assert!(detail.contains(status.as_str()), "detail: {detail}");
                    assert!(detail.contains("nope"));
                    assert!(!timed_out);
                }
                other => panic!("unexpected outcome for {status}: {other:?}"),
            }
        }
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(5000);
        match classify_response(StatusCode::BAD_GATEWAY, &body) {
            InferenceOutcome::Transient { detail, .. } => assert!(detail.len() < 400),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn non_200_success_status_is_transient() {
        let body = r#"{"choices":[{"message":{"content":"x"}}]}"#;
        assert!(matches!(
            classify_response(StatusCode::NO_CONTENT, body),
            InferenceOutcome::Transient { .. }
        ));
    }

    // ── Over the wire ────────────────────────────────────────────────────

    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = stream.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let body_len = text[..end]
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serve one request with `status` and `body` after `delay`; yields the raw request.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
        delay: Duration,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!(
            "http://{}/v1/chat/completions",
            listener.local_addr().unwrap()
        );
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            tokio::time::sleep(delay).await;
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
            request
        });
        (endpoint, handle)
    }

    fn client_for(endpoint: &str) -> HttpInferenceClient {
        let config = ExtractionConfig::builder()
            .api_key("sk-wire")
            .endpoint(endpoint)
            .model("vision-model")
            .request_timeout_secs(1)
            .build()
            .unwrap();
        HttpInferenceClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn posts_to_endpoint_with_bearer_key() {
        let (endpoint, server) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"content":"wire text"}}]}"#,
            Duration::ZERO,
        )
        .await;

        let outcome = client_for(&endpoint).transcribe(&page()).await;
        assert_eq!(outcome, InferenceOutcome::Text("wire text".into()));

        let request = server.await.unwrap();
        assert!(
            request.starts_with("POST /v1/chat/completions "),
            "request: {request}"
        );
        assert!(request
            .to_lowercase()
            .contains("authorization: bearer sk-wire"));
        assert!(request.contains("\"model\":\"vision-model\""));
        assert!(request.contains("data:image/png;base64,iVBORw0KGgo="));
    }

    #[tokio::test]
    async fn wire_429_is_rate_limited() {
        let (endpoint, server) = serve_once(
            "429 Too Many Requests",
            r#"{"error":"slow down"}"#,
            Duration::ZERO,
        )
        .await;

        let outcome = client_for(&endpoint).transcribe(&page()).await;
        assert!(
            matches!(outcome, InferenceOutcome::RateLimited { .. }),
            "outcome: {outcome:?}"
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn slow_response_is_a_flagged_timeout() {
        let (endpoint, server) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"content":"too late"}}]}"#,
            Duration::from_secs(3),
        )
        .await;

        let outcome = client_for(&endpoint).transcribe(&page()).await;
        match outcome {
            InferenceOutcome::Transient { timed_out, detail } => {
                assert!(timed_out, "detail: {detail}")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        server.abort();
    }
}
