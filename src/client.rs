//! Inference client adapter.
//!
//! One request/response exchange with the remote vision service per item.
//! The [`CaptionClient`] trait is the seam the dispatcher works against;
//! async methods return boxed futures so the trait is dyn-compatible (can be
//! used as `Arc<dyn CaptionClient>`). No `async_trait` macro is needed.
//!
//! [`DashScopeClient`] is the live implementation, speaking the DashScope
//! multimodal-generation HTTP API.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::PromptsConfig;
use crate::error::ClientError;

/// Default API endpoint. The mainland endpoint rejects international keys,
/// so the international one is the default; override via `DASHSCOPE_BASE_URL`.
pub const DEFAULT_BASE_URL: &str = "https://dashscope-intl.aliyuncs.com/api/v1";

/// Seconds to wait after a 429 without a Retry-After header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Request timeout. Video understanding calls are slow; the service uploads
/// and samples the full clip before answering.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Token usage reported by the service for one exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One captioning request.
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    pub video_path: std::path::PathBuf,
    /// Full prompt text (system instruction with schema plus user prompt).
    pub prompt: String,
    pub model: String,
    /// Frame sampling rate forwarded to the service.
    pub fps: f64,
}

/// Raw text plus usage from one successful exchange.
#[derive(Debug, Clone)]
pub struct CaptionResponse {
    pub text: String,
    pub usage: Usage,
}

// ---------------------------------------------------------------------------
// CaptionClient trait
// ---------------------------------------------------------------------------

/// One request/response exchange with the inference service.
pub trait CaptionClient: Send + Sync {
    /// Caption a single video. Rate-limit rejections surface as
    /// [`ClientError::RateLimited`], everything else as the other variants;
    /// the caller decides what is retryable.
    fn describe(
        &self,
        request: &CaptionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CaptionResponse, ClientError>> + Send + '_>>;
}

// ---------------------------------------------------------------------------
// Prompt composition
// ---------------------------------------------------------------------------

/// Build the full prompt: system instruction with the response schema
/// injected, then the user prompt.
pub fn compose_prompt(prompts: &PromptsConfig, schema: &serde_json::Value) -> String {
    let schema_str = serde_json::to_string_pretty(schema).unwrap_or_default();
    format!(
        "{system}\n\nIMPORTANT: You must strictly follow this JSON schema:\n{schema_str}\n\n{user}",
        system = prompts.system,
        user = prompts.user,
    )
}

// ---------------------------------------------------------------------------
// DashScope client
// ---------------------------------------------------------------------------

/// HTTP client for the DashScope multimodal-generation endpoint.
pub struct DashScopeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl DashScopeClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let http = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build HTTP client with timeout; using defaults");
                reqwest::Client::default()
            }
        };

        Self {
            http,
            base_url,
            api_key,
        }
    }

    async fn call(&self, request: CaptionRequest) -> Result<CaptionResponse, ClientError> {
        // Local files must be referenced by absolute file:// URI.
        let abs_path = std::path::absolute(&request.video_path)?;
        let file_uri = format!("file://{}", abs_path.display());

        let body = json!({
            "model": request.model,
            "input": {
                "messages": [{
                    "role": "user",
                    "content": [
                        { "video": file_uri, "fps": request.fps },
                        { "text": request.prompt },
                    ],
                }],
            },
            "parameters": {
                "result_format": "message",
                "response_format": { "type": "json_object" },
            },
        });

        let url = format!(
            "{}/services/aigc/multimodal-generation/generation",
            self.base_url.trim_end_matches('/')
        );

        debug!(model = %request.model, fps = request.fps, "Sending caption request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body_text = response.text().await.unwrap_or_default();
            return Err(error_for_status(status.as_u16(), &body_text, retry_after));
        }

        let payload: GenerationResponse = response.json().await?;
        let text = payload.caption_text().ok_or(ClientError::EmptyResponse)?;
        let usage = payload.usage();

        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Caption response received"
        );

        Ok(CaptionResponse { text, usage })
    }
}

impl CaptionClient for DashScopeClient {
    fn describe(
        &self,
        request: &CaptionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CaptionResponse, ClientError>> + Send + '_>> {
        let request = request.clone();
        Box::pin(async move { self.call(request).await })
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Map a non-success HTTP status to a [`ClientError`], keeping 429
/// distinguishable from generic API failures.
fn error_for_status(status: u16, body: &str, retry_after: Option<u64>) -> ClientError {
    if status == 429 {
        return ClientError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        };
    }

    // DashScope error bodies carry {"code": ..., "message": ...}.
    let message = serde_json::from_str::<ApiError>(body)
        .map(|e| match e.code {
            Some(code) => format!("{code} - {message}", message = e.message),
            None => e.message,
        })
        .unwrap_or_else(|_| body.trim().to_string());

    ClientError::Api { status, message }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    output: Option<GenerationOutput>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct GenerationOutput {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: MessageContent,
}

/// The content of a message is either a plain string or an array of parts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl GenerationResponse {
    /// Concatenated text of the first choice's message, if any.
    fn caption_text(&self) -> Option<String> {
        let choice = self.output.as_ref()?.choices.first()?;
        let text = match &choice.message.content {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .concat(),
        };
        if text.is_empty() { None } else { Some(text) }
    }

    fn usage(&self) -> Usage {
        self.usage
            .as_ref()
            .map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
