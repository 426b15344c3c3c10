//! Gemini REST client.
//!
//! Talks to the Generative Language API directly with `reqwest`:
//!
//! * `POST {base}/models/{model}:generateContent`: image as `inlineData`
//!   followed by the prompt text, in a single user turn.
//! * `GET {base}/models`: paginated model listing for the model picker.
//!
//! The API key is sent in the `x-goog-api-key` header rather than the query
//! string so it never shows up in request logs.

use crate::config::{ConverterConfig, DEFAULT_MODEL};
use crate::error::Image2HtmlError;
use crate::pipeline::encode;
use crate::pipeline::llm::{ConversionRequest, GenerationService, ModelInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Environment variables consulted for the API key, in order.
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Upper bound on listing pages followed.
const MAX_LIST_PAGES: usize = 10;

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<WireModel>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireModel {
    name: String,
    display_name: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

// ── Pure helpers ─────────────────────────────────────────────────────────

/// Build the `generateContent` body: image part first, prompt second.
pub fn build_generate_body(
    request: &ConversionRequest,
    temperature: f32,
    max_output_tokens: usize,
) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: request.image().media_type().to_string(),
                        data: encode::encode_base64(request.image()),
                    }),
                },
                Part {
                    text: Some(request.prompt().to_string()),
                    inline_data: None,
                },
            ],
        }],
        generation_config: GenerationConfig {
            temperature,
            max_output_tokens,
        },
    }
}

/// Concatenate the text parts of the first candidate.
///
/// Absent or whitespace-only text is a generation error, never an empty
/// fragment.
pub fn extract_text(response: &GenerateContentResponse) -> Result<String, Image2HtmlError> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(Image2HtmlError::generation(format!(
            "prompt blocked: {reason}"
        )));
    }

    let candidate = response
        .candidates
        .first()
        .ok_or_else(|| Image2HtmlError::generation("response contained no candidates"))?;

    let text: String = candidate
        .content
        .as_ref()
        .map(|c| {
            c.parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(Image2HtmlError::generation(format!(
            "response text was empty (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(text)
}

/// Model id without a `models/` resource prefix.
pub fn model_path(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

/// Summarise an error response body for logs.
fn describe_error_body(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => format!("HTTP {status} {}: {}", env.error.status, env.error.message),
        Err(_) => {
            let snippet: String = body.chars().take(200).collect();
            format!("HTTP {status}: {snippet}")
        }
    }
}

// ── Service ──────────────────────────────────────────────────────────────

/// [`GenerationService`] speaking the Gemini REST API.
pub struct GeminiService {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    temperature: f32,
    max_output_tokens: usize,
}

impl GeminiService {
    /// Build from config. The key comes from `config.api_key`, else the
    /// first non-empty variable in [`API_KEY_VARS`]. A missing key is only
    /// reported by [`GenerationService::ensure_credential`].
    pub fn from_config(config: &ConverterConfig) -> Result<Self, Image2HtmlError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                API_KEY_VARS
                    .iter()
                    .filter_map(|v| std::env::var(v).ok())
                    .find(|k| !k.trim().is_empty())
            });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| Image2HtmlError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn key(&self) -> Result<&str, Image2HtmlError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Image2HtmlError::MissingCredential {
                var: API_KEY_VARS[0].to_string(),
            })
    }

    fn transport_error(e: reqwest::Error) -> Image2HtmlError {
        if e.is_timeout() {
            Image2HtmlError::generation(format!("request timed out: {e}"))
        } else {
            Image2HtmlError::generation(format!("transport error: {e}"))
        }
    }
}

#[async_trait]
impl GenerationService for GeminiService {
    fn name(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    fn ensure_credential(&self) -> Result<(), Image2HtmlError> {
        self.key().map(|_| ())
    }

    async fn generate(&self, request: &ConversionRequest) -> Result<String, Image2HtmlError> {
        let key = self.key()?;
        let start = Instant::now();
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url,
            model_path(request.model())
        );
        let body = build_generate_body(request, self.temperature, self.max_output_tokens);

        info!("Invoking model: {}", request.model());
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, key)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(Self::transport_error)?;
        if !status.is_success() {
            let detail = describe_error_body(status, &text);
            warn!("gemini: generateContent failed: {}", detail);
            return Err(Image2HtmlError::generation(detail));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| Image2HtmlError::generation(format!("malformed response: {e}")))?;

        if let Some(ref usage) = parsed.usage_metadata {
            debug!(
                "gemini: {} input tokens, {} output tokens, {:?}",
                usage.prompt_token_count,
                usage.candidates_token_count,
                start.elapsed()
            );
        }
        extract_text(&parsed)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, Image2HtmlError> {
        let key = self.key()?;
        let url = format!("{}/models", self.base_url);
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let mut req = self
                .client
                .get(&url)
                .header(API_KEY_HEADER, key)
                .query(&[("pageSize", "1000")]);
            if let Some(ref token) = page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }

            let response = req.send().await.map_err(Self::transport_error)?;
            let status = response.status();
            let text = response.text().await.map_err(Self::transport_error)?;
            if !status.is_success() {
                return Err(Image2HtmlError::generation(describe_error_body(status, &text)));
            }

            let page: ListModelsResponse = serde_json::from_str(&text)
                .map_err(|e| Image2HtmlError::generation(format!("malformed model list: {e}")))?;
            models.extend(page.models.into_iter().map(|m| ModelInfo {
                name: m.name,
                display_name: m.display_name,
                supported_generation_methods: m.supported_generation_methods,
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("gemini: listed {} models", models.len());
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionOptions;
    use crate::pipeline::input::ImageAsset;

    fn request() -> ConversionRequest {
        let image = ImageAsset::new(vec![1u8, 2, 3], "image/png").unwrap();
        ConversionRequest::new(image, ConversionOptions::default(), "gemini-2.5-flash", "make html")
    }

    #[test]
    fn body_puts_image_before_prompt() {
        let body = build_generate_body(&request(), 0.2, 4096);
        let json = serde_json::to_value(&body).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], "AQID");
        assert!(parts[0].get("text").is_none());
        assert_eq!(parts[1]["text"], "make html");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 4096);
    }

    #[test]
    fn extract_joins_text_parts() {
        let resp: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"<div>"},{"text":"</div>"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(&resp).unwrap(), "<div></div>");
    }

    #[test]
    fn extract_empty_text_is_generation_error() {
        let resp: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"  "}]},"finishReason":"MAX_TOKENS"}]}"#,
        )
        .unwrap();
        match extract_text(&resp) {
            Err(Image2HtmlError::Generation { detail }) => assert!(detail.contains("MAX_TOKENS")),
            other => panic!("expected generation error, got {other:?}"),
        }
    }

    #[test]
    fn extract_absent_candidates_is_generation_error() {
        let resp = GenerateContentResponse::default();
        assert!(matches!(
            extract_text(&resp),
            Err(Image2HtmlError::Generation { .. })
        ));
    }

    #[test]
    fn extract_blocked_prompt() {
        let resp: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        match extract_text(&resp) {
            Err(Image2HtmlError::Generation { detail }) => assert!(detail.contains("SAFETY")),
            other => panic!("expected generation error, got {other:?}"),
        }
    }

    #[test]
    fn model_path_strips_prefix() {
        assert_eq!(model_path("models/gemini-2.5-pro"), "gemini-2.5-pro");
        assert_eq!(model_path("gemini-2.5-pro"), "gemini-2.5-pro");
    }

    #[test]
    fn error_body_is_summarised() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        let s = describe_error_body(reqwest::StatusCode::TOO_MANY_REQUESTS, body);
        assert!(s.contains("RESOURCE_EXHAUSTED"));
        assert!(s.contains("Quota exceeded"));
        let raw = describe_error_body(reqwest::StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert!(raw.contains("bad gateway"));
    }

    #[test]
    fn explicit_key_satisfies_credential_check() {
        let config = ConverterConfig::builder().api_key("k-123").build().unwrap();
        let svc = GeminiService::from_config(&config).unwrap();
        assert!(svc.ensure_credential().is_ok());
    }

    #[test]
    fn blank_explicit_key_is_ignored() {
        let config = ConverterConfig::builder().api_key("   ").build().unwrap();
        let svc = GeminiService::from_config(&config).unwrap();
        // Falls through to the environment; only assert the explicit blank
        // key was not taken as-is.
        assert_ne!(svc.api_key.as_deref(), Some("   "));
    }
}
