//! Generation-service boundary: the request type, the [`GenerationService`]
//! trait, and the adapter over `edgequake-llm` providers.
//!
//! The pipeline treats the service as opaque: anything that can take a model
//! id, an image and a prompt and return text satisfies the contract. Two
//! implementations ship with the crate:
//!
//! * [`crate::pipeline::gemini::GeminiService`]: direct REST client, the
//!   default backend.
//! * [`LlmProviderService`]: any provider `edgequake_llm::ProviderFactory`
//!   can build (OpenAI, Anthropic, Ollama, …).
//!
//! Services never retry. A failed call is reported once and the caller
//! decides whether to try again.

use crate::config::{ConversionOptions, ConverterConfig, DEFAULT_MODEL};
use crate::error::Image2HtmlError;
use crate::pipeline::encode;
use crate::pipeline::input::ImageAsset;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Generation method a model must support to be offered for conversion.
pub const GENERATE_CONTENT_METHOD: &str = "generateContent";

/// One request to the generation service. Built fresh per attempt and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    image: ImageAsset,
    options: ConversionOptions,
    model: String,
    prompt: String,
}

impl ConversionRequest {
    /// `model` is the resolved model id (options override or service default).
    pub fn new(
        image: ImageAsset,
        options: ConversionOptions,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            image,
            options,
            model: model.into(),
            prompt: prompt.into(),
        }
    }

    pub fn image(&self) -> &ImageAsset {
        &self.image
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// A model advertised by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Full resource name, e.g. `models/gemini-2.5-flash`.
    pub name: String,
    pub display_name: Option<String>,
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    /// True when the model can serve content-generation requests.
    pub fn supports_generation(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == GENERATE_CONTENT_METHOD)
    }
}

/// An external image-to-text generation service.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Model used when the options do not name one.
    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    /// Verify a credential is configured. Called before any network I/O.
    fn ensure_credential(&self) -> Result<(), Image2HtmlError> {
        Ok(())
    }

    /// Send the image and prompt; return the raw generated text.
    async fn generate(&self, request: &ConversionRequest) -> Result<String, Image2HtmlError>;

    /// List the models the service offers.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, Image2HtmlError>;
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// [`GenerationService`] backed by an `edgequake_llm` provider.
///
/// Named providers are instantiated per request so the model id from the
/// request options is honoured; a pre-built provider is used as-is.
pub struct LlmProviderService {
    provider_name: String,
    provider: Option<Arc<dyn LLMProvider>>,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl LlmProviderService {
    /// Service for a provider name understood by `ProviderFactory`.
    pub fn from_name(provider_name: impl Into<String>, config: &ConverterConfig) -> Self {
        Self {
            provider_name: provider_name.into(),
            provider: None,
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Service wrapping an already configured provider.
    pub fn from_provider(provider: Arc<dyn LLMProvider>, config: &ConverterConfig) -> Self {
        Self {
            provider_name: "custom".to_string(),
            provider: Some(provider),
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    fn provider_for(&self, model: &str) -> Result<Arc<dyn LLMProvider>, Image2HtmlError> {
        if let Some(ref provider) = self.provider {
            return Ok(Arc::clone(provider));
        }
        ProviderFactory::create_llm_provider(&self.provider_name, model).map_err(|e| {
            Image2HtmlError::ProviderNotConfigured {
                provider: self.provider_name.clone(),
                hint: format!("{e}"),
            }
        })
    }
}

/// Vision-capable default per provider family.
pub fn default_model_for_provider(provider_name: &str) -> &'static str {
    match provider_name {
        "openai" | "azure" => "gpt-4.1-mini",
        "anthropic" => "claude-sonnet-4-20250514",
        "ollama" | "lmstudio" => "llava",
        "mistral" => "pixtral-12b-2409",
        _ => DEFAULT_MODEL,
    }
}

#[async_trait]
impl GenerationService for LlmProviderService {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn default_model(&self) -> &str {
        default_model_for_provider(&self.provider_name)
    }

    fn ensure_credential(&self) -> Result<(), Image2HtmlError> {
        self.provider_for(self.default_model()).map(|_| ())
    }

    async fn generate(&self, request: &ConversionRequest) -> Result<String, Image2HtmlError> {
        let start = Instant::now();
        let provider = self.provider_for(request.model())?;

        let messages = vec![ChatMessage::user_with_images(
            request.prompt(),
            vec![encode::to_image_data(request.image())],
        )];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = tokio::time::timeout(self.timeout, provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| {
                Image2HtmlError::generation(format!(
                    "{} call timed out after {}s",
                    self.provider_name,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                warn!("{}: generation failed: {}", self.provider_name, e);
                Image2HtmlError::generation(e.to_string())
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.provider_name,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, Image2HtmlError> {
        Err(Image2HtmlError::Unsupported {
            service: self.provider_name.clone(),
            operation: "list_models".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str, methods: &[&str]) -> ModelInfo {
        ModelInfo {
            name: name.to_string(),
            display_name: None,
            supported_generation_methods: methods.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn supports_generation_requires_generate_content() {
        assert!(model("models/a", &["generateContent", "countTokens"]).supports_generation());
        assert!(!model("models/embed", &["embedContent"]).supports_generation());
        assert!(!model("models/none", &[]).supports_generation());
    }

    #[test]
    fn request_accessors() {
        let image = ImageAsset::new(vec![1u8, 2, 3], "image/png").unwrap();
        let options = ConversionOptions::default().fidelity(10);
        let req = ConversionRequest::new(image.clone(), options.clone(), "m-1", "prompt text");
        assert_eq!(req.image(), &image);
        assert_eq!(req.options(), &options);
        assert_eq!(req.model(), "m-1");
        assert_eq!(req.prompt(), "prompt text");
    }

    #[test]
    fn provider_defaults_are_vision_models() {
        assert_eq!(default_model_for_provider("openai"), "gpt-4.1-mini");
        assert_eq!(default_model_for_provider("ollama"), "llava");
        assert_eq!(default_model_for_provider("something-else"), DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn adapter_does_not_list_models() {
        let svc = LlmProviderService::from_name("openai", &ConverterConfig::default());
        let err = svc.list_models().await.unwrap_err();
        assert!(matches!(err, Image2HtmlError::Unsupported { .. }));
    }
}
