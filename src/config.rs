//! Configuration types for image-to-HTML conversion.
//!
//! Two structs split per-attempt choices from process-wide wiring:
//!
//! * [`ConversionOptions`]: the user-facing toggles read at the moment an
//!   attempt starts (colors, fidelity, model).
//! * [`ConverterConfig`]: which service to call and how (provider, API key,
//!   timeouts, sampling), built via [`ConverterConfigBuilder`].

use crate::error::Image2HtmlError;
use crate::pipeline::llm::GenerationService;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Model used when [`ConversionOptions::model`] is `None`.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Static model list returned when the service cannot be queried.
pub const FALLBACK_MODELS: [&str; 2] = ["gemini-2.5-flash", "gemini-2.5-pro"];

/// Provider used when none is named.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Default Gemini REST endpoint.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

static RE_MODEL_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:/-]*$").unwrap());

// ── Per-attempt options ──────────────────────────────────────────────────

/// User-selected toggles for one conversion attempt.
///
/// # Example
/// ```rust
/// use image2html::ConversionOptions;
///
/// let options = ConversionOptions::default()
///     .fidelity(90)
///     .reproduce_colors(false)
///     .model("gemini-2.5-pro");
/// assert_eq!(options.fidelity, 90);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Reproduce the mock-up's palette (`true`) or render grayscale only.
    pub reproduce_colors: bool,

    /// 0–100 dial: low favours small, simple markup; high favours
    /// pixel-level fidelity. Default: 50.
    pub fidelity: u8,

    /// Model identifier. `None` uses [`DEFAULT_MODEL`].
    pub model: Option<String>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            reproduce_colors: true,
            fidelity: 50,
            model: None,
        }
    }
}

impl ConversionOptions {
    pub fn reproduce_colors(mut self, v: bool) -> Self {
        self.reproduce_colors = v;
        self
    }

    /// Set fidelity, clamped to 100.
    pub fn fidelity(mut self, level: u8) -> Self {
        self.fidelity = level.min(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// The model this attempt will address.
    pub fn resolved_model(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_MODEL)
    }

    /// Fidelity band selected by [`ConversionOptions::fidelity`].
    pub fn band(&self) -> FidelityBand {
        FidelityBand::from_level(self.fidelity)
    }

    /// Reject values the service would refuse or that would corrupt a
    /// request URL.
    pub fn validate(&self) -> Result<(), Image2HtmlError> {
        if self.fidelity > 100 {
            return Err(Image2HtmlError::InvalidConfig(format!(
                "Fidelity must be 0–100, got {}",
                self.fidelity
            )));
        }
        match self.model.as_deref().filter(|m| !m.trim().is_empty()) {
            Some(model) => validate_model_id(model),
            None => Ok(()),
        }
    }
}

/// Reject model ids that are malformed or would escape the request path.
pub fn validate_model_id(model: &str) -> Result<(), Image2HtmlError> {
    if !RE_MODEL_ID.is_match(model) || model.contains("..") {
        return Err(Image2HtmlError::InvalidConfig(format!(
            "Invalid model identifier '{model}'"
        )));
    }
    Ok(())
}

/// Fidelity band derived from the 0–100 dial.
///
/// | Band | Levels | Instruction |
/// |------|--------|-------------|
/// | `Simple` | 0–20 | smallest markup, rough layout |
/// | `Balanced` | 21–80 | main layout and sizes, drop fine decoration |
/// | `Precise` | 81–100 | pixel-level detail, complexity acceptable |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FidelityBand {
    Simple,
    Balanced,
    Precise,
}

impl FidelityBand {
    pub fn from_level(level: u8) -> Self {
        match level {
            0..=20 => FidelityBand::Simple,
            21..=80 => FidelityBand::Balanced,
            _ => FidelityBand::Precise,
        }
    }
}

// ── Service configuration ────────────────────────────────────────────────

/// How the pipeline reaches the generation service.
///
/// Built via [`ConverterConfig::builder()`] or [`ConverterConfig::default()`].
///
/// # Example
/// ```rust
/// use image2html::ConverterConfig;
///
/// let config = ConverterConfig::builder()
///     .provider_name("gemini")
///     .api_timeout_secs(90)
///     .build()
///     .unwrap();
/// assert_eq!(config.api_timeout_secs, 90);
/// ```
#[derive(Clone)]
pub struct ConverterConfig {
    /// Provider name: `gemini` (REST client) or any name understood by
    /// `edgequake_llm::ProviderFactory` (`openai`, `anthropic`, `ollama`, …).
    /// If None, uses [`DEFAULT_PROVIDER`].
    pub provider_name: Option<String>,

    /// Pre-constructed service. Takes precedence over `provider_name`.
    pub service: Option<Arc<dyn GenerationService>>,

    /// Gemini API key. If None, read from `GEMINI_API_KEY`, then `API_KEY`.
    pub api_key: Option<String>,

    /// Gemini REST base URL. Default: [`DEFAULT_GEMINI_BASE_URL`].
    pub base_url: String,

    /// Custom base instruction replacing the built-in one.
    pub system_prompt: Option<String>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 8192.
    ///
    /// High-fidelity fragments for dense screens routinely exceed 4 000
    /// tokens; a low cap truncates the markup mid-element.
    pub max_output_tokens: usize,

    /// Per-request timeout for the generation call in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            provider_name: None,
            service: None,
            api_key: None,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            system_prompt: None,
            temperature: 0.2,
            max_output_tokens: 8192,
            api_timeout_secs: 120,
            download_timeout_secs: 60,
        }
    }
}

impl fmt::Debug for ConverterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterConfig")
            .field("provider_name", &self.provider_name)
            .field("service", &self.service.as_ref().map(|s| s.name().to_string()))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

impl ConverterConfig {
    /// Create a new builder for `ConverterConfig`.
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }

    /// Provider name with the default applied.
    pub fn provider(&self) -> &str {
        self.provider_name.as_deref().unwrap_or(DEFAULT_PROVIDER)
    }
}

/// Builder for [`ConverterConfig`].
#[derive(Debug)]
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn service(mut self, service: Arc<dyn GenerationService>) -> Self {
        self.config.service = Some(service);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, Image2HtmlError> {
        let c = &self.config;
        if c.max_output_tokens == 0 {
            return Err(Image2HtmlError::InvalidConfig(
                "max_output_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Image2HtmlError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if !c.base_url.starts_with("http://") && !c.base_url.starts_with("https://") {
            return Err(Image2HtmlError::InvalidConfig(format!(
                "base_url must be an HTTP(S) URL, got '{}'",
                c.base_url
            )));
        }
        if matches!(c.provider_name.as_deref(), Some(p) if p.trim().is_empty()) {
            return Err(Image2HtmlError::InvalidConfig(
                "provider name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_boundaries() {
        assert_eq!(FidelityBand::from_level(0), FidelityBand::Simple);
        assert_eq!(FidelityBand::from_level(20), FidelityBand::Simple);
        assert_eq!(FidelityBand::from_level(21), FidelityBand::Balanced);
        assert_eq!(FidelityBand::from_level(80), FidelityBand::Balanced);
        assert_eq!(FidelityBand::from_level(81), FidelityBand::Precise);
        assert_eq!(FidelityBand::from_level(100), FidelityBand::Precise);
    }

    #[test]
    fn fidelity_setter_clamps() {
        assert_eq!(ConversionOptions::default().fidelity(250).fidelity, 100);
    }

    #[test]
    fn resolved_model_falls_back_to_default() {
        assert_eq!(ConversionOptions::default().resolved_model(), DEFAULT_MODEL);
        assert_eq!(
            ConversionOptions::default().model("  ").resolved_model(),
            DEFAULT_MODEL
        );
        assert_eq!(
            ConversionOptions::default().model("gemini-2.5-pro").resolved_model(),
            "gemini-2.5-pro"
        );
    }

    #[test]
    fn validate_rejects_path_like_model() {
        let bad = ConversionOptions::default().model("../../v1/files");
        assert!(matches!(bad.validate(), Err(Image2HtmlError::InvalidConfig(_))));
        let spaced = ConversionOptions::default().model("gemini 2.5");
        assert!(spaced.validate().is_err());
        assert!(ConversionOptions::default().validate().is_ok());
    }

    #[test]
    fn model_id_accepts_provider_tags() {
        assert!(validate_model_id("llama3.2-vision:11b").is_ok());
        assert!(validate_model_id("models/gemini-2.5-flash").is_ok());
        assert!(validate_model_id("a/../b").is_err());
        assert!(validate_model_id("").is_err());
    }

    #[test]
    fn builder_rejects_zero_tokens() {
        let err = ConverterConfig::builder().max_output_tokens(0).build();
        assert!(matches!(err, Err(Image2HtmlError::InvalidConfig(_))));
    }

    #[test]
    fn builder_trims_base_url() {
        let c = ConverterConfig::builder()
            .base_url("http://localhost:8080/v1beta/")
            .build()
            .unwrap();
        assert_eq!(c.base_url, "http://localhost:8080/v1beta");
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ConverterConfig::builder().api_key("secret-key").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret-key"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn default_provider_is_gemini() {
        assert_eq!(ConverterConfig::default().provider(), "gemini");
    }
}
