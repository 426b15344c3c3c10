//! Conversion entry points: [`convert`], [`refine`] and [`list_models`].
//!
//! Each call resolves the generation service, checks its credential before
//! touching the network, builds a fresh [`ConversionRequest`] and normalises
//! the reply into an [`HtmlFragment`]. Nothing here retries; a failure is
//! returned once and the caller decides what to do next.

use crate::config::{validate_model_id, ConversionOptions, ConverterConfig, FALLBACK_MODELS};
use crate::error::Image2HtmlError;
use crate::output::{save_document, HtmlFragment};
use crate::pipeline::gemini::GeminiService;
use crate::pipeline::input::ImageAsset;
use crate::pipeline::llm::{
    default_model_for_provider, ConversionRequest, GenerationService, LlmProviderService, ModelInfo,
};
use crate::prompts;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert a UI image into an inline-styled HTML fragment.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// - configuration errors (`MissingCredential`, `ProviderNotConfigured`,
///   `InvalidConfig`) before any network call
/// - `Generation` when the service call fails or returns no text
///
/// # Example
/// ```rust,no_run
/// use image2html::{convert, ConversionOptions, ConverterConfig, ImageAsset};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // API key read from GEMINI_API_KEY
/// let image = ImageAsset::new(std::fs::read("mock.png")?, "image/png")?;
/// let options = ConversionOptions::default().fidelity(85);
/// let html = convert(&image, &options, &ConverterConfig::default()).await?;
/// println!("{html}");
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    image: &ImageAsset,
    options: &ConversionOptions,
    config: &ConverterConfig,
) -> Result<HtmlFragment, Image2HtmlError> {
    // ── Step 1: Credential check ─────────────────────────────────────────
    let service = resolve_service(config)?;
    options.validate()?;

    // ── Step 2: Prompt ───────────────────────────────────────────────────
    let prompt = prompts::build_prompt(options, config.system_prompt.as_deref());

    // ── Step 3: Request ──────────────────────────────────────────────────
    let request = build_request(service.as_ref(), image, options, prompt)?;
    generate_fragment(service.as_ref(), &request).await
}

/// Revise a previously generated fragment according to a free-text
/// instruction, reusing the same image and model.
///
/// Unrelated parts of `previous` are kept where the model complies. Same
/// credential check, fence stripping and failure handling as [`convert`].
pub async fn refine(
    image: &ImageAsset,
    previous: &HtmlFragment,
    instruction: &str,
    options: &ConversionOptions,
    config: &ConverterConfig,
) -> Result<HtmlFragment, Image2HtmlError> {
    let service = resolve_service(config)?;
    options.validate()?;
    if instruction.trim().is_empty() {
        return Err(Image2HtmlError::InvalidConfig(
            "refine instruction must not be empty".into(),
        ));
    }

    let prompt = prompts::build_refine_prompt(
        options,
        config.system_prompt.as_deref(),
        previous.as_str(),
        instruction,
    );
    let request = build_request(service.as_ref(), image, options, prompt)?;
    generate_fragment(service.as_ref(), &request).await
}

/// Model labels for a selection control, sorted and deduplicated.
///
/// Keeps only models supporting content generation and strips resource
/// prefixes. Never empty: any failure (including a missing credential) or an
/// empty listing yields [`FALLBACK_MODELS`], preceded by the service's own
/// default model when that is not a Gemini model.
pub async fn list_models(config: &ConverterConfig) -> Vec<String> {
    let (preferred, listed) = match build_service(config) {
        Ok(service) => {
            let preferred = service.default_model().to_string();
            let listed = match service.ensure_credential() {
                Ok(()) => service.list_models().await,
                Err(e) => Err(e),
            };
            (preferred, listed)
        }
        Err(e) => (default_model_for_provider(config.provider()).to_string(), Err(e)),
    };

    match listed {
        Ok(models) => {
            let labels = usable_labels(&models);
            if labels.is_empty() {
                warn!("Model listing returned nothing usable; using fallback list");
                fallback_models(&preferred)
            } else {
                debug!("{} usable models", labels.len());
                labels
            }
        }
        Err(e) => {
            warn!("Model listing failed ({e}); using fallback list");
            fallback_models(&preferred)
        }
    }
}

/// Convert and write the standalone document to `output_path`.
pub async fn convert_to_file(
    image: &ImageAsset,
    options: &ConversionOptions,
    output_path: impl AsRef<Path>,
    config: &ConverterConfig,
) -> Result<HtmlFragment, Image2HtmlError> {
    let fragment = convert(image, options, config).await?;
    save_document(&fragment, output_path).await?;
    Ok(fragment)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    image: &ImageAsset,
    options: &ConversionOptions,
    config: &ConverterConfig,
) -> Result<HtmlFragment, Image2HtmlError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Image2HtmlError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(image, options, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Resolve the generation service and check its credential.
///
/// 1. **Pre-built service** (`config.service`): used as-is; tests and
///    embedders inject their own.
/// 2. **`gemini`** (the default): the REST client, keyed from config or
///    `GEMINI_API_KEY` / `API_KEY`.
/// 3. **Any other name**: an `edgequake_llm` provider built by
///    `ProviderFactory`, which reads the matching `*_API_KEY`.
pub(crate) fn resolve_service(
    config: &ConverterConfig,
) -> Result<Arc<dyn GenerationService>, Image2HtmlError> {
    let service = build_service(config)?;
    service.ensure_credential()?;
    Ok(service)
}

fn build_service(config: &ConverterConfig) -> Result<Arc<dyn GenerationService>, Image2HtmlError> {
    if let Some(ref service) = config.service {
        return Ok(Arc::clone(service));
    }
    Ok(match config.provider() {
        "gemini" | "google" => Arc::new(GeminiService::from_config(config)?),
        name => Arc::new(LlmProviderService::from_name(name, config)),
    })
}

fn build_request(
    service: &dyn GenerationService,
    image: &ImageAsset,
    options: &ConversionOptions,
    prompt: String,
) -> Result<ConversionRequest, Image2HtmlError> {
    let model = options
        .model
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| service.default_model())
        .to_string();
    validate_model_id(&model)?;
    Ok(ConversionRequest::new(
        image.clone(),
        options.clone(),
        model,
        prompt,
    ))
}

async fn generate_fragment(
    service: &dyn GenerationService,
    request: &ConversionRequest,
) -> Result<HtmlFragment, Image2HtmlError> {
    let start = Instant::now();
    info!(
        "Converting {} ({} bytes) with {}/{}",
        request.image().media_type(),
        request.image().len(),
        service.name(),
        request.model()
    );

    let raw = service.generate(request).await.map_err(|e| {
        warn!("Generation failed: {e:?}");
        match e {
            Image2HtmlError::Generation { .. } => e,
            e if e.is_configuration() => e,
            other => Image2HtmlError::generation(other.to_string()),
        }
    })?;

    let fragment = HtmlFragment::from_model_output(&raw);
    if fragment.is_empty() {
        return Err(Image2HtmlError::generation(
            "response contained only code fences",
        ));
    }

    info!(
        "Conversion complete: {} chars in {}ms",
        fragment.as_str().len(),
        start.elapsed().as_millis()
    );
    Ok(fragment)
}

static RE_RESOURCE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:models|tunedModels)/").unwrap());

/// Short label for a model: resource name without its collection prefix.
pub fn model_label(model: &ModelInfo) -> String {
    RE_RESOURCE_PREFIX.replace(model.name.trim(), "").into_owned()
}

fn usable_labels(models: &[ModelInfo]) -> Vec<String> {
    let mut labels: Vec<String> = models
        .iter()
        .filter(|m| m.supports_generation())
        .map(model_label)
        .filter(|l| !l.is_empty())
        .collect();
    labels.sort();
    labels.dedup();
    labels
}

fn fallback_models(preferred: &str) -> Vec<String> {
    let mut models = Vec::with_capacity(FALLBACK_MODELS.len() + 1);
    if !FALLBACK_MODELS.contains(&preferred) {
        models.push(preferred.to_string());
    }
    models.extend(FALLBACK_MODELS.iter().map(|m| m.to_string()));
    models
}
