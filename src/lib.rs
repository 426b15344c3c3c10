//! # image2html
//!
//! Turn a screenshot or mock-up of a user interface into an HTML fragment
//! styled entirely with inline `style` attributes, using a multimodal LLM.
//!
//! The output is a bare fragment (no `<html>`, `<head>` or `<body>`), ready
//! to paste into an existing page, or to be wrapped into a standalone
//! document with [`HtmlFragment::to_standalone_document`].
//!
//! ## Pipeline Overview
//!
//! ```text
//! image
//!  │
//!  ├─ 1. Input    local file, URL or stdin; media type sniffed
//!  ├─ 2. Prompt   base rules + fidelity clause + colour clause
//!  ├─ 3. Service  one generateContent call (Gemini REST or edgequake-llm)
//!  ├─ 4. Polish   strip markdown fences, trim
//!  └─ 5. Output   HtmlFragment → clipboard text / standalone document
//! ```
//!
//! [`Session`] sits on top of the pipeline for interactive front ends: one
//! attempt at a time, a 1 Hz elapsed counter, cancel and retry.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use image2html::{convert, resolve_image, ConversionOptions, ConverterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key read from GEMINI_API_KEY (or API_KEY)
//!     let config = ConverterConfig::default();
//!     let image = resolve_image("login-screen.png", config.download_timeout_secs).await?;
//!     let options = ConversionOptions::default().fidelity(90);
//!     let html = convert(&image, &options, &config).await?;
//!     println!("{html}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `image2html` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Library-only use:
//! ```toml
//! image2html = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionOptions, ConverterConfig, ConverterConfigBuilder, FidelityBand, DEFAULT_MODEL,
    FALLBACK_MODELS,
};
pub use convert::{convert, convert_sync, convert_to_file, list_models, refine};
pub use error::Image2HtmlError;
pub use output::{save_document, HtmlFragment};
pub use pipeline::gemini::GeminiService;
pub use pipeline::input::{resolve_image, ImageAsset};
pub use pipeline::llm::{
    default_model_for_provider, ConversionRequest, GenerationService, LlmProviderService, ModelInfo,
};
pub use session::{AttemptStatus, Session, SessionSnapshot};
