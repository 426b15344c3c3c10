//! Error types for the image2html library.
//!
//! A single enum covers every failure, grouped by what the caller can do
//! about it:
//!
//! * **Configuration**: no credential, unknown provider, bad option. Fatal
//!   until fixed outside the program; retrying cannot help.
//! * **Generation**: the external service call failed. The display text is
//!   a fixed, user-facing message; the underlying detail is kept in the
//!   variant for logs. Recoverable through an explicit retry.
//! * **Cancelled**: the user interrupted the attempt. Not a failure.
//! * **Input / output**: the image could not be read or the generated
//!   document could not be written.
//!
//! Nothing in the crate retries automatically. [`Image2HtmlError::is_retryable`]
//! only tells a front end whether offering a retry makes sense.

use std::path::PathBuf;
use thiserror::Error;

/// Fixed user-facing text for every generation failure.
pub const GENERATION_FAILED_MESSAGE: &str = "Failed to communicate with the generation service.";

/// All errors returned by the image2html library.
#[derive(Debug, Error)]
pub enum Image2HtmlError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// No API credential is configured for the generation service.
    #[error("API credential not set.\nExport {var} or pass an API key explicitly.")]
    MissingCredential { var: String },

    /// The named provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder or option validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Generation errors ─────────────────────────────────────────────────
    /// The generation service call failed (network, quota, malformed or
    /// empty response).
    #[error("{}", GENERATION_FAILED_MESSAGE)]
    Generation { detail: String },

    /// The service does not offer the requested operation.
    #[error("Operation '{operation}' is not supported by the '{service}' service")]
    Unsupported { service: String, operation: String },

    // ── Session ───────────────────────────────────────────────────────────
    /// The user cancelled the attempt.
    #[error("Conversion was cancelled.")]
    Cancelled,

    // ── Input errors ──────────────────────────────────────────────────────
    /// Image file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The payload is not an image type the service accepts.
    #[error("Unsupported media type '{media_type}': expected an image/* payload")]
    UnsupportedMediaType { media_type: String },

    /// HTTP download of an image URL failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output HTML file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Image2HtmlError {
    /// Build a generation error, keeping `detail` for diagnostics.
    pub fn generation(detail: impl Into<String>) -> Self {
        Self::Generation {
            detail: detail.into(),
        }
    }

    /// True for errors that only an outside fix (env var, flag) can resolve.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential { .. } | Self::ProviderNotConfigured { .. } | Self::InvalidConfig(_)
        )
    }

    /// True when an explicit user retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Generation { .. }
                | Self::Cancelled
                | Self::DownloadFailed { .. }
                | Self::DownloadTimeout { .. }
        )
    }
}
