//! Input resolution: turn a user-supplied path, URL or stdin stream into an
//! [`ImageAsset`].
//!
//! The declared media type travels with the bytes to the generation service,
//! so it has to be right. Local files and stdin are sniffed from their magic
//! bytes (extension as a fallback); downloads trust an `image/*`
//! `Content-Type` header and sniff otherwise. Anything that does not resolve
//! to `image/*` is rejected before a request is built.

use crate::error::Image2HtmlError;
use image::ImageFormat;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

/// Raw image payload plus its declared media type.
///
/// Immutable once captured. Cloning shares the underlying buffer, so a
/// session can hand the same asset to every retry without copying.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAsset {
    bytes: Arc<[u8]>,
    media_type: String,
}

impl ImageAsset {
    /// Wrap bytes with an explicit media type.
    ///
    /// Fails with [`Image2HtmlError::UnsupportedMediaType`] unless the type
    /// starts with `image/`.
    pub fn new(
        bytes: impl Into<Vec<u8>>,
        media_type: impl Into<String>,
    ) -> Result<Self, Image2HtmlError> {
        let media_type = media_type.into().trim().to_ascii_lowercase();
        if !media_type.starts_with("image/") {
            return Err(Image2HtmlError::UnsupportedMediaType { media_type });
        }
        Ok(Self {
            bytes: Arc::from(bytes.into()),
            media_type,
        })
    }

    /// Wrap bytes, detecting the media type from their magic bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, Image2HtmlError> {
        let bytes = bytes.into();
        let media_type = sniff_media_type(&bytes, None).ok_or_else(|| {
            Image2HtmlError::UnsupportedMediaType {
                media_type: "application/octet-stream".to_string(),
            }
        })?;
        Self::new(bytes, media_type)
    }

    /// Read a local image file. See [`read_local`].
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, Image2HtmlError> {
        read_local(path.as_ref()).await
    }

    /// Download an image over HTTP(S) with a timeout.
    pub async fn from_url(url: &str, timeout_secs: u64) -> Result<Self, Image2HtmlError> {
        download_image(url, timeout_secs).await
    }

    /// Read an image from any async stream, e.g. stdin.
    pub async fn from_reader<R>(reader: R) -> Result<Self, Image2HtmlError>
    where
        R: AsyncRead + Unpin,
    {
        read_image(reader).await
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAsset")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Detect an image media type from magic bytes, falling back to the file
/// extension of `path`.
pub fn sniff_media_type(bytes: &[u8], path: Option<&Path>) -> Option<String> {
    let format = image::guess_format(bytes)
        .ok()
        .or_else(|| path.and_then(|p| ImageFormat::from_path(p).ok()))?;
    let mime = format.to_mime_type();
    mime.starts_with("image/").then(|| mime.to_string())
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` to an image.
///
/// * `-` reads stdin (the CLI analogue of pasting an image)
/// * `http://` / `https://` downloads with `timeout_secs`
/// * anything else is a local path
pub async fn resolve_image(input: &str, timeout_secs: u64) -> Result<ImageAsset, Image2HtmlError> {
    if input == "-" {
        read_image(tokio::io::stdin()).await
    } else if is_url(input) {
        download_image(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Read a whole image from an async reader and sniff its type.
pub async fn read_image<R>(mut reader: R) -> Result<ImageAsset, Image2HtmlError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .await
        .map_err(|e| Image2HtmlError::Internal(format!("Failed to read image stream: {e}")))?;
    debug!("Read {} bytes from stream", buf.len());
    ImageAsset::from_bytes(buf)
}

/// Read a local image file, validating existence and media type.
pub async fn read_local(path: &Path) -> Result<ImageAsset, Image2HtmlError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Image2HtmlError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => Image2HtmlError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => Image2HtmlError::Internal(format!("Failed to read '{}': {e}", path.display())),
    })?;

    let media_type = sniff_media_type(&bytes, Some(path)).ok_or_else(|| {
        Image2HtmlError::UnsupportedMediaType {
            media_type: describe_unknown(path),
        }
    })?;

    debug!("Resolved local image: {} ({})", path.display(), media_type);
    ImageAsset::new(bytes, media_type)
}

/// Download an image URL.
async fn download_image(url: &str, timeout_secs: u64) -> Result<ImageAsset, Image2HtmlError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Image2HtmlError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Image2HtmlError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Image2HtmlError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(Image2HtmlError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let declared = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Image2HtmlError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let media_type = match declared {
        Some(t) if t.starts_with("image/") => t,
        other => sniff_media_type(&bytes, Some(&url_path(url))).ok_or_else(|| {
            Image2HtmlError::UnsupportedMediaType {
                media_type: other.unwrap_or_else(|| "unknown".to_string()),
            }
        })?,
    };

    info!("Downloaded {} bytes ({})", bytes.len(), media_type);
    ImageAsset::new(bytes.to_vec(), media_type)
}

/// Last URL path segment, used only for extension-based sniffing.
fn url_path(url: &str) -> PathBuf {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .map(PathBuf::from)
        .unwrap_or_default()
}

fn describe_unknown(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("unknown (.{ext})"),
        None => "unknown".to_string(),
    }
}
