//! Image encoding: `ImageAsset` → base64 payload for multimodal requests.
//!
//! Both backends embed the image inline in the JSON body: Gemini as
//! `inline_data`, edgequake-llm providers as a base64 `ImageData`. The bytes
//! are forwarded untouched; UI screenshots are already small, and
//! re-encoding would only blur text the model needs to read.

use crate::pipeline::input::ImageAsset;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Base64-encode the raw image bytes.
pub fn encode_base64(image: &ImageAsset) -> String {
    let b64 = STANDARD.encode(image.bytes());
    debug!(
        "Encoded {} image: {} bytes → {} bytes base64",
        image.media_type(),
        image.len(),
        b64.len()
    );
    b64
}

/// Wrap the image as an edgequake-llm attachment.
///
/// `detail: "high"` keeps small labels and thin borders legible to
/// OpenAI-style tiling.
pub fn to_image_data(image: &ImageAsset) -> ImageData {
    ImageData::new(encode_base64(image), image.media_type()).with_detail("high")
}
