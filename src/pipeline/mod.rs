//! Pipeline stages for image-to-HTML conversion.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ llm / gemini ──▶ postprocess
//! (path/URL/stdin)  (base64)  (service call)  (fence strip)
//! ```
//!
//! 1. [`input`]: capture bytes and a trustworthy `image/*` media type
//! 2. [`encode`]: base64-wrap the payload for the JSON request body
//! 3. [`llm`]: the [`llm::GenerationService`] boundary and the
//!    edgequake-llm adapter; [`gemini`] is the default REST backend. The only
//!    stages with network I/O
//! 4. [`postprocess`]: strip markdown fences the model adds anyway

pub mod encode;
pub mod gemini;
pub mod input;
pub mod llm;
pub mod postprocess;
