//! Pipeline stages for receipt extraction.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the native (pdfium) and remote (VLM) stages can
//! be replaced behind their traits.
//!
//! ## Data Flow
//!
//! ```text
//! decode ──▶ render ──▶ encode ──▶ llm ──▶ postprocess
//! (base64)   (pdfium)   (PNG b64)  (VLM)   (JSON object)
//! ```
//!
//! 1. [`decode`] - base64 request field to PDF bytes, `%PDF` magic check
//! 2. [`render`] - rasterise the leading pages; runs in `spawn_blocking`
//! 3. [`encode`] - PNG-encode and base64-wrap each page for the request body
//! 4. [`llm`] - one multimodal call with timeout and retry/backoff
//! 5. [`postprocess`] - recover a JSON object from the reply text

pub mod decode;
pub mod encode;
pub mod llm;
pub mod postprocess;
pub mod render;
