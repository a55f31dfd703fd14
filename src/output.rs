//! Result types returned by [`crate::extract::ReceiptExtractor`].

use crate::receipt::Receipt;
use serde::{Deserialize, Serialize};

/// The outcome of one successful extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Normalised receipt fields; this is the HTTP response body.
    pub receipt: Receipt,
    /// Timing and token accounting for logs and the CLI `--stats` flag.
    pub stats: ExtractionStats,
}

/// Per-request accounting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Bytes of PDF after base64 decoding.
    pub pdf_bytes: usize,
    /// Page limit applied to this request after clamping.
    pub max_pages: usize,
    /// Pages actually rendered and sent to the model.
    pub pages_rendered: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Retries the model call needed before succeeding.
    pub retries: u32,
    pub render_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}
