//! Payload decoding: base64 string from the request body → PDF bytes.
//!
//! Callers (notably spreadsheet scripts) sometimes send a data URL instead of
//! bare base64, wrap long strings, or drop the trailing padding. All three
//! are accepted. The `%PDF` magic is checked here so a wrong upload is a 400
//! with a clear message rather than an opaque pdfium failure. Like other PDF
//! readers, the header may sit anywhere in the first kilobyte.

use crate::error::ReceiptOcrError;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use tracing::debug;

/// Standard alphabet, padding optional.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const PDF_MAGIC: &[u8] = b"%PDF";

/// PDF readers accept the header anywhere in the leading kilobyte.
const HEADER_WINDOW: usize = 1024;

/// Decode the `fileBase64` request field into PDF bytes.
pub fn decode_pdf_base64(input: &str) -> Result<Vec<u8>, ReceiptOcrError> {
    let payload = strip_data_url(input.trim());
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = LENIENT_STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ReceiptOcrError::InvalidBase64(e.to_string()))?;

    ensure_pdf(&bytes)?;
    debug!("Decoded PDF payload: {} bytes", bytes.len());
    Ok(bytes)
}

/// Reject empty input and anything without a `%PDF` header in its first
/// 1024 bytes.
pub fn ensure_pdf(bytes: &[u8]) -> Result<(), ReceiptOcrError> {
    if bytes.is_empty() {
        return Err(ReceiptOcrError::EmptyPayload);
    }
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    if !window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        let magic = bytes.iter().take(PDF_MAGIC.len()).copied().collect();
        return Err(ReceiptOcrError::NotAPdf { magic });
    }
    Ok(())
}

/// Drop a `data:<mime>;base64,` prefix if present.
fn strip_data_url(input: &str) -> &str {
    if input.starts_with("data:") {
        if let Some((_, rest)) = input.split_once(";base64,") {
            return rest;
        }
    }
    input
}
