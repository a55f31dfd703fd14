//! Error type for the receipt-ocr service.
//!
//! Every failure is fatal to the single request that hit it, so one enum
//! covers the whole pipeline: authentication, payload decoding, pdfium,
//! the VLM call, and parsing its reply. [`ReceiptOcrError`] implements
//! axum's [`IntoResponse`] so handlers can return it directly with `?`.
//!
//! The HTTP body is always `{"detail": "<message>"}`, the shape existing
//! callers of the service already parse.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// All errors returned by the receipt-ocr library and HTTP surface.
#[derive(Debug, Error)]
pub enum ReceiptOcrError {
    // ── Request errors ────────────────────────────────────────────────────
    /// `X-API-Key` header missing or not equal to the configured secret.
    #[error("Unauthorized")]
    Unauthorized,

    /// The JSON body could not be parsed into a request.
    #[error("Invalid request body: {0}")]
    InvalidRequest(String),

    /// The body exceeded the configured size limit.
    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    /// `fileBase64` is not valid base64.
    #[error("Invalid base64: {0}")]
    InvalidBase64(String),

    /// `fileBase64` decoded to zero bytes.
    #[error("Invalid base64: payload is empty")]
    EmptyPayload,

    /// The decoded bytes are not a PDF.
    #[error("Payload is not a PDF (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not parse the document.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// The document is encrypted; the service never has a password.
    #[error("PDF is password protected")]
    PasswordProtected,

    /// The document loaded but no page could be rendered.
    #[error("Could not render PDF pages")]
    NoPagesRendered,

    /// pdfium returned an error for a specific page.
    #[error("PDF render failed on page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// A rendered page could not be PNG-encoded.
    #[error("Image encoding failed on page {page}: {detail}")]
    EncodingFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium on the library search path."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every attempt at the VLM call failed.
    #[error("Model call failed after {attempts} attempts: {detail}")]
    ModelCallFailed { attempts: u32, detail: String },

    /// The VLM replied, but not with a usable JSON object.
    #[error("Model returned invalid JSON: {detail}")]
    InvalidModelOutput { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReceiptOcrError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidBase64(_) | Self::EmptyPayload | Self::NotAPdf { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::CorruptPdf { .. } | Self::PasswordProtected | Self::NoPagesRendered => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::ProviderNotConfigured { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::ModelCallFailed { .. } | Self::InvalidModelOutput { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::RasterisationFailed { .. }
            | Self::EncodingFailed { .. }
            | Self::PdfiumBindingFailed(_)
            | Self::InvalidConfig(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to send to the caller.
    ///
    /// Internal failures are logged in full but reported generically.
    pub fn user_message(&self) -> String {
        match self {
            Self::PdfiumBindingFailed(_) | Self::InvalidConfig(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ReceiptOcrError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", status.as_u16(), self);
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::info!("Rejected request: {}", self);
        } else {
            tracing::debug!("Client error ({}): {}", status.as_u16(), self);
        }

        (status, Json(json!({ "detail": self.user_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_401_with_plain_detail() {
        let e = ReceiptOcrError::Unauthorized;
        assert_eq!(e.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(e.user_message(), "Unauthorized");
    }

    #[test]
    fn base64_errors_are_client_errors() {
        assert_eq!(
            ReceiptOcrError::InvalidBase64("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ReceiptOcrError::EmptyPayload.status_code(),
            StatusCode::BAD_REQUEST
        );
        let e = ReceiptOcrError::InvalidBase64("Invalid symbol 33, offset 4.".into());
        assert!(e.to_string().starts_with("Invalid base64:"), "got: {e}");
    }

    #[test]
    fn no_pages_rendered_display() {
        let e = ReceiptOcrError::NoPagesRendered;
        assert_eq!(e.to_string(), "Could not render PDF pages");
        assert_eq!(e.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn model_failures_are_bad_gateway() {
        let e = ReceiptOcrError::ModelCallFailed {
            attempts: 3,
            detail: "rate limited".into(),
        };
        assert_eq!(e.status_code(), StatusCode::BAD_GATEWAY);
        assert!(e.to_string().contains("3 attempts"));
        assert!(e.to_string().contains("rate limited"));
    }

    #[test]
    fn internal_detail_is_not_leaked() {
        let e = ReceiptOcrError::PdfiumBindingFailed("/opt/pdfium/lib/libpdfium.so: not found".into());
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.user_message(), "Internal server error");
        assert!(e.to_string().contains("PDFIUM_LIB_PATH"));
    }
}
