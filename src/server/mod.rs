//! HTTP surface: `POST /process` and `GET /health`.
//!
//! ```text
//! POST /process
//!   X-API-Key: <SERVICE_API_KEY>
//!   {"fileBase64": "...", "filename": "receipt.pdf", "max_pages": 4}
//! ```
//!
//! The router is built by [`create_router`] around an [`AppState`] so tests
//! can drive it in-process with `tower::ServiceExt::oneshot`.

pub mod auth;
pub mod handlers;
pub mod routes;

use crate::extract::ReceiptExtractor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use routes::create_router;

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared, immutable per-process state.
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<ReceiptExtractor>,
    /// Expected `X-API-Key`; `None` disables the check.
    pub service_api_key: Option<Arc<str>>,
}

impl AppState {
    /// Take the API key from the extractor's configuration.
    pub fn new(extractor: ReceiptExtractor) -> Self {
        let service_api_key = extractor
            .config()
            .service_api_key
            .as_deref()
            .map(Arc::from);
        Self {
            extractor: Arc::new(extractor),
            service_api_key,
        }
    }
}

/// Body of `POST /process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    /// The PDF, base64-encoded.
    #[serde(rename = "fileBase64")]
    pub file_base64: String,
    #[serde(default = "default_filename")]
    pub filename: String,
    /// Requested page limit; missing or 0 means the configured limit.
    #[serde(default)]
    pub max_pages: Option<u32>,
}

fn default_filename() -> String {
    "receipt.pdf".to_string()
}
