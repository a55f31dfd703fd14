//! # receipt-ocr
//!
//! Extract structured fields from PDF receipts using Vision Language Models,
//! served over HTTP.
//!
//! ## Why a VLM?
//!
//! Clinic receipts come from a handful of practice-management systems, each
//! with its own table layout, and many arrive as scans with no text layer.
//! Rasterising the pages and letting a VLM read them handles both cases with
//! one code path; the service then enforces the arithmetic and lookup rules
//! itself rather than trusting the model with them.
//!
//! ## Pipeline Overview
//!
//! ```text
//! POST /process {fileBase64, filename, max_pages}
//!  │
//!  ├─ 0. Auth    X-API-Key must match SERVICE_API_KEY (when set)
//!  ├─ 1. Decode  base64 → PDF bytes, %PDF magic check
//!  ├─ 2. Render  first min(n, max_pages) pages via pdfium (spawn_blocking)
//!  ├─ 3. Encode  page → base64 PNG ImageData
//!  ├─ 4. VLM     one multimodal call to gpt-4o-mini (retry + backoff)
//!  ├─ 5. Parse   reply → JSON object → Receipt
//!  └─ 6. Polish  money format, patient totals, grant eligibility
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use receipt_ocr::{create_router, AppState, ReceiptExtractor, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads OPENAI_API_KEY; binds pdfium from the system library path.
//!     let config = ServiceConfig::builder().service_api_key("s3cret").build()?;
//!     let addr = config.bind_addr;
//!     let extractor = ReceiptExtractor::from_config(config)?;
//!
//!     let app = create_router(AppState::new(extractor));
//!     let listener = tokio::net::TcpListener::bind(addr).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `receipt-ocr` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod receipt;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::ReceiptOcrError;
pub use extract::{resolve_provider, ReceiptExtractor};
pub use output::{ExtractionOutput, ExtractionStats};
pub use pipeline::llm::{ChatReply, ProviderChat, VisionChat};
pub use pipeline::render::{PageRenderer, PdfiumRenderer};
pub use receipt::{ClientInfo, LineItem, Patient, Receipt};
pub use server::{create_router, AppState, ProcessRequest};
