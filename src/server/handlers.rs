//! Request handlers.

use super::{AppState, ProcessRequest};
use crate::error::ReceiptOcrError;
use crate::receipt::Receipt;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::info;

/// `POST /process`: extract receipt fields from a base64 PDF.
pub async fn process_receipt(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<Receipt>, ReceiptOcrError> {
    let Json(request) = payload.map_err(|e| match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ReceiptOcrError::PayloadTooLarge(e.body_text()),
        _ => ReceiptOcrError::InvalidRequest(e.body_text()),
    })?;

    info!(
        filename = %request.filename,
        max_pages = ?request.max_pages,
        payload_len = request.file_base64.len(),
        "Processing receipt"
    );

    let output = state
        .extractor
        .extract_base64(&request.file_base64, &request.filename, request.max_pages)
        .await?;

    Ok(Json(output.receipt))
}

/// `GET /health`: liveness probe, never authenticated.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
