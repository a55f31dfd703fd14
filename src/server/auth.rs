//! `X-API-Key` shared-secret check.

use super::{AppState, API_KEY_HEADER};
use crate::error::ReceiptOcrError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Reject the request unless `X-API-Key` matches the configured secret.
///
/// Runs as a route layer, before the JSON body is read.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ReceiptOcrError> {
    if let Some(expected) = state.service_api_key.as_deref() {
        let presented = request
            .headers()
            .get(API_KEY_HEADER)
            .map(|v| v.as_bytes())
            .unwrap_or_default();

        if !constant_time_eq(presented, expected.as_bytes()) {
            return Err(ReceiptOcrError::Unauthorized);
        }
    }

    Ok(next.run(request).await)
}

/// Byte comparison whose running time does not depend on where the inputs
/// first differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_plain_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret1"));
        assert!(!constant_time_eq(b"", b"secret"));
        assert!(constant_time_eq(b"", b""));
    }
}
