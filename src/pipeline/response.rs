//! Response boundary: encode results and taxonomy errors.
//!
//! Encoding never fails a request: a serialization fault degrades to a
//! generic internal-error response.

use serde_json::json;

use crate::error::CoreError;
use crate::pool::Rows;

const CONTENT_TYPE_JSON: (&str, &str) = ("content-type", "application/json");

/// Encoded response handed back to the transport.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// Encode successful rows as a JSON body.
    pub fn ok(rows: &Rows) -> Self {
        match serde_json::to_vec(&json!({ "rows": rows.rows })) {
            Ok(body) => Self {
                status: 200,
                headers: vec![(
                    CONTENT_TYPE_JSON.0.to_string(),
                    CONTENT_TYPE_JSON.1.to_string(),
                )],
                body,
            },
            Err(e) => {
                tracing::error!(error = %e, "Response encoding failed");
                Self::internal_fallback()
            }
        }
    }

    /// Encode a taxonomy error. The mapping is fixed: BadRequest=400,
    /// PoolExhausted/DeadlineExceeded=503, UpstreamError=502, InternalError=500.
    pub fn from_error(err: &CoreError) -> Self {
        let payload = json!({
            "error": err.kind(),
            "message": err.to_string(),
            "retryable": err.is_retryable(),
        });
        match serde_json::to_vec(&payload) {
            Ok(body) => Self {
                status: err.status(),
                headers: vec![(
                    CONTENT_TYPE_JSON.0.to_string(),
                    CONTENT_TYPE_JSON.1.to_string(),
                )],
                body,
            },
            Err(_) => Self::internal_fallback(),
        }
    }

    fn internal_fallback() -> Self {
        Self {
            status: 500,
            headers: vec![(
                CONTENT_TYPE_JSON.0.to_string(),
                CONTENT_TYPE_JSON.1.to_string(),
            )],
            body: br#"{"error":"internal_error"}"#.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_ok_encodes_rows() {
        let rows = Rows {
            rows: vec![json!({"id": 1})],
        };
        let response = Response::ok(&rows);
        assert_eq!(response.status, 200);
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["rows"][0]["id"], 1);
    }

    #[test]
    fn test_error_encodes_taxonomy() {
        let response = Response::from_error(&CoreError::PoolExhausted { waited_ms: 7 });
        assert_eq!(response.status, 503);
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["error"], "pool_exhausted");
        assert_eq!(body["retryable"], true);
    }
}
