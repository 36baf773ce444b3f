//! HTTP helpers for the Parampara JSON API with a consistent timeout and error
//! policy. All traffic goes through [`ApiClient`], which delegates to the
//! [`signer::RequestSigner`] so the bearer token is attached uniformly and a
//! rejected token is reported no matter which endpoint saw it.

pub mod api;
pub mod errors;
pub mod signer;

pub use api::ApiClient;
pub use errors::AppError;
pub use signer::{OnUnauthorized, RejectionHook, RequestSigner};

use serde_json::Value;

/// Backend liveness check, also used to wake a sleeping host.
pub const HEALTH_PATH: &str = "/health";
/// Request correlation header added to every outbound call.
pub const X_REQUEST_ID: &str = "x-request-id";
/// Maximum number of error body characters surfaced to the caller.
const MAX_ERROR_CHARS: usize = 200;

/// Builds a URL from an explicit base URL and the provided path.
pub(crate) fn build_url_with_base(base_url: &str, path: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let path = path.trim();

    if base.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}

/// Maps transport errors into `AppError` variants with timeout detection.
pub(crate) fn map_request_error(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::Timeout("Request timed out. Please try again.".to_string())
    } else {
        AppError::Network(format!("Unable to reach the server: {err}"))
    }
}

/// Sanitizes HTTP error bodies for user-facing messages. A JSON `message` or
/// `error` field wins over the raw body; the result is trimmed and truncated.
pub(crate) fn sanitize_body(body: &str) -> String {
    let trimmed = body.trim();
    let message = serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|json| {
            ["message", "error"]
                .iter()
                .find_map(|key| json.get(key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| trimmed.to_string());

    let message = message.trim();
    if message.is_empty() {
        "Request failed.".to_string()
    } else {
        message.chars().take(MAX_ERROR_CHARS).collect()
    }
}
