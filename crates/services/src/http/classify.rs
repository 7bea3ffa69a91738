use crate::error::ApiError;

/// Shown when a request is rejected for an expired or revoked credential.
pub const RELOGIN_PROMPT: &str = "Your session has expired. Please sign in again.";

/// Raised by the adapter when a credentialed request comes back 401/403.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    Unauthorized { code: i64 },
}

/// Message to surface for `err`, or `None` when nothing should be shown
/// (401 goes through the re-login prompt instead, cancellations are silent).
#[must_use]
pub fn user_message(err: &ApiError) -> Option<String> {
    let text = match err {
        ApiError::Cancelled | ApiError::Business { code: 401, .. } => return None,
        ApiError::Timeout => "Request timed out, please check your network connection",
        ApiError::Network(_) => "Network connection failed, please check your network settings",
        ApiError::Business { code: 403, .. } => "Permission denied for this resource",
        ApiError::Business { code: 404, .. } => "The requested resource does not exist",
        ApiError::Business { code: 500, .. } => "Internal server error, please try again later",
        ApiError::Business { code: 502, .. } => "Gateway error",
        ApiError::Business { code: 503, .. } => "Service unavailable",
        ApiError::Business { code: 504, .. } => "Gateway timed out",
        ApiError::Business { message, .. } if !message.trim().is_empty() => {
            return Some(message.clone());
        }
        ApiError::Business { .. } => "Operation failed",
        ApiError::Decode(_) => "Unexpected response from server",
        ApiError::Encode(_) => "Could not send request",
    };
    Some(text.to_string())
}
