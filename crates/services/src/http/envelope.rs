use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

/// The `{code, message, data, timestamp}` wrapper around every response body.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEnvelope {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

/// Envelope after validation: either typed data or the server's error.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome<T> {
    Ok(T),
    Error { code: i64, message: String },
}

impl RawEnvelope {
    /// # Errors
    ///
    /// Returns `ApiError::Decode` if `body` is not an envelope.
    pub fn parse(body: &str) -> Result<Self, ApiError> {
        serde_json::from_str(body).map_err(|err| ApiError::Decode(err.to_string()))
    }

    /// Validate the payload against `T`. Only `success_code` yields data.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Decode` if a success payload does not match `T`.
    pub fn into_outcome<T: DeserializeOwned>(
        self,
        success_code: i64,
    ) -> Result<ApiOutcome<T>, ApiError> {
        if self.code != success_code {
            return Ok(ApiOutcome::Error {
                code: self.code,
                message: self.message,
            });
        }
        serde_json::from_value(self.data)
            .map(ApiOutcome::Ok)
            .map_err(|err| ApiError::Decode(err.to_string()))
    }
}

impl<T> ApiOutcome<T> {
    /// # Errors
    ///
    /// Returns `ApiError::Business` for the error arm.
    pub fn into_result(self) -> Result<T, ApiError> {
        match self {
            ApiOutcome::Ok(data) => Ok(data),
            ApiOutcome::Error { code, message } => Err(ApiError::Business { code, message }),
        }
    }
}
