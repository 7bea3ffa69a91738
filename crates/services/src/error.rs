//! Shared error types for the services crate.

use thiserror::Error;

use storage::SqliteInitError;

/// Failures below the envelope: nothing usable came back from the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

/// Errors emitted by `ApiClient`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    /// A response arrived but carried a non-success envelope code or HTTP
    /// status.
    #[error("request failed with code {code}: {message}")]
    Business { code: i64, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("could not encode request: {0}")]
    Encode(String),
    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    /// True when no response was received.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Timeout | ApiError::Network(_))
    }

    /// True for codes that invalidate the current credential.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Business { code: 401 | 403, .. })
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }

    #[must_use]
    pub fn code(&self) -> Option<i64> {
        match self {
            ApiError::Business { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => ApiError::Timeout,
            TransportError::Connect(reason) | TransportError::Other(reason) => {
                ApiError::Network(reason)
            }
        }
    }
}

/// Errors emitted while reading `ApiConfig`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid base url {value:?}: {source}")]
    InvalidBaseUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("base url must use http or https, got {0:?}")]
    UnsupportedScheme(String),
    #[error("invalid timeout {0:?}: expected a positive number of seconds")]
    InvalidTimeout(String),
}

/// Errors emitted by `SessionStore`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("not signed in")]
    NotAuthenticated,
    #[error("no refresh token available")]
    NoRefreshToken,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors emitted by `LearningStore`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LearningError {
    #[error("{0}")]
    Validation(&'static str),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors emitted by `ConversionStore`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConversionError {
    #[error("source code is empty")]
    EmptySource,
    #[error("conversion cancelled")]
    Cancelled,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors emitted while bootstrapping the portal context.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContextError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_network_errors() {
        assert_eq!(ApiError::from(TransportError::Timeout), ApiError::Timeout);
        assert!(ApiError::from(TransportError::Connect("refused".into())).is_network());
    }

    #[test]
    fn auth_codes() {
        let unauthorized = ApiError::Business {
            code: 401,
            message: String::new(),
        };
        assert!(unauthorized.is_auth());
        assert!(!unauthorized.is_network());
        assert!(
            !ApiError::Business {
                code: 500,
                message: String::new()
            }
            .is_auth()
        );
        assert_eq!(ApiError::Cancelled.code(), None);
    }
}
