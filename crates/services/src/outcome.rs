use std::fmt::Display;

use serde::Serialize;

/// Uniform result handed to the view layer: branch on `success`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

impl<T, E: Display> From<Result<T, E>> for Outcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionError;

    #[test]
    fn serializes_without_empty_fields() {
        let ok: Outcome<u8> = Ok::<u8, ConversionError>(3).into();
        assert_eq!(
            serde_json::to_string(&ok).unwrap(),
            r#"{"success":true,"data":3}"#
        );

        let failed: Outcome<u8> = Err::<u8, _>(ConversionError::EmptySource).into();
        assert_eq!(
            serde_json::to_string(&failed).unwrap(),
            r#"{"success":false,"error":"source code is empty"}"#
        );
    }
}
