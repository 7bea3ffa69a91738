use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::http::Endpoint;

pub const BASE_URL_VAR: &str = "PORTAL_API_BASE_URL";
pub const TIMEOUT_VAR: &str = "PORTAL_API_TIMEOUT_SECS";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Envelope code that marks a successful response.
pub const SUCCESS_CODE: i64 = 200;

/// Where the portal API lives and how long a request may take.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: Url,
    pub timeout: Duration,
    pub success_code: i64,
}

impl ApiConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            success_code: SUCCESS_CODE,
        }
    }

    /// Read configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for
    /// missing or blank values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a value is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup(BASE_URL_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut config = Self::new(parse_base_url(base_url.trim())?);

        if let Some(raw) = lookup(TIMEOUT_VAR).filter(|v| !v.trim().is_empty()) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
            if secs == 0 {
                return Err(ConfigError::InvalidTimeout(raw));
            }
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Absolute URL of `endpoint` under the base URL. Path segments are
    /// percent-encoded.
    #[must_use]
    pub fn url_for(&self, endpoint: &Endpoint) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            segments.extend(endpoint.segments());
        }
        url
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|source| ConfigError::InvalidBaseUrl {
        value: raw.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.base_url.as_str(), "http://localhost:8080/");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.success_code, 200);
    }

    #[test]
    fn reads_overrides() {
        let config = ApiConfig::from_lookup(lookup(&[
            (BASE_URL_VAR, "https://portal.example.com/backend/"),
            (TIMEOUT_VAR, "3"),
        ]))
        .unwrap();
        assert_eq!(config.timeout, Duration::from_secs(3));
        let url = config.url_for(&Endpoint::new("/api/v1/learning/modules"));
        assert_eq!(
            url.as_str(),
            "https://portal.example.com/backend/api/v1/learning/modules"
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            ApiConfig::from_lookup(lookup(&[(TIMEOUT_VAR, "0")])),
            Err(ConfigError::InvalidTimeout(_))
        ));
        assert!(matches!(
            ApiConfig::from_lookup(lookup(&[(TIMEOUT_VAR, "soon")])),
            Err(ConfigError::InvalidTimeout(_))
        ));
        assert!(matches!(
            ApiConfig::from_lookup(lookup(&[(BASE_URL_VAR, "not a url")])),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            ApiConfig::from_lookup(lookup(&[(BASE_URL_VAR, "ftp://files.example.com")])),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn path_segments_are_encoded() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        let url = config.url_for(&Endpoint::new("/api/v1/learning/lessons").push("a b/c"));
        assert_eq!(url.path(), "/api/v1/learning/lessons/a%20b%2Fc");
    }
}
