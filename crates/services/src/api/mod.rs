//! Typed endpoints. Every route lives under the `/api/v1` prefix.

pub mod converter;
pub mod learning;
pub mod user;

use serde::Deserialize;

/// Paged list returned by history-style endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub size: u32,
}
