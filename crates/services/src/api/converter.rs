use serde::{Deserialize, Serialize};
use serde_json::Value;

use portal_core::model::{ConversionHistoryEntry, ConversionOptions};

use super::Page;
use crate::error::ApiError;
use crate::http::{ApiClient, ApiRequest, Method};

pub const CONVERT: &str = "/api/v1/converter/convert";
pub const HISTORY: &str = "/api/v1/converter/history";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConvertRequest<'a> {
    source_code: &'a str,
    source_language: &'static str,
    target_language: &'static str,
    options: &'a ConversionOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    #[serde(alias = "targetCode")]
    pub python_code: String,
    #[serde(default)]
    pub warnings: Vec<Value>,
    #[serde(default)]
    pub suggestions: Vec<Value>,
}

pub async fn convert(
    client: &ApiClient,
    source: &str,
    options: &ConversionOptions,
) -> Result<ConvertResponse, ApiError> {
    let request = ConvertRequest {
        source_code: source,
        source_language: "java",
        target_language: "python",
        options,
    };
    client.post(CONVERT, &request).await
}

pub async fn history(client: &ApiClient, size: u32) -> Result<Page<ConversionHistoryEntry>, ApiError> {
    client
        .send(ApiRequest::new(Method::Get, HISTORY).query("page", 1).query("size", size))
        .await
}
