//! Helix API types.

use serde::Deserialize;

/// Response body of `GET /helix/streams`.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamsResponse {
    pub data: Vec<StreamInfo>,
}

/// One live stream. Only the title is decoded, for logging.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamInfo {
    #[serde(default)]
    pub title: String,
}

/// Error body returned by Helix.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}
