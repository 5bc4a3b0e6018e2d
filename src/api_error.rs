use crate::openai_interface::null_as_default;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// Everything that can go wrong talking to the API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("failed to serialize request body: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("failed to encode multipart body: {0}")]
    MultipartEncoding(String),

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    // When a bad status is returned from a network connection.
    // Includes the failing code and the message the server sent
    #[error("non-success status code {}: {message}", .status.as_u16())]
    Status {
        status: StatusCode,
        message: String,
        detail: ErrorDetail,
        headers: HashMap<String, String>,
    },

    #[error("failed to decode response: {0}")]
    Decoding(#[source] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl ApiError {
    /// The HTTP status of a remote failure
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Problems with the client configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no API key")]
    NoApiKey,
    #[error("no API base URL")]
    NoApiBaseUrl,
    #[error("header '{0}' has a value that cannot be sent")]
    InvalidHeader(&'static str),
}

/// A request object is missing something it needs, or has something
/// the API will not accept.  Detected before anything is sent
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum ValidationError {
    #[error("model is required")]
    ModelRequired,
    #[error("prompt is required")]
    PromptRequired,
    #[error("message is required")]
    MessageRequired,
    #[error("input is required")]
    InputRequired,
    #[error("instruction is required")]
    InstructionRequired,
    #[error("image is required")]
    ImageRequired,
    #[error("file is required")]
    FileRequired,
    #[error("purpose is required")]
    PurposeRequired,
    #[error("invalid response format")]
    InvalidResponseFormat,
    #[error("invalid size")]
    InvalidSize,
    #[error("invalid role")]
    InvalidRole,
}

/// Error details returned by the server
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// The envelope an error comes back in: `{"error": {...}}`
#[derive(Debug, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub error: ErrorDetail,
}
