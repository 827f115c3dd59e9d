use serde::{Deserialize, Serialize};

/// Multipart field carrying the uploaded frame.
pub const IMAGE_FIELD: &str = "image";

/// JSON body returned by the relay.
///
/// `{"status": "success", "image": "<base64>"}` or
/// `{"status": "error", "message": "<text>"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TransformResponse {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl TransformResponse {
    pub fn success(image: impl Into<String>) -> Self {
        Self::Success {
            image: Some(image.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: Some(message.into()),
        }
    }
}
