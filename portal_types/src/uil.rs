use serde::{Deserialize, Serialize};

/// Body of `POST /uil`: the Unique Identifier Link of one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UilSearchRequest {
    pub dataset_id: String,
    pub platform_id: String,
    pub gate_id: String,
}

impl UilSearchRequest {
    pub fn new(
        dataset_id: impl Into<String>,
        platform_id: impl Into<String>,
        gate_id: impl Into<String>,
    ) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            platform_id: platform_id.into(),
            gate_id: gate_id.into(),
        }
    }
}

/// Body of `GET /uil?requestId=<id>`.
///
/// `data` is the base64-encoded dataset document, present once the request
/// is complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UilResponse {
    pub request_id: String,
    pub status: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl UilResponse {
    pub fn new(request_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            status: status.into(),
            error_code: None,
            error_description: None,
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, description: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.error_description = Some(description.into());
        self
    }
}

/// Body of `POST /note`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRequest {
    pub request_id: String,
    pub message: String,
}

impl NoteRequest {
    pub fn new(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            message: message.into(),
        }
    }
}
