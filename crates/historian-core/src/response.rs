//! Response envelope returned by tools to the agent.
//!
//! Every tool result that carries structured data is serialized as
//! `{"status": "success"|"error", "data": ..., "error": ..., "metadata": ...}`
//! so the model always sees one shape, even on failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Error categories exposed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    DatabaseError,
    ValidationError,
    NotFound,
    Unauthorized,
    InternalError,
    LlmError,
    RuntimeError,
}

impl ErrorType {
    /// Upper-case error code.
    pub fn code(self) -> &'static str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InternalError => "INTERNAL_SERVER_ERROR",
            Self::LlmError => "LLM_RESPONSE_ERROR",
            Self::RuntimeError => "RUNTIME_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDto {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorDto {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            code: error_type.code().to_string(),
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseDto<T> {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl<T> ResponseDto<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: ResponseStatus::Success,
            data: Some(data),
            error: None,
            metadata: None,
        }
    }

    pub fn failure(error: ErrorDto) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: None,
            error: Some(error),
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success && self.error.is_none()
    }
}

impl<T: Serialize> ResponseDto<T> {
    /// Compact JSON for tool output. Serialization of our own types cannot
    /// realistically fail; if it does the error is reported in the same shape.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"status":"error","error":{{"type":"internal_error","code":"INTERNAL_SERVER_ERROR","message":"response serialization failed: {}"}}}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}
