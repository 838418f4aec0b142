//! Global error handler for envelope-returning tools.
//!
//! Known errors keep their category: data-layer errors carry their own
//! [`ErrorType`], artifact errors become validation or runtime errors, bad
//! arguments are validation errors. Anything else is `INTERNAL_SERVER_ERROR`
//! with a fresh error id that is also written to the log.

use historian_artifact::ArtifactError;
use historian_core::{ErrorDto, ErrorType, ResponseDto};
use historian_data::{DataError, SqlGuardError};
use serde::Serialize;

use crate::types::ToolResult;

/// Map an error onto the wire error shape, logging it.
pub fn error_dto(tool_name: &str, err: &anyhow::Error) -> ErrorDto {
    if let Some(e) = err.downcast_ref::<DataError>() {
        tracing::error!("A data error occurred in {}: {}", tool_name, e);
        return e.to_error_dto();
    }
    if let Some(e) = err.downcast_ref::<SqlGuardError>() {
        tracing::warn!("Rejected SQL in {}: {}", tool_name, e);
        return ErrorDto::new(ErrorType::ValidationError, e.to_string());
    }
    if let Some(e) = err.downcast_ref::<ArtifactError>() {
        tracing::error!("An artifact error occurred in {}: {}", tool_name, e);
        let error_type = match e {
            ArtifactError::InvalidFilename(_) => ErrorType::ValidationError,
            _ => ErrorType::RuntimeError,
        };
        return ErrorDto::new(error_type, e.to_string());
    }
    if let Some(e) = err.downcast_ref::<serde_json::Error>() {
        tracing::warn!("Invalid arguments for {}: {}", tool_name, e);
        return ErrorDto::new(ErrorType::ValidationError, format!("Invalid arguments: {}", e));
    }

    let error_id = uuid::Uuid::new_v4();
    tracing::error!(%error_id, "Unexpected error in {}: {:#}", tool_name, err);
    ErrorDto::new(
        ErrorType::InternalError,
        format!(
            "An unexpected internal error occurred {} and error id {}.",
            err, error_id
        ),
    )
}

/// Envelope JSON for a tool outcome: `success` with data, or `error`.
pub fn respond<T: Serialize>(tool_name: &str, result: anyhow::Result<T>) -> ToolResult {
    match result {
        Ok(data) => ToolResult::ok(tool_name, ResponseDto::success(data).to_json_string()),
        Err(e) => ToolResult::error(
            tool_name,
            ResponseDto::<()>::failure(error_dto(tool_name, &e)).to_json_string(),
        ),
    }
}
