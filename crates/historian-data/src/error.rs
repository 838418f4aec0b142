use historian_core::{ErrorDto, ErrorType};
use serde_json::Value;

use crate::sql::SqlGuardError;

/// Errors from the data layer. Each maps onto an [`ErrorType`] for the wire envelope.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Database { message: String, details: Value },

    #[error(transparent)]
    SqlGuard(#[from] SqlGuardError),

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("{0}")]
    Generation(String),

    #[error("Chart error: {0}")]
    Chart(String),
}

pub type Result<T> = std::result::Result<T, DataError>;

impl DataError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::Validation(_) | Self::SqlGuard(_) => ErrorType::ValidationError,
            Self::Database { .. } => ErrorType::DatabaseError,
            Self::Llm(_) | Self::Generation(_) => ErrorType::LlmError,
            Self::Chart(_) => ErrorType::RuntimeError,
        }
    }

    pub fn to_error_dto(&self) -> ErrorDto {
        let dto = ErrorDto::new(self.error_type(), self.to_string());
        match self {
            Self::Database { details, .. } => dto.with_details(details.clone()),
            _ => dto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_type_mapping() {
        assert_eq!(
            DataError::validation("Question cannot be empty").error_type(),
            ErrorType::ValidationError
        );
        assert_eq!(
            DataError::from(SqlGuardError::Empty).error_type(),
            ErrorType::ValidationError
        );
        assert_eq!(DataError::Llm("timeout".into()).error_type(), ErrorType::LlmError);
    }

    #[test]
    fn test_database_error_dto_carries_details() {
        let err = DataError::Database {
            message: "Database query failed: relation \"nope\" does not exist".into(),
            details: json!({"query": "SELECT * FROM nope"}),
        };
        let dto = err.to_error_dto();
        assert_eq!(dto.code, "DATABASE_ERROR");
        assert_eq!(dto.details.unwrap()["query"], "SELECT * FROM nope");
        assert!(dto.message.starts_with("Database query failed"));
    }
}
