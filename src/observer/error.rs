use std::time::Duration;
use thiserror::Error;

use crate::observer::traits::ObserverRing;

/// Observer system errors with structured error types
#[derive(Debug, Error, Clone)]
pub enum ObserverError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("System error: {0}")]
    SystemError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Pipeline execution failed: {0}")]
    PipelineError(String),
}

/// Observer warnings (non-fatal issues)
#[derive(Debug, Clone)]
pub struct ObserverWarning {
    pub observer: String,
    pub ring: u8,
    pub message: String,
}

impl ObserverWarning {
    pub fn new(observer: &str, ring: ObserverRing, message: impl Into<String>) -> Self {
        Self {
            observer: observer.to_string(),
            ring: ring as u8,
            message: message.into(),
        }
    }
}

/// Outcome of the synchronous part of a dispatch
#[derive(Debug, Clone)]
pub struct ObserverResult {
    pub success: bool,
    pub errors: Vec<ObserverError>,
    pub warnings: Vec<ObserverWarning>,
    pub execution_time: Duration,
    pub rings_executed: Vec<ObserverRing>,
}

impl ObserverResult {
    /// First collected error, for callers that fail the request on it
    pub fn into_result(self) -> Result<Vec<ObserverWarning>, ObserverError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(self.warnings),
        }
    }
}

impl From<crate::database::manager::DatabaseError> for ObserverError {
    fn from(error: crate::database::manager::DatabaseError) -> Self {
        ObserverError::DatabaseError(error.to_string())
    }
}

impl From<sqlx::Error> for ObserverError {
    fn from(error: sqlx::Error) -> Self {
        ObserverError::DatabaseError(error.to_string())
    }
}

impl From<crate::services::ServiceError> for ObserverError {
    fn from(error: crate::services::ServiceError) -> Self {
        use crate::services::ServiceError;
        match error {
            ServiceError::Validation(msg) | ServiceError::Conflict(msg) => ObserverError::ValidationError(msg),
            ServiceError::FieldValidation { field, message } => {
                ObserverError::ValidationError(format!("{}: {}", field, message))
            }
            other => ObserverError::SystemError(other.to_string()),
        }
    }
}

impl From<crate::services::audit::AuditError> for ObserverError {
    fn from(error: crate::services::audit::AuditError) -> Self {
        ObserverError::SystemError(error.to_string())
    }
}
