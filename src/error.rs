use thiserror::Error;

/// Message returned when a delete is blocked by dependent rows.
pub const REFERENTIAL_CONFLICT_MESSAGE: &str =
    "Cannot delete the selected records because they have related child records.";

/// SQLSTATE for `foreign_key_violation`
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Error taxonomy shared by every engine component.
///
/// Everything except `Internal` is recoverable by the caller and carries a
/// message that is safe to show to an end user.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed request shape (missing field, wrong type, unknown filter field)
    #[error("{0}")]
    ValidationFailure(String),
    /// Bulk-edit field not allow-listed or not a physical column
    #[error("{0}")]
    InvalidField(String),
    /// Value does not satisfy the column's physical type
    #[error("{0}")]
    InvalidValue(String),
    #[error("{0}")]
    NotFound(String),
    /// Delete blocked by dependent rows
    #[error("{0}")]
    ReferentialConflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailure(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Short machine-readable name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::ValidationFailure(_) => "validation_failure",
            EngineError::InvalidField(_) => "invalid_field",
            EngineError::InvalidValue(_) => "invalid_value",
            EngineError::NotFound(_) => "not_found",
            EngineError::ReferentialConflict(_) => "referential_conflict",
            EngineError::Internal(_) => "internal_failure",
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, EngineError::Internal(_))
    }
}

impl EngineError {
    /// A bulk edit pointed a foreign-key column at a row that does not exist.
    pub fn dangling_reference(field: &str) -> Self {
        EngineError::InvalidValue(format!(
            "The selected {} does not refer to an existing record.",
            field
        ))
    }
}

pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(FOREIGN_KEY_VIOLATION),
        _ => false,
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        if is_foreign_key_violation(&err) {
            return EngineError::ReferentialConflict(REFERENTIAL_CONFLICT_MESSAGE.to_string());
        }
        EngineError::Internal(anyhow::Error::new(err).context("Storage query failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_wraps_anyhow() {
        let err: EngineError = anyhow::anyhow!("connection reset").into();
        assert!(err.is_internal());
        assert_eq!(err.kind(), "internal_failure");
    }

    #[test]
    fn test_non_database_sqlx_error_is_internal() {
        let err: EngineError = sqlx::Error::RowNotFound.into();
        assert!(err.is_internal());
    }

    #[test]
    fn test_dangling_reference_is_a_bad_value() {
        let err = EngineError::dangling_reference("location_id");
        assert!(matches!(err, EngineError::InvalidValue(_)));
        assert!(err.to_string().contains("location_id"));
    }

    #[test]
    fn test_display_is_the_message() {
        let err = EngineError::validation("The ids field is required.");
        assert_eq!(err.to_string(), "The ids field is required.");
        assert_eq!(err.kind(), "validation_failure");
    }
}
