// Error taxonomy for the clinic store and action endpoint

use thiserror::Error;

/// Everything the store and the action endpoint can fail with.
#[derive(Debug, Error)]
pub enum ClinicError {
    /// Draft failed validation; one human-readable message per problem.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A parameter had an unusable value (bad date filter, unknown field, ...).
    #[error("{0}")]
    InvalidArgument(String),

    /// The entity being edited does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A write referenced a pet or owner that does not exist.
    #[error("{0}")]
    MissingReference(String),

    /// Request was malformed (missing id, unknown action, ...).
    #[error("{0}")]
    BadRequest(String),

    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

impl ClinicError {
    pub fn not_found(entity: &str, id: i64) -> Self {
        ClinicError::NotFound(format!("{} {} not found", entity, id))
    }

    /// HTTP status the action endpoint answers with for this error.
    pub fn status(&self) -> u16 {
        match self {
            ClinicError::Validation(_) | ClinicError::InvalidArgument(_) => 422,
            ClinicError::NotFound(_) => 404,
            ClinicError::MissingReference(_) | ClinicError::BadRequest(_) => 400,
            ClinicError::Storage(_) | ClinicError::Csv(_) | ClinicError::Poisoned => 500,
        }
    }

    /// Message safe to show to clients. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ClinicError::Storage(_) => "database error".to_string(),
            ClinicError::Csv(_) | ClinicError::Poisoned => "server error".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClinicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ClinicError::Validation(vec!["x".into()]).status(), 422);
        assert_eq!(ClinicError::InvalidArgument("x".into()).status(), 422);
        assert_eq!(ClinicError::not_found("pet", 3).status(), 404);
        assert_eq!(ClinicError::MissingReference("x".into()).status(), 400);
        assert_eq!(ClinicError::BadRequest("x".into()).status(), 400);
        assert_eq!(ClinicError::Poisoned.status(), 500);
    }

    #[test]
    fn test_storage_errors_do_not_leak_detail() {
        let err = ClinicError::Storage(rusqlite::Error::InvalidQuery);
        assert_eq!(err.public_message(), "database error");
        assert_eq!(ClinicError::not_found("pet", 3).public_message(), "pet 3 not found");
    }
}
