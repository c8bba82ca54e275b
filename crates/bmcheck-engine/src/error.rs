use bmcheck_ir::validation::ValidationError;
use bmcheck_smt::EncodingError;
use thiserror::Error;

/// Errors that abort a checking run.
///
/// Solver failures while deciding a single property are not errors: they
/// mark that property ERROR and the run continues.
#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("Input inconsistency: {0}")]
    InputInconsistency(String),
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),
    #[error("Solver error: {0}")]
    Solver(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ValidationError> for CheckerError {
    fn from(err: ValidationError) -> Self {
        CheckerError::InputInconsistency(err.to_string())
    }
}

impl CheckerError {
    pub(crate) fn inconsistent(message: impl Into<String>) -> Self {
        CheckerError::InputInconsistency(message.into())
    }
}
