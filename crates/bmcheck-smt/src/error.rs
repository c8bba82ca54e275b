use bmcheck_ir::types::TypeId;
use thiserror::Error;

/// Failure to translate IR types or expressions into solver terms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("struct {0} has no definition")]
    UnknownStruct(TypeId),
    #[error("unsupported encoding: {0}")]
    Unsupported(String),
    #[error("sort mismatch: {0}")]
    SortMismatch(String),
}
