//! Error types for graph compilation and expression evaluation

use crate::issue::ValidationIssue;
use thiserror::Error;

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while validating, compiling or evaluating graph material.
#[derive(Debug, Clone, Error)]
pub enum GraphError {
    /// The document failed validation; the issues carry the details.
    #[error("workflow validation failed: {0:?}")]
    Validation(Vec<ValidationIssue>),

    /// Expression source could not be parsed.
    #[error("expression parse error: {0}")]
    ExprParse(String),

    /// A `${...}` template placeholder did not resolve against the context.
    #[error("unresolved template variable: {0}")]
    Template(String),
}

impl GraphError {
    /// The validation issues, when this is a validation failure.
    pub fn issues(&self) -> Option<&[ValidationIssue]> {
        match self {
            GraphError::Validation(issues) => Some(issues),
            _ => None,
        }
    }
}
