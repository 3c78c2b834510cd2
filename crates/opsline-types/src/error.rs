use thiserror::Error;

/// Errors from pipeline and form data validation.
///
/// A closed set: every variant carries the identifiers that caused it so
/// callers can surface the error verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field '{field}'")]
    MissingRequiredField { field: String },

    #[error("pipeline has no steps")]
    ZeroSteps,

    #[error("step '{step}' has invalid type '{kind}'")]
    InvalidStepType { step: String, kind: String },

    #[error("duplicate step name '{step}'")]
    DuplicateStepName { step: String },

    #[error("step '{step}' is not terminal and has no next step")]
    NoNextStep { step: String },

    #[error("step '{step}' references unknown step '{reference}'")]
    NoStepNameFound { step: String, reference: String },

    #[error("step '{step}' has inconsistent link with step '{reference}'")]
    InvalidStepReference { step: String, reference: String },

    #[error("first step '{step}' has previous step '{prev}'")]
    FirstStepContainsPrevStep { step: String, prev: String },

    #[error("first step '{step}' does not exist")]
    InvalidFirstStepReference { step: String },

    #[error("circular reference: step '{to}' points back to '{from}'")]
    CircularReference { from: String, to: String },

    #[error("form field '{field}' must be of type {expected}")]
    InvalidFormDataType { field: String, expected: String },

    #[error("'{got}' is not one of the allowed values {allowed:?}")]
    InvalidSelectedFormData { allowed: Vec<String>, got: String },
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        ValidationError::MissingRequiredField {
            field: field.into(),
        }
    }
}

/// Errors from repository operations (used by trait definitions in opsline-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}
