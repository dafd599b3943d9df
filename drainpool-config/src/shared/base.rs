use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A field holds a value outside its allowed range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}

impl ValidationError {
    pub(crate) fn invalid(field: &str, constraint: &str) -> Self {
        ValidationError::InvalidFieldValue {
            field: field.to_string(),
            constraint: constraint.to_string(),
        }
    }
}
