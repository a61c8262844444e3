//! Error types for filter compilation, fetch planning and execution

use serde::Serialize;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the query language.
///
/// Every variant is request-scoped. Compilation errors are raised before any
/// round trip is issued; store errors abort the whole page request.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unbalanced group at index {index}")]
    UnbalancedGroup { index: usize },

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Cannot coerce '{value}' for field '{field}' to {target}")]
    TypeCoercion {
        field: String,
        value: String,
        target: String,
    },

    #[error("Operator '{operator}' is not supported for field '{field}'")]
    UnsupportedOperator { operator: String, field: String },

    #[error("Malformed fetch plan at index {index}: {message}")]
    MalformedFetchPlan { index: usize, message: String },

    #[error("Join fetch '{0}' cannot carry a bound or a sort order")]
    JoinCannotBound(String),

    #[error("Ambiguous back-reference for {entity}.{attribute}: candidates {candidates:?}")]
    AmbiguousBackReference {
        entity: String,
        attribute: String,
        candidates: Vec<String>,
    },

    #[error("No back-reference found for {entity}.{attribute}")]
    MissingBackReference { entity: String, attribute: String },

    #[error("Attribute not found: {entity}.{attribute}")]
    AttributeNotFound { entity: String, attribute: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Invalid pager: {0}")]
    InvalidPager(String),

    #[error("Request too costly: {0}")]
    TooCostly(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Store error: {0}")]
    Store(String),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnbalancedGroup,
    UnknownOperator,
    UnknownFunction,
    TypeCoercionError,
    UnsupportedOperator,
    MalformedFetchPlan,
    JoinCannotBound,
    AmbiguousBackReference,
    MissingBackReference,
    AttributeNotFound,
    InvalidPath,
    UnknownEntity,
    InvalidPager,
    TooCostly,
    Schema,
    Config,
    Store,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnbalancedGroup => "unbalanced_group",
            Self::UnknownOperator => "unknown_operator",
            Self::UnknownFunction => "unknown_function",
            Self::TypeCoercionError => "type_coercion_error",
            Self::UnsupportedOperator => "unsupported_operator",
            Self::MalformedFetchPlan => "malformed_fetch_plan",
            Self::JoinCannotBound => "join_cannot_bound",
            Self::AmbiguousBackReference => "ambiguous_back_reference",
            Self::MissingBackReference => "missing_back_reference",
            Self::AttributeNotFound => "attribute_not_found",
            Self::InvalidPath => "invalid_path",
            Self::UnknownEntity => "unknown_entity",
            Self::InvalidPager => "invalid_pager",
            Self::TooCostly => "too_costly",
            Self::Schema => "schema",
            Self::Config => "config",
            Self::Store => "store",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnbalancedGroup { .. } => ErrorKind::UnbalancedGroup,
            Error::UnknownOperator(_) => ErrorKind::UnknownOperator,
            Error::UnknownFunction(_) => ErrorKind::UnknownFunction,
            Error::TypeCoercion { .. } => ErrorKind::TypeCoercionError,
            Error::UnsupportedOperator { .. } => ErrorKind::UnsupportedOperator,
            Error::MalformedFetchPlan { .. } => ErrorKind::MalformedFetchPlan,
            Error::JoinCannotBound(_) => ErrorKind::JoinCannotBound,
            Error::AmbiguousBackReference { .. } => ErrorKind::AmbiguousBackReference,
            Error::MissingBackReference { .. } => ErrorKind::MissingBackReference,
            Error::AttributeNotFound { .. } => ErrorKind::AttributeNotFound,
            Error::InvalidPath(_) => ErrorKind::InvalidPath,
            Error::UnknownEntity(_) => ErrorKind::UnknownEntity,
            Error::InvalidPager(_) => ErrorKind::InvalidPager,
            Error::TooCostly(_) => ErrorKind::TooCostly,
            Error::Schema(_) => ErrorKind::Schema,
            Error::Config(_) => ErrorKind::Config,
            Error::Store(_) => ErrorKind::Store,
            #[cfg(feature = "postgres")]
            Error::Database(_) => ErrorKind::Store,
        }
    }

    /// Whether the error was caused by caller-supplied input rather than the
    /// backing store or the deployment.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::Schema | ErrorKind::Config | ErrorKind::Store
        )
    }

    pub(crate) fn coercion(field: &str, value: &str, target: impl ToString) -> Self {
        Error::TypeCoercion {
            field: field.to_string(),
            value: value.to_string(),
            target: target.to_string(),
        }
    }

    pub(crate) fn attribute_not_found(entity: &str, attribute: &str) -> Self {
        Error::AttributeNotFound {
            entity: entity.to_string(),
            attribute: attribute.to_string(),
        }
    }

    pub(crate) fn malformed_plan(index: usize, message: impl Into<String>) -> Self {
        Error::MalformedFetchPlan {
            index,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_classified() {
        assert!(Error::UnbalancedGroup { index: 3 }.is_client_error());
        assert!(Error::JoinCannotBound("orders".into()).is_client_error());
        assert!(!Error::Store("connection reset".into()).is_client_error());
        assert_eq!(
            Error::coercion("age", "abc", "integer").kind().as_str(),
            "type_coercion_error"
        );
    }

    #[test]
    fn messages_name_the_offending_input() {
        let err = Error::coercion("created", "yesterday", "date");
        let msg = err.to_string();
        assert!(msg.contains("created"));
        assert!(msg.contains("yesterday"));
        assert!(msg.contains("date"));
    }
}
