//! Query engine error types.

use thiserror::Error;

/// Errors raised while compiling request parameters into a query descriptor.
///
/// Client noise (unknown fields, unparseable numbers, unknown column types)
/// never surfaces here; it is dropped or defaulted where it is found.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("malformed {param} payload: {source}")]
    MalformedPayload {
        param: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for '{field}': {value}")]
    InvalidValue { field: String, value: String },

    #[error("include '{alias}' is nested deeper than {max} levels")]
    IncludeTooDeep { alias: String, max: usize },

    #[error("unknown entity '{name}'")]
    UnknownEntity { name: String },

    #[error("unknown relation '{alias}' in order path")]
    UnknownRelation { alias: String },

    #[error("no SQL renderer for dialect '{dialect}'")]
    UnsupportedDialect { dialect: String },

    #[error("pipeline has no transform that produces an output")]
    MissingOutput,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl QueryError {
    pub(crate) fn malformed(param: &'static str, source: serde_json::Error) -> Self {
        tracing::warn!(param, error = %source, "rejecting malformed query payload");
        Self::MalformedPayload { param, source }
    }

    pub(crate) fn invalid_value(field: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        tracing::warn!(field, %value, "rejecting invalid filter value");
        Self::InvalidValue {
            field: field.to_string(),
            value,
        }
    }
}

/// Result type alias using QueryError.
pub type QueryResult<T> = Result<T, QueryError>;
