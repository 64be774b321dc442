use thiserror::Error;

/// Every fatal condition the loader can hit, named so its `Display` text
/// matches the message fragments the end-to-end fixtures assert on.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Expected {expected} columns")]
    ColumnCount { expected: usize },

    #[error("Row in relationship file should have at least 2 elements")]
    RelationArity,

    #[error("Identifier '{raw}' used multiple times in namespace {namespace:?}")]
    DuplicateIdentifier { namespace: Option<String>, raw: String },

    #[error("Unknown identifier '{raw}' referenced in namespace {namespace:?}")]
    UnknownIdentifier { namespace: Option<String>, raw: String },

    /// `suffix` is already fully formatted: empty for most declared
    /// types, `" as an array"` for a failed array literal, matching the
    /// source's message, which only ever names the array case explicitly.
    #[error("Could not parse '{literal}'{suffix}")]
    SchemaError { literal: String, suffix: String },

    #[error("Record for label/type '{label}' ({size} bytes) exceeds the batch ceiling alone")]
    OversizedRow { label: String, size: usize },

    #[error("Embedded NUL byte in string value is not supported")]
    EmbeddedNul,

    #[error("target graph '{0}' is not empty")]
    GraphNotEmpty(String),

    #[error("server refused command: {0}")]
    Server(String),

    #[error("{0}")]
    Csv(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    pub fn schema_error(literal: impl Into<String>) -> Self {
        LoaderError::SchemaError {
            literal: literal.into(),
            suffix: String::new(),
        }
    }

    pub fn schema_error_array(literal: impl Into<String>) -> Self {
        LoaderError::SchemaError {
            literal: literal.into(),
            suffix: " as an array".to_string(),
        }
    }
}
