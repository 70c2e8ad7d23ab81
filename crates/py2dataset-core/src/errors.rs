//! Error types for the py2dataset core library.
//!
//! Only [`DatasetError::Config`] (and the I/O or decoding errors raised while
//! loading configuration) abort a run. The per-file kinds below are recovered
//! by the pipeline: a [`ParseError`] skips the file, a [`GenerationFailure`]
//! falls back to the placeholder answer and an [`AssemblyError`] is a cache
//! miss.

use std::time::Duration;

/// Top-level error enum for the py2dataset core library.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Generation(#[from] GenerationFailure),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// A source file that could not be structurally analyzed.
///
/// `line` and `column` are 1-based and point at the first syntax error the
/// parser reported, when one could be located.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Parse error in {file}{}: {message}", location_suffix(.line, .column))]
pub struct ParseError {
    pub file: String,
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl ParseError {
    pub fn new(file: &str, message: impl Into<String>) -> Self {
        Self {
            file: file.to_string(),
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn at(file: &str, message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.to_string(),
            message: message.into(),
            line: Some(line),
            column: Some(column),
        }
    }
}

fn location_suffix(line: &Option<usize>, column: &Option<usize>) -> String {
    match (line, column) {
        (Some(l), Some(c)) => format!(" at {l}:{c}"),
        (Some(l), None) => format!(" at line {l}"),
        _ => String::new(),
    }
}

/// A failed call to the text-generation provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationFailure {
    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Malformed provider output: {0}")]
    MalformedOutput(String),

    #[error("Prompt needs {required} tokens but only {available} fit the context window")]
    ContextOverflow { required: usize, available: usize },
}

/// A prior per-file dataset that could not be reused.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("Prior dataset for {file} is missing")]
    Missing { file: String },

    #[error("Prior dataset for {file} is unreadable: {source}")]
    Unreadable {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Prior dataset for {file} is corrupt: {reason}")]
    Corrupt { file: String, reason: String },
}
