use std::path::PathBuf;

/// The error taxonomy surfaced at the decoder/reader/rule-loader boundary.
/// The solver itself never errors - unresolved lookups evaluate to false.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("invalid signature in {path}: {message}")]
    InvalidSignature { path: PathBuf, message: String },

    #[error("unsupported format in {path}: {message}")]
    UnsupportedFormat { path: PathBuf, message: String },

    #[error("parse error in {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("corrupted data in {path}: {message}")]
    CorruptedData { path: PathBuf, message: String },

    #[error("unsupported version in {path}: {message}")]
    UnsupportedVersion { path: PathBuf, message: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("unsupported modifier: {0}")]
    UnsupportedModifier(String),

    #[error("unsupported condition: {0}")]
    UnsupportedCondition(String),

    #[error("invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
