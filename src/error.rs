use std::path::PathBuf;

use thiserror::Error;

/// Every failure the library can surface. File-bound variants carry the
/// offending name or path so a batch caller can log and move on.
#[derive(Error, Debug)]
pub enum Error {
    #[error("filename does not match any supported grammar: {filename}")]
    Format { filename: String },

    #[error("{filename}: token '{token}' is not a number with unit suffix")]
    TokenFormat { filename: String, token: String },

    #[error("{filename}: {field} value '{value}' is out of range")]
    FieldRange {
        filename: String,
        field: String,
        value: String,
    },

    #[error("{}: {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("{}: line {line}: {reason}", path.display())]
    Shape {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("invalid analysis input: {0}")]
    Input(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
