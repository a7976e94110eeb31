use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeepCompareError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path error: {0}")]
    Path(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Hash algorithm not available: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Unable to scan {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Log file error for {}: {source}", path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Comparison cancelled")]
    Cancelled,

    #[error("Comparison error: {0}")]
    Comparison(String),
}

pub type Result<T> = std::result::Result<T, DeepCompareError>;
