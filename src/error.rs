//! Error types for collaborator calls.
//!
//! None of these escape the gate controller: a failed oracle query or flow
//! launch reads as "still ungranted" and the prompt comes back.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("capability query failed: {0}")]
    Oracle(String),

    #[error("could not launch {flow}: {reason}")]
    Launch { flow: &'static str, reason: String },

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value for {field}: {value}")]
    ConfigValue { field: &'static str, value: String },

    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path escapes storage root: {0}")]
    OutsideRoot(String),
}

pub type Result<T> = std::result::Result<T, GateError>;
