use std::path::PathBuf;

use thiserror::Error;

use crate::warehouse::WarehouseError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by the scaffolding, extraction and config parsing paths.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid table identifier '{identifier}', expected 'project.dataset.table'")]
    InvalidTableId { identifier: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("warehouse request for {table} failed: {source}")]
    Remote {
        table: String,
        #[source]
        source: WarehouseError,
    },

    #[error("failed to serialize schema: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("syntax error in {}: {message}", path.display())]
    Syntax { path: PathBuf, message: String },

    #[error("required variable {name} has no value")]
    MissingVariable { name: String },

    #[error("failed to evaluate {}: {message}", path.display())]
    Evaluation { path: PathBuf, message: String },

    #[error("invalid configuration in {}: {message}", path.display())]
    InvalidConfig { path: PathBuf, message: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
