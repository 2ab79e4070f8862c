use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to the counter store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("store operation timed out")]
    Timeout,

    #[error("unexpected store reply: {0}")]
    Protocol(String),

    #[error("store reported an error: {0}")]
    ServerError(String),

    #[error("invalid counter key: {0:?}")]
    InvalidKey(String),
}

/// Startup and per-connection failures of the gate.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read tokens from {path}: {source}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0} timed out")]
    Timeout(&'static str),
}

pub type Result<T> = std::result::Result<T, GateError>;
