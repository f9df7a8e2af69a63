//! Error taxonomy of the alert core.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::{AlertName, CheckTime, Coordinates};

/// The forecast source could not produce usable data.
#[derive(Debug, Clone, Error)]
pub enum Unavailable {
    #[error("forecast request failed: {0}")]
    Request(String),

    #[error("forecast source answered with status {status}: {body}")]
    Status { status: String, body: String },

    #[error("malformed forecast data: {0}")]
    Malformed(String),

    #[error("no recent forecast data")]
    Stale,
}

/// Failures of the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode store document: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode store document: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Errors returned to command handlers by registry and scheduler operations.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error(transparent)]
    Unavailable(#[from] Unavailable),

    #[error("alert already active: {name}")]
    DuplicateAlert { name: AlertName },

    #[error("invalid check time {time:?}")]
    InvalidTime { time: CheckTime },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Startup cannot reproduce the persisted schedule.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("persisted location {coords} could not be resolved: {source}")]
    Location {
        coords: Coordinates,
        #[source]
        source: Unavailable,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
