use std::{io, path::PathBuf};

use crate::invariants::Timestamp;

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("cannot open log {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("cannot read log {} after line {line}: {source}", .path.display())]
    Read {
        path: PathBuf,
        line: usize,
        source: io::Error,
    },

    #[error("bad rotation pattern for {}: {source}", .base.display())]
    Discover {
        base: PathBuf,
        source: glob::PatternError,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line does not follow the access log grammar")]
    Malformed,

    #[error("invalid {field} field: {value:?}")]
    Field { field: &'static str, value: String },

    #[error("timestamp {raw:?} does not match format {format:?}")]
    Timestamp { raw: String, format: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("watermark moved during the run (expected {expected:?}, found {found:?})")]
    Conflict {
        expected: Option<Timestamp>,
        found: Option<Timestamp>,
    },

    #[error("watermark would move backwards from {current} to {proposed}")]
    Regression {
        current: Timestamp,
        proposed: Timestamp,
    },

    #[error("corrupt store value: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("no access log could be read")]
    NoReadableLogs,

    #[error("cannot write report {}: {source}", .path.display())]
    Report { path: PathBuf, source: io::Error },
}
