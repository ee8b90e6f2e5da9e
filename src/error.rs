use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal puzzle misconfiguration detected while building an instance.
#[derive(Debug, Error, PartialEq)]
pub enum SetupError {
    #[error("puzzle name is empty")]
    EmptyName,
    #[error("puzzle '{puzzle}' has no nodes besides the output node")]
    NoNodes { puzzle: String },
    #[error("puzzle '{puzzle}' has an empty wire catalog")]
    NoWires { puzzle: String },
    #[error("puzzle '{puzzle}' has no end node, it can never be completed")]
    NoEndNode { puzzle: String },
    #[error("puzzle '{puzzle}' node {index} has a non-finite position")]
    InvalidPosition { puzzle: String, index: usize },
    #[error("puzzle '{puzzle}' wire {index} has invalid length {length}")]
    InvalidWireLength {
        puzzle: String,
        index: usize,
        length: f32,
    },
    #[error("puzzle '{puzzle}' node voltages can overflow the charge total")]
    VoltageOverflow { puzzle: String },
    #[error("puzzle '{0}' is defined more than once")]
    DuplicatePuzzle(String),
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid layout {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: SetupError,
    },
    #[error(transparent)]
    Setup(#[from] SetupError),
}
