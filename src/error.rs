use std::{fmt, io, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Which half of the connection an interest registration targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// The reactor refused a read or write interest registration. Fatal for the request.
    #[error("failed to register {direction} interest on connection {conn}: {source}")]
    InterestRegistration {
        conn: u64,
        direction: Direction,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("invalid time value {value:?}")]
    InvalidTime { value: String },

    #[error("malformed request: {0}")]
    BadRequest(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}
