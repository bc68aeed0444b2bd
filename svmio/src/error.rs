//! Errors raised while reading svmlight-style inputs.
//!
//! Every error here is fatal for the read that produced it: a bad line can't
//! be skipped without desynchronizing the data and weights files.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Line numbers are 1-based, counted in the data file.
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("line {line}: label {label:?} is not 0 or 1")]
    Label { line: usize, label: String },

    #[error("line {line}: sample weight {weight} must be finite and non-negative")]
    Weight { line: usize, weight: f64 },

    #[error("line {line}: weights file ended before the data file")]
    MissingWeight { line: usize },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        Error::Parse {
            line,
            reason: reason.into(),
        }
    }
}
