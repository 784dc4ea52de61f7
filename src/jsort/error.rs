/// Failure taxonomy for the jsort pipeline.
///
/// A missing key is deliberately absent here: it is logged as a warning and
/// the record is framed with an empty key.
use std::io;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsortError {
    /// Invalid startup configuration; raised before any pipeline starts.
    #[error("{0}")]
    Config(String),

    /// An input line is not valid JSON.
    #[error("line {line}: invalid JSON")]
    Parse {
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    /// The sorter returned a line without a frame byte.
    #[error("sort output line {line} has no \\x02 separator")]
    ProtocolViolation { line: u64 },

    /// A key or record contains the frame byte and cannot be framed safely.
    #[error("line {line}: record or sort key contains the \\x02 frame byte")]
    Validation { line: u64 },

    #[error("cannot run '{command}'")]
    SpawnFailed {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("'{command}' failed: {status}")]
    SortFailed { command: String, status: ExitStatus },

    /// The sorter stopped reading before all input was written.
    #[error("sort closed its input early")]
    SortClosedInput,

    #[error("{0} thread panicked")]
    TaskPanicked(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),

    /// Task stopped because another task failed first. Never the pipeline result.
    #[error("cancelled")]
    Cancelled,
}

impl JsortError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JsortError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, JsortError>;
