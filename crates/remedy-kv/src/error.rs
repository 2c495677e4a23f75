//! Error types for remedy-kv

use std::path::PathBuf;

/// Result type for remedy-kv operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading, reconciling or writing a store
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The content violates the dialect grammar
    #[error("Failed to parse {path} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// The target could not be read
    #[error("Cannot access {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: remedy_host::Error,
    },

    /// The target could not be replaced
    #[error("Failed to write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: remedy_host::Error,
    },

    /// Caller passed data the editor cannot represent
    #[error("Invalid editor input: {0}")]
    Validation(String),

    /// A backing tool exited unsuccessfully or printed something unexpected
    #[error("`{command}` failed with exit code {code}: {stderr}")]
    ExternalTool {
        command: String,
        code: i32,
        stderr: String,
    },

    /// Spawn failures, timeouts and interrupts from the command runner
    #[error(transparent)]
    Host(#[from] remedy_host::Error),
}

impl Error {
    pub fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub fn is_interrupt(&self) -> bool {
        match self {
            Self::Host(e) | Self::FileAccess { source: e, .. } | Self::FileWrite { source: e, .. } => {
                e.is_interrupt()
            }
            _ => false,
        }
    }
}
