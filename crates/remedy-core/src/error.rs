//! Error types for remedy-core

use std::path::PathBuf;

/// Result type for remedy-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in remedy-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The persisted rule configuration is missing
    #[error("Configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// The persisted rule configuration does not follow its grammar
    #[error("Invalid configuration {path} at line {line}: {message}")]
    ConfigParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A configuration item was given a value of the wrong shape
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// An applicability descriptor cannot be evaluated
    #[error("Invalid applicability descriptor: {0}")]
    Applicability(String),

    /// Two rules share an id, or a lookup named an unknown rule
    #[error("Rule registry error: {0}")]
    Registry(String),

    /// A lifecycle call was made in a state that does not allow it
    #[error("Rule {rule} cannot {action}: {reason}")]
    Lifecycle {
        rule: String,
        action: &'static str,
        reason: String,
    },

    /// Error in change log operations
    #[error("Change log error: {message}")]
    ChangeLog { message: String },

    /// Event not found in the change log
    #[error("Event not found: {id}")]
    EventNotFound { id: String },

    // Transparent wrappers for underlying crate errors
    /// Host error from remedy-host
    #[error(transparent)]
    Host(#[from] remedy_host::Error),

    /// Store or editor error from remedy-kv
    #[error(transparent)]
    Kv(#[from] remedy_kv::Error),

    /// JSON serialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// True when the error is an operator interrupt that must be re-raised.
    pub fn is_interrupt(&self) -> bool {
        match self {
            Self::Host(e) => e.is_interrupt(),
            Self::Kv(e) => e.is_interrupt(),
            _ => false,
        }
    }

    /// True for programming or configuration mistakes that must fail fast.
    pub fn is_fatal(&self) -> bool {
        self.is_interrupt()
            || matches!(
                self,
                Self::Kv(remedy_kv::Error::Validation(_))
                    | Self::InvalidValue { .. }
                    | Self::Applicability(_)
                    | Self::Lifecycle { .. }
            )
    }
}
