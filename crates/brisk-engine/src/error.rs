//! Error types for brisk.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced at the engine boundary.
///
/// Exceptions raised by generated code travel inside the VM as
/// [`Exception`](crate::runtime::exception::Exception) values; only those that
/// reach an activation boundary uncaught are turned into [`Error::Uncaught`].
#[derive(Error, Debug)]
pub enum Error {
    /// The program was rejected before code generation (early error)
    #[error("SyntaxError: {0}")]
    Syntax(String),

    /// Code generation received input the binder should have rejected
    #[error("internal compiler error: {0}")]
    Internal(String),

    /// An exception escaped the activation
    #[error("Uncaught {value}")]
    Uncaught {
        /// Rendered exception value
        value: String,
        /// Rendered exceptions superseded while unwinding through `finally`
        suppressed: Vec<String>,
    },

    /// The call depth limit was hit outside of any protected region
    #[error("InternalError: too much recursion")]
    StackOverflow,

    /// Invalid configuration file
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed AST interchange
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Builds an internal compiler error.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// Builds an early error.
    pub fn syntax(message: impl Into<String>) -> Self {
        Error::Syntax(message.into())
    }

    /// Returns the rendered value of an uncaught exception, if this is one.
    pub fn uncaught_value(&self) -> Option<&str> {
        match self {
            Error::Uncaught { value, .. } => Some(value),
            _ => None,
        }
    }
}
