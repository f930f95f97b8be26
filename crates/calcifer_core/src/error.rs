//! Error types for the core module.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Evaluation faults raised while a policy runs.
///
/// These signal a defect in how a policy was put together rather than a
/// violation found in the data. They abort a run unless the offending
/// operator is wrapped in `attempt`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Node at {path} is a {kind}, not a collection")]
    NotACollection { path: String, kind: &'static str },

    #[error("Annotation stack underflow at {path}")]
    AnnotationUnderflow { path: String },

    #[error("`{operator}` requires a preceding check")]
    MissingCheck { operator: String },

    #[error("Unbound name: {0}")]
    UnboundName(String),

    #[error("Callback `{name}` failed: {message}")]
    Callback { name: String, message: String },
}

/// A failure reported by a user-supplied callback.
///
/// Callbacks passed to `apply`, `check` or `with_value` return
/// `Result<_, Fault>`; the engine turns a `Fault` into
/// [`CoreError::Callback`] tagged with the callback's name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Fault {
    message: String,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Attach the callback name, producing an evaluation fault.
    pub fn into_core(self, name: impl Into<String>) -> CoreError {
        CoreError::Callback {
            name: name.into(),
            message: self.message,
        }
    }
}

impl From<&str> for Fault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for Fault {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}
