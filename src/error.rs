use crate::classify::ErrorCategory;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PkgmuxError {
    /// Sentinel: the backend does not implement this contract operation.
    #[error("operation '{operation}' is not supported by package manager '{backend}'")]
    Unsupported {
        backend: String,
        operation: &'static str,
    },

    /// Sentinel: a package name failed the sanitization boundary.
    #[error("invalid package name '{name}': {reason}")]
    InvalidPackageName { name: String, reason: String },

    #[error("no package manager registered under name '{name}'")]
    BackendNotFound { name: String },

    #[error("backend name '{name}' is already registered")]
    DuplicateBackend { name: String },

    #[error("no available package manager for category '{category}'")]
    NoBackendForCategory { category: String },

    /// A subprocess ran to completion with a non-zero exit status.
    /// Carries everything an adapter interpreter needs to classify it.
    #[error("command '{command}' failed{}: {stderr}", code.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("system command failed: {command}\nReason: {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("command '{command}' timed out after {seconds} seconds")]
    Timeout { command: String, seconds: u64 },

    /// Sentinel: the shared execution context was cancelled.
    #[error("operation interrupted")]
    Interrupted,

    /// Typed taxonomy error produced by an adapter's exit-code interpreter.
    /// The process boundary maps this straight to an exit code without
    /// re-parsing any text.
    #[error("{message}")]
    Classified {
        category: ErrorCategory,
        message: String,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yml::Error),

    #[error("{0}")]
    Other(String),
}

impl PkgmuxError {
    /// Shortcut for building the typed taxonomy error.
    pub fn classified(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self::Classified {
            category,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PkgmuxError>;
