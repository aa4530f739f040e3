//! Engine error taxonomy
//! Validation errors are raised synchronously and never leave partial state;
//! dependency and conflict errors are raised at start time.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DomainError>;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid process name: {0}")]
    InvalidName(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("process '{0}' already exists")]
    DuplicateProcess(String),

    #[error("config error in {file}:{line}: {message}")]
    ConfigError {
        file: String,
        line: usize,
        message: String,
    },

    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    #[error("cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("conflicting process '{0}' is active")]
    ConflictError(String),

    #[error("invalid health check: {0}")]
    HealthCheckError(String),

    #[error("invalid capability: {0}")]
    CapabilityError(String),

    #[error("invalid resource limit: {0}")]
    ResourceLimitError(String),

    #[error("runtime directory error: {0}")]
    RuntimeDirectoryError(String),

    #[error("process '{0}' not found")]
    ProcessNotFound(String),

    #[error("required dependency '{0}' not found")]
    DependencyNotFound(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

impl DomainError {
    /// Build a ConfigError from a serde_yaml failure, attaching file context.
    pub fn config(file: &str, err: &serde_yaml::Error) -> Self {
        let line = err.location().map(|l| l.line()).unwrap_or(0);
        DomainError::ConfigError {
            file: file.to_string(),
            line,
            message: err.to_string(),
        }
    }
}
