//! Error types for frametrack
//!
//! Configuration mistakes (tracking a method a target does not publish,
//! invalid budgets) fail fast at registration or load time. Usage mistakes
//! made while profiling are never surfaced here: the engine logs them and
//! keeps going so the host application is not disturbed.

use thiserror::Error;

/// Errors that can occur while configuring or querying a profiler
#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("method #{method} not found on {class}")]
    TargetNotFound { class: String, method: String },

    #[error("class {0} is not tracked")]
    UnknownClass(String),

    #[error("{class} instance belongs to another profiler")]
    ForeignTarget { class: String },

    #[error("profiler has been disposed")]
    Disposed,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for profiler operations
pub type Result<T> = std::result::Result<T, ProfilerError>;
