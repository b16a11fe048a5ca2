//! Error types for the platform boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("background workers are not supported by this platform")]
    Unsupported,

    #[error("worker registration rejected: {0}")]
    RegistrationRejected(String),

    #[error("scope {scope} is outside the maximum scope {max_scope} of {script_url}")]
    ScopeNotAllowed {
        script_url: String,
        scope: String,
        max_scope: String,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("no active worker controls this scope")]
    NoActiveWorker,

    #[error("install prompt unavailable: {0}")]
    PromptUnavailable(String),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage format error: {0}")]
    Format(#[from] serde_json::Error),
}
