use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external tool is missing: {tool}")]
    ExternalToolMissing { tool: String },

    #[error("external tool failed: {tool} (exit code {code:?})\n{log}")]
    ExternalToolFailed {
        tool: String,
        code: Option<i32>,
        log: String,
    },

    #[error("tool install failed: {0}")]
    InstallFailed(String),

    #[error("job {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("unknown job id: {0}")]
    JobNotFound(String),
}

impl EngineError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
