use thiserror::Error;

#[derive(Debug, Error)]
pub enum RescueError {
    #[error("Invalid {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Template error: {0}")]
    Template(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generation cancelled by user")]
    Cancelled,

    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RescueError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        RescueError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
