//! Error types for the lead funnel.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Duplicate key: a lead with email {email} already exists")]
    Duplicate { email: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outbound email errors.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Transport {transport} failed: {reason}")]
    Transport { transport: String, reason: String },
}

/// Email rendering errors. Never surfaced past the renderer.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("No template for stage {0}")]
    TemplateMissing(String),

    #[error("Template store could not be loaded: {0}")]
    TemplateStore(String),

    #[error("Rendered email for stage {0} is empty")]
    EmptyOutput(String),
}

/// Lead capture errors. The only failures a visitor ever sees.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("{0}")]
    Validation(String),

    #[error("A lead with email {0} already exists")]
    DuplicateEmail(String),

    #[error("Failed to store lead: {0}")]
    Storage(DatabaseError),
}

impl From<DatabaseError> for CaptureError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Duplicate { email } => CaptureError::DuplicateEmail(email),
            other => CaptureError::Storage(other),
        }
    }
}
