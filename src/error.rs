use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl SyncError {
    pub(crate) fn decode(message: impl Into<String>) -> Self {
        SyncError::Decode(message.into())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
