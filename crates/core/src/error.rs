#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Malformed job parameters: {0}")]
    Serialization(#[from] serde_json::Error),
}
