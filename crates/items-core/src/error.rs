use thiserror::Error;

/// Core errors for item storage and access.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("DynamoDB SDK error: {0}")]
    DynamoSdk(Box<dyn std::error::Error + Send + Sync>),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_dynamo::Error),

    #[error("Item validation error: {0}")]
    Item(#[from] crate::model::ItemError),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller holds no grant for the attempted operation.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Transient backend failure; the caller may retry with backoff.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The configured table does not exist (misconfigured `TABLE_NAME`).
    #[error("Table missing: {0}")]
    TableMissing(String),
}

impl CoreError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::StorageUnavailable(_))
    }
}
