use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {id}")]
    NotFound { id: String },

    #[error("id collision on create: {id}")]
    IdCollision { id: String },

    #[error("concurrent modification of {id}; re-read and retry")]
    ConcurrentModification { id: String },

    #[error("invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: i64 },

    #[error("malformed item {id}: field {field}")]
    Malformed { id: String, field: String },

    #[error(transparent)]
    Core(#[from] sentinel_core::error::CoreError),

    #[error("DynamoDB error: {0}")]
    Dynamo(String),
}
