use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionerError {
    #[error("invalid table definition: {0}")]
    Build(String),

    #[error("DynamoDB error: {0}")]
    Dynamo(String),

    #[error("table {table} did not become active within {seconds}s")]
    WaitTimeout { table: String, seconds: u64 },
}
