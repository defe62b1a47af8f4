use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid ARN: {0}")]
    InvalidArn(String),

    #[error("username empty after sanitization")]
    EmptyUser,

    #[error("invalid source identity: {0}")]
    InvalidSourceIdentity(String),

    #[error("invalid profile name: {0}")]
    InvalidProfile(String),

    #[error("unknown reason code: {0} (expected incident, maintenance, security, recovery, or other)")]
    InvalidReasonCode(String),

    #[error("justification must be {min} to {max} characters, got {got}")]
    JustificationLength { min: usize, max: usize, got: usize },

    #[error("duration {got}s exceeds maximum {max}s")]
    DurationTooLong { max: i64, got: i64 },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
