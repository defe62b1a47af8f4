use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid policy YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported policy version {got:?} (expected \"1\")")]
    UnsupportedVersion { got: String },

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("wrap-around hour range not supported: {start} to {end}")]
    WraparoundHours { start: String, end: String },

    #[error("invalid hour: {0} (expected HH:MM)")]
    InvalidHour(String),

    #[error("policy {path}: {field}: {problem}")]
    InvalidField {
        path: String,
        field: String,
        problem: String,
    },

    #[error("signature artifact missing for policy {path}")]
    SignatureMissing { path: String },

    #[error("invalid signature envelope for policy {path}: {problem}")]
    SignatureEnvelope { path: String, problem: String },

    #[error("policy hash mismatch for {path}")]
    HashMismatch { path: String },

    #[error("signature verification failed for policy {path}")]
    SignatureMismatch { path: String },

    #[error("policy parameter not found: {path}")]
    ParameterNotFound { path: String },

    #[error("parameter service error for {path}: {message}")]
    ParameterService { path: String, message: String },

    #[error("KMS error for {path}: {message}")]
    Kms { path: String, message: String },

    #[error("policy load timed out after {seconds}s: {path}")]
    LoadTimeout { path: String, seconds: u64 },
}
