//! Exit-code and stderr contract.
//!
//! Success is exit 0 with any payload on stdout; every failure is exit 1
//! with a single JSON object on stderr: `{error, kind, details?}` where
//! `kind` is the error-taxonomy tag.

use sentinel_issuer::IssueError;
use sentinel_policy::PolicyError;
use sentinel_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Issue(#[from] IssueError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] sentinel_core::error::CoreError),

    #[error(transparent)]
    Provisioner(#[from] sentinel_provisioner::ProvisionerError),

    #[error(transparent)]
    Server(#[from] sentinel_server::ServerError),

    #[error("{0}")]
    Config(String),
}

impl CliError {
    /// The taxonomy tag for the stderr JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            CliError::Issue(e) => issue_kind(e),
            CliError::Policy(e) => policy_kind(e),
            CliError::Store(e) => store_kind(e),
            CliError::Core(_) => "validation",
            CliError::Provisioner(_) => "dependency",
            CliError::Server(_) => "dependency",
            CliError::Config(_) => "config",
        }
    }

    /// Extra machine-readable context, when the variant carries one.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            CliError::Issue(IssueError::Denied { rule, reason }) => Some(serde_json::json!({
                "rule": rule,
                "reason": reason,
            })),
            CliError::Store(StoreError::RateLimited {
                retry_after_seconds,
            }) => Some(serde_json::json!({ "retry_after_seconds": retry_after_seconds })),
            _ => None,
        }
    }
}

fn issue_kind(e: &IssueError) -> &'static str {
    match e {
        IssueError::Denied { .. }
        | IssueError::ApprovalRequired { .. }
        | IssueError::BreakGlassUnusable { .. }
        | IssueError::NestedIssuance { .. } => "authorization",
        IssueError::DecisionLogTampered { .. } => "integrity",
        IssueError::Sts(_) | IssueError::DecisionLog(_) => "dependency",
        IssueError::UnknownProfile { .. }
        | IssueError::ProfileConfig(_)
        | IssueError::SessionStoreRequired { .. } => "config",
        IssueError::SessionRecord(_) => "dependency",
        IssueError::Policy(p) => policy_kind(p),
        IssueError::Store(s) => store_kind(s),
        IssueError::Core(_) => "validation",
    }
}

fn policy_kind(e: &PolicyError) -> &'static str {
    match e {
        PolicyError::Yaml(_)
        | PolicyError::UnsupportedVersion { .. }
        | PolicyError::UnknownTimezone(_)
        | PolicyError::WraparoundHours { .. }
        | PolicyError::InvalidHour(_)
        | PolicyError::InvalidField { .. } => "config",
        PolicyError::SignatureMissing { .. }
        | PolicyError::SignatureEnvelope { .. }
        | PolicyError::HashMismatch { .. }
        | PolicyError::SignatureMismatch { .. } => "integrity",
        PolicyError::ParameterNotFound { .. }
        | PolicyError::ParameterService { .. }
        | PolicyError::Kms { .. }
        | PolicyError::LoadTimeout { .. } => "dependency",
    }
}

fn store_kind(e: &StoreError) -> &'static str {
    match e {
        StoreError::RateLimited { .. } => "authorization",
        StoreError::ConcurrentModification { .. } | StoreError::IdCollision { .. } => {
            "concurrency"
        }
        StoreError::Dynamo(_) => "dependency",
        StoreError::NotFound { .. }
        | StoreError::InvalidTransition { .. }
        | StoreError::Malformed { .. }
        | StoreError::Core(_) => "validation",
    }
}

/// Print the stderr contract object.
pub fn print_error(e: &CliError) {
    let mut body = serde_json::json!({
        "error": e.to_string(),
        "kind": e.kind(),
    });
    if let Some(details) = e.details() {
        body["details"] = details;
    }
    eprintln!("{body}");
}
