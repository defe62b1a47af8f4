use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use sentinel_issuer::IssueError;
use sentinel_store::StoreError;

/// Server-side failure, mapped onto the HTTP status contract:
/// 403 authorization, 409 concurrency, 503 dependency, 400 validation,
/// 500 unexpected.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("session revoked")]
    SessionRevoked,

    #[error("session expired")]
    SessionExpired,

    #[error("access denied: {0}")]
    Denied(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("dependency unavailable: {0}")]
    Dependency(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("internal: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl ServerError {
    fn kind(&self) -> &'static str {
        match self {
            ServerError::Unauthorized
            | ServerError::SessionRevoked
            | ServerError::SessionExpired
            | ServerError::Denied(_) => "authorization",
            ServerError::Conflict(_) => "concurrency",
            ServerError::Dependency(_) => "dependency",
            ServerError::Validation(_) => "validation",
            ServerError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ServerError::Unauthorized
            | ServerError::SessionRevoked
            | ServerError::SessionExpired
            | ServerError::Denied(_) => StatusCode::FORBIDDEN,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("internal error: {self}");
        }
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            // The session id is part of the auth surface; an unknown id is
            // a refusal, not a 404.
            StoreError::NotFound { .. } => ServerError::Unauthorized,
            StoreError::ConcurrentModification { id } => {
                ServerError::Conflict(format!("concurrent modification of {id}"))
            }
            StoreError::IdCollision { id } => {
                ServerError::Conflict(format!("id collision on {id}"))
            }
            StoreError::RateLimited {
                retry_after_seconds,
            } => ServerError::Denied(format!("rate limited, retry in {retry_after_seconds}s")),
            StoreError::Dynamo(message) => ServerError::Dependency(message),
            StoreError::InvalidTransition { .. } | StoreError::Malformed { .. } => {
                ServerError::Internal(e.to_string())
            }
            StoreError::Core(core) => ServerError::Validation(core.to_string()),
        }
    }
}

impl From<IssueError> for ServerError {
    fn from(e: IssueError) -> Self {
        match e {
            IssueError::Denied { rule, reason } => {
                ServerError::Denied(format!("rule {rule:?}: {reason}"))
            }
            IssueError::ApprovalRequired { profile } => {
                ServerError::Denied(format!("profile {profile} requires approval"))
            }
            IssueError::BreakGlassUnusable { .. } | IssueError::NestedIssuance { .. } => {
                ServerError::Denied(e.to_string())
            }
            IssueError::Sts(message) => ServerError::Dependency(message),
            IssueError::Policy(policy) => match policy {
                sentinel_policy::PolicyError::ParameterService { .. }
                | sentinel_policy::PolicyError::ParameterNotFound { .. }
                | sentinel_policy::PolicyError::Kms { .. }
                | sentinel_policy::PolicyError::LoadTimeout { .. } => {
                    ServerError::Dependency(policy.to_string())
                }
                other => ServerError::Internal(other.to_string()),
            },
            IssueError::Store(store) => store.into(),
            IssueError::Core(core) => ServerError::Validation(core.to_string()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}
