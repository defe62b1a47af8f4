//! STS calls: caller self-lookup and the stamped AssumeRole.

use aws_sdk_sts::Client;
use jiff::Timestamp;

use sentinel_core::identity::{parse_arn, ArnIdentity};
use sentinel_core::models::Credentials;
use sentinel_core::source_identity::SourceIdentity;

use crate::error::IssueError;

/// Resolve the caller through `GetCallerIdentity` and parse the ARN.
pub async fn caller_identity(client: &Client) -> Result<ArnIdentity, IssueError> {
    let resp = client
        .get_caller_identity()
        .send()
        .await
        .map_err(|e| IssueError::Sts(e.into_service_error().to_string()))?;

    let arn = resp
        .arn()
        .ok_or_else(|| IssueError::Sts("GetCallerIdentity returned no ARN".to_string()))?;

    Ok(parse_arn(arn)?)
}

/// AssumeRole with the SourceIdentity stamp.
///
/// The session name is the canonical user; the SourceIdentity is the
/// traceability token AWS propagates through role chaining.
pub async fn assume_role(
    client: &Client,
    role_arn: &str,
    source_identity: &SourceIdentity,
    duration_seconds: i64,
    external_id: Option<&str>,
) -> Result<Credentials, IssueError> {
    let mut req = client
        .assume_role()
        .role_arn(role_arn)
        .role_session_name(source_identity.user())
        .source_identity(source_identity.to_string())
        .duration_seconds(duration_seconds as i32);

    if let Some(external_id) = external_id {
        req = req.external_id(external_id);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| IssueError::Sts(e.into_service_error().to_string()))?;

    let creds = resp
        .credentials()
        .ok_or_else(|| IssueError::Sts("AssumeRole returned no credentials".to_string()))?;

    let expiration = Timestamp::from_second(creds.expiration().secs())
        .map_err(|_| IssueError::Sts("AssumeRole expiration out of range".to_string()))?;

    tracing::info!(
        role_arn = role_arn,
        source_identity = %source_identity,
        duration_seconds = duration_seconds,
        "assumed role"
    );

    Ok(Credentials {
        access_key_id: creds.access_key_id().to_string(),
        secret_access_key: creds.secret_access_key().to_string(),
        session_token: creds.session_token().to_string(),
        expiration,
    })
}
