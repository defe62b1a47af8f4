//! AWS principal identity parsing and canonicalization.
//!
//! Sentinel never trusts the OS username. The caller's identity comes from
//! STS `GetCallerIdentity`, whose ARN is parsed here and projected down to a
//! *canonical user*: the alphanumeric-only form that policy rules match
//! against and that gets stamped into the SourceIdentity token.
//!
//! | ARN resource | Raw user |
//! |--------------|----------|
//! | `user/<path>/<name>` | trailing path segment |
//! | `assumed-role/<role>/<session>` | session name |
//! | `federated-user/<name>` | name |
//! | `root` | `root` |
//!
//! Sanitization is destructive on purpose: homoglyphs, control bytes, and
//! punctuation are stripped rather than escaped, so two principals that
//! differ only in non-alphanumeric bytes collapse to the same canonical
//! user and cannot spoof distinct policy matches.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum length of a canonical username.
pub const MAX_USER_LEN: usize = 20;

const ALLOWED_PARTITIONS: &[&str] = &["aws", "aws-cn", "aws-us-gov", "aws-iso", "aws-iso-b"];
const ALLOWED_SERVICES: &[&str] = &["iam", "sts"];

/// The kind of principal an ARN names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    AssumedRole,
    FederatedUser,
    Root,
}

/// A parsed IAM/STS principal ARN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArnIdentity {
    pub partition: String,
    pub service: String,
    pub account_id: String,
    pub kind: PrincipalKind,
    /// The raw user component extracted from the resource tail. Preserved
    /// for display only; matching always goes through [`canonical_user`].
    ///
    /// [`canonical_user`]: ArnIdentity::canonical_user
    pub raw_user: String,
}

impl ArnIdentity {
    /// The alphanumeric-only projection of the raw user, truncated to 20
    /// characters. For email-shaped users the local part (before `@`) is
    /// taken first.
    pub fn canonical_user(&self) -> Result<String, CoreError> {
        let local = self
            .raw_user
            .split('@')
            .next()
            .unwrap_or(&self.raw_user);
        sanitize_user(local)
    }
}

/// Parse an IAM or STS principal ARN.
///
/// Validates partition, service, and the 12-digit account id, then extracts
/// the user component from the resource tail. Anything malformed is
/// [`CoreError::InvalidArn`]; no partial results.
pub fn parse_arn(arn: &str) -> Result<ArnIdentity, CoreError> {
    let mut parts = arn.splitn(6, ':');
    let (prefix, partition, service, _region, account, resource) = (
        parts.next().unwrap_or(""),
        parts.next().unwrap_or(""),
        parts.next().unwrap_or(""),
        parts.next().unwrap_or(""),
        parts.next().unwrap_or(""),
        parts.next().unwrap_or(""),
    );

    // A control byte inside an ARN is always hostile. Rejecting the whole
    // ARN here keeps `user/alice\x00admin` from ever collapsing into the
    // distinct principal `aliceadmin` downstream.
    if arn.chars().any(|c| c.is_control()) {
        return Err(invalid(arn, "control character in ARN"));
    }

    if prefix != "arn" {
        return Err(invalid(arn, "missing arn: prefix"));
    }
    if !ALLOWED_PARTITIONS.contains(&partition) {
        return Err(invalid(arn, "unknown partition"));
    }
    if !ALLOWED_SERVICES.contains(&service) {
        return Err(invalid(arn, "service must be iam or sts"));
    }
    if account.len() != 12 || !account.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(arn, "account id must be 12 digits"));
    }
    if resource.is_empty() {
        return Err(invalid(arn, "empty resource"));
    }

    let (kind, raw_user) = parse_resource(resource).ok_or_else(|| invalid(arn, "unrecognized resource"))?;

    Ok(ArnIdentity {
        partition: partition.to_string(),
        service: service.to_string(),
        account_id: account.to_string(),
        kind,
        raw_user,
    })
}

fn parse_resource(resource: &str) -> Option<(PrincipalKind, String)> {
    if resource == "root" {
        return Some((PrincipalKind::Root, "root".to_string()));
    }

    let (res_type, tail) = resource.split_once('/')?;
    if tail.is_empty() {
        return None;
    }

    match res_type {
        // user/<path...>/<name>: the name is the trailing segment
        "user" => {
            let name = tail.rsplit('/').next()?;
            if name.is_empty() {
                return None;
            }
            Some((PrincipalKind::User, name.to_string()))
        }
        // assumed-role/<role>/<session>: the session name is the user
        "assumed-role" => {
            let (role, session) = tail.split_once('/')?;
            if role.is_empty() || session.is_empty() || session.contains('/') {
                return None;
            }
            Some((PrincipalKind::AssumedRole, session.to_string()))
        }
        "federated-user" => {
            if tail.contains('/') {
                return None;
            }
            Some((PrincipalKind::FederatedUser, tail.to_string()))
        }
        _ => None,
    }
}

fn invalid(arn: &str, why: &str) -> CoreError {
    CoreError::InvalidArn(format!("{why}: {}", crate::validate::sanitize_log_field(arn)))
}

/// Strip every code point outside `[A-Za-z0-9]` and truncate to 20 chars.
///
/// An empty result is [`CoreError::EmptyUser`] — a principal whose name is
/// entirely non-alphanumeric cannot be matched or stamped.
pub fn sanitize_user(raw: &str) -> Result<String, CoreError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_USER_LEN)
        .collect();

    if cleaned.is_empty() {
        return Err(CoreError::EmptyUser);
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_control_bytes() {
        assert_eq!(sanitize_user("alice\x00admin").unwrap(), "aliceadmin");
        assert_eq!(sanitize_user("alice.admin").unwrap(), "aliceadmin");
    }

    #[test]
    fn sanitize_truncates_to_twenty() {
        let long = "a".repeat(50);
        assert_eq!(sanitize_user(&long).unwrap().len(), MAX_USER_LEN);
    }

    #[test]
    fn sanitize_rejects_empty_projection() {
        assert!(matches!(sanitize_user("@@--.."), Err(CoreError::EmptyUser)));
        assert!(matches!(sanitize_user(""), Err(CoreError::EmptyUser)));
    }
}
