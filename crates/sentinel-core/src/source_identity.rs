//! The SourceIdentity token.
//!
//! STS lets the first AssumeRole in a chain stamp a `SourceIdentity`
//! attribute that is immutable for the session lifetime and propagates
//! through role chaining into every CloudTrail event. Sentinel stamps
//! `sentinel:<user>:<marker>:<request-id>` so any downstream event can be
//! traced back to the broker decision that minted the session.
//!
//! The marker is the literal `direct` for policy-allowed issuance, or the
//! 8-hex id of the approval / break-glass record that authorized it. The
//! legacy 3-part form `sentinel:<user>:<request-id>` is accepted on parse
//! but never produced.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::identity::MAX_USER_LEN;
use crate::ids::{self, REQUEST_ID_LEN};

/// Prefix of every Sentinel SourceIdentity token.
pub const PREFIX: &str = "sentinel";

/// Marker used when issuance was allowed directly by policy.
pub const DIRECT_MARKER: &str = "direct";

/// Hard cap from STS: a SourceIdentity value is at most 64 characters.
pub const MAX_FORMATTED_LEN: usize = 64;

/// A validated SourceIdentity value. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdentity {
    user: String,
    approval_id: Option<String>,
    request_id: String,
}

impl SourceIdentity {
    /// Build a SourceIdentity from already-validated parts.
    ///
    /// `user` must be 1 to 20 ASCII alphanumerics (the canonical form from
    /// [`crate::identity::sanitize_user`]); `approval_id` is `None` for
    /// direct issuance or exactly 8 lowercase hex chars; `request_id` is 8
    /// lowercase hex chars.
    pub fn new(
        user: &str,
        approval_id: Option<&str>,
        request_id: &str,
    ) -> Result<Self, CoreError> {
        if user.is_empty()
            || user.len() > MAX_USER_LEN
            || !user.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(bad("user must be 1 to 20 ASCII alphanumerics"));
        }
        if let Some(id) = approval_id {
            if !ids::is_lower_hex(id, REQUEST_ID_LEN) {
                return Err(bad("approval marker must be 8 lowercase hex chars"));
            }
        }
        if !ids::is_lower_hex(request_id, REQUEST_ID_LEN) {
            return Err(bad("request id must be 8 lowercase hex chars"));
        }

        Ok(Self {
            user: user.to_string(),
            approval_id: approval_id.map(str::to_string),
            request_id: request_id.to_string(),
        })
    }

    /// Build a SourceIdentity with a freshly generated request id.
    pub fn generate(user: &str, approval_id: Option<&str>) -> Result<Self, CoreError> {
        Self::new(user, approval_id, &ids::new_request_id())
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// The approval / break-glass record id, or `None` for direct issuance.
    pub fn approval_id(&self) -> Option<&str> {
        self.approval_id.as_deref()
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = self.approval_id.as_deref().unwrap_or(DIRECT_MARKER);
        write!(f, "{PREFIX}:{}:{marker}:{}", self.user, self.request_id)
    }
}

impl FromStr for SourceIdentity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > MAX_FORMATTED_LEN {
            return Err(bad("longer than 64 characters"));
        }

        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            // Legacy form, pre-approval-marker. Accepted, never produced.
            [PREFIX, user, request_id] => Self::new(user, None, request_id),
            [PREFIX, user, marker, request_id] => {
                let approval_id = if *marker == DIRECT_MARKER {
                    None
                } else {
                    Some(*marker)
                };
                Self::new(user, approval_id, request_id)
            }
            _ => Err(bad("expected sentinel:<user>[:<marker>]:<request-id>")),
        }
    }
}

fn bad(why: &str) -> CoreError {
    CoreError::InvalidSourceIdentity(why.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_form_matches_contract() {
        let si = SourceIdentity::new("alice", None, "a1b2c3d4").unwrap();
        let formatted = si.to_string();
        assert_eq!(formatted, "sentinel:alice:direct:a1b2c3d4");
        assert_eq!(formatted.len(), 29);
    }

    #[test]
    fn formatted_length_never_exceeds_64() {
        // Worst case: 20-char user, 8-char marker, 8-char request id.
        let si = SourceIdentity::new(
            &"a".repeat(20),
            Some("deadbeef"),
            "a1b2c3d4",
        )
        .unwrap();
        assert!(si.to_string().len() <= MAX_FORMATTED_LEN);
    }

    #[test]
    fn parse_format_round_trip() {
        let cases = [
            SourceIdentity::new("alice", None, "a1b2c3d4").unwrap(),
            SourceIdentity::new("bob7", Some("abcd1234"), "00ff00ff").unwrap(),
        ];
        for si in cases {
            let parsed: SourceIdentity = si.to_string().parse().unwrap();
            assert_eq!(parsed, si);
        }
    }

    #[test]
    fn legacy_three_part_form_accepted() {
        let si: SourceIdentity = "sentinel:alice:a1b2c3d4".parse().unwrap();
        assert_eq!(si.user(), "alice");
        assert_eq!(si.approval_id(), None);
        assert_eq!(si.request_id(), "a1b2c3d4");
        // Re-formatting upgrades to the four-part form.
        assert_eq!(si.to_string(), "sentinel:alice:direct:a1b2c3d4");
    }

    #[test]
    fn rejects_foreign_prefix_and_bad_parts() {
        assert!("guard:alice:direct:a1b2c3d4".parse::<SourceIdentity>().is_err());
        assert!("sentinel:alice:direct".parse::<SourceIdentity>().is_err());
        assert!("sentinel:alice:DIRECT:a1b2c3d4".parse::<SourceIdentity>().is_err());
        assert!("sentinel:al ice:direct:a1b2c3d4".parse::<SourceIdentity>().is_err());
        assert!("sentinel:alice:direct:A1B2C3D4".parse::<SourceIdentity>().is_err());
        assert!("sentinel:alice:direct:a1b2c3d4:extra".parse::<SourceIdentity>().is_err());
        assert!("".parse::<SourceIdentity>().is_err());
    }

    #[test]
    fn generate_produces_valid_request_ids() {
        let si = SourceIdentity::generate("alice", None).unwrap();
        assert_eq!(si.request_id().len(), 8);
        let reparsed: SourceIdentity = si.to_string().parse().unwrap();
        assert_eq!(reparsed, si);
    }
}
