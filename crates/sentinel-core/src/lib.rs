//! sentinel-core
//!
//! Pure domain types for the Sentinel credential broker: AWS principal
//! identity, the SourceIdentity token, defensive validation, and the
//! approval / break-glass / session record models.
//! No AWS SDK dependency — this is the shared vocabulary of the system.

pub mod error;
pub mod identity;
pub mod ids;
pub mod models;
pub mod source_identity;
pub mod validate;

/// Environment variable stamped on issued sessions to break nested
/// issuance loops. Holds the profile name the session was issued for.
pub const AWS_SENTINEL_ENV: &str = "AWS_SENTINEL";
