//! Typed models for the four Sentinel policy documents.
//!
//! Every document deserializes with `deny_unknown_fields` and is validated
//! before it can enter the cache, so a policy that parsed is a policy the
//! engine can evaluate without further surprises.

pub mod access;
pub mod approval;
pub mod breakglass;
pub mod ratelimit;
pub mod time;

pub use access::{AccessPolicy, Conditions, MdmConditions, Rule};
pub use approval::ApprovalPolicy;
pub use breakglass::BreakGlassPolicy;
pub use ratelimit::RateLimitPolicy;
pub use time::{HourRange, TimeWindow, Weekday};

/// The only schema version any document type currently supports.
pub const POLICY_VERSION: &str = "1";
