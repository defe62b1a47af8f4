//! sentinel-policy
//!
//! Declarative access policy for the Sentinel broker: the typed YAML
//! models, the SSM-backed store with KMS signature verification and a
//! TTL'd single-flight cache, and the first-match evaluation engine.

pub mod cache;
pub mod engine;
pub mod error;
pub mod mdm;
pub mod model;
pub mod signature;
pub mod store;

pub use crate::engine::{evaluate, EvalEnvironment, EvalInput, MdmFailMode};
pub use crate::error::PolicyError;
pub use crate::mdm::{DeviceFacts, PostureLookup, PostureProvider, StaticPostureProvider};
pub use crate::model::{
    AccessPolicy, ApprovalPolicy, BreakGlassPolicy, Conditions, HourRange, MdmConditions,
    RateLimitPolicy, Rule, TimeWindow, Weekday,
};
pub use crate::signature::SignatureEnvelope;
pub use crate::store::{PolicyStore, SigningMode};
