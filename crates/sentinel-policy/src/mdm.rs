//! MDM posture provider interface.
//!
//! Device-posture backends (Jamf, Intune, ...) live outside the core; the
//! engine only sees this trait. A lookup distinguishes "device not found"
//! from "provider unreachable" so the engine can apply the deployment's
//! fail-open / fail-closed choice to the latter.

use std::collections::HashMap;

use async_trait::async_trait;

/// Compliance facts the engine can condition on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFacts {
    pub compliant: bool,
    pub enrolled: bool,
}

/// Outcome of a posture lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostureLookup {
    Facts(DeviceFacts),
    NotFound,
    Unavailable,
}

#[async_trait]
pub trait PostureProvider: Send + Sync {
    /// Look up posture facts for a canonical user. Implementations report
    /// transport problems as [`PostureLookup::Unavailable`], never as a
    /// fabricated compliance answer.
    async fn lookup(&self, user: &str) -> PostureLookup;
}

/// Fixed-answer provider for tests and single-tenant deployments.
#[derive(Debug, Default)]
pub struct StaticPostureProvider {
    devices: HashMap<String, DeviceFacts>,
    unavailable: bool,
}

impl StaticPostureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, user: &str, facts: DeviceFacts) -> Self {
        self.devices.insert(user.to_string(), facts);
        self
    }

    /// Make every lookup report the provider as unreachable.
    pub fn unavailable() -> Self {
        Self {
            devices: HashMap::new(),
            unavailable: true,
        }
    }
}

#[async_trait]
impl PostureProvider for StaticPostureProvider {
    async fn lookup(&self, user: &str) -> PostureLookup {
        if self.unavailable {
            return PostureLookup::Unavailable;
        }
        match self.devices.get(user) {
            Some(facts) => PostureLookup::Facts(*facts),
            None => PostureLookup::NotFound,
        }
    }
}
