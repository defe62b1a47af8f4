//! Profile configuration.
//!
//! A profile names an AWS target: the role to assume, the region, and the
//! duration bounds. Profiles live in a local JSON file
//! (`~/.config/sentinel/profiles.json` by default); the policy documents
//! decide *whether* a profile may be used, this file only says *what* it
//! points at.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use jiff::SignedDuration;
use serde::{Deserialize, Serialize};

use crate::error::IssueError;

/// Fallback session length when neither the caller nor the profile asks
/// for one.
pub const DEFAULT_DURATION: SignedDuration = SignedDuration::from_secs(3600);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileSpec {
    pub role_arn: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Upper bound for sessions on this profile, seconds. Defaults to the
    /// 8h global cap.
    #[serde(default)]
    pub max_duration_seconds: Option<i64>,
    #[serde(default)]
    pub default_duration_seconds: Option<i64>,
    /// Optional ExternalId for the AssumeRole call.
    #[serde(default)]
    pub external_id: Option<String>,
}

impl ProfileSpec {
    pub fn max_duration(&self) -> SignedDuration {
        self.max_duration_seconds
            .map(SignedDuration::from_secs)
            .unwrap_or(sentinel_core::models::request::MAX_DURATION)
    }

    pub fn default_duration(&self) -> SignedDuration {
        self.default_duration_seconds
            .map(SignedDuration::from_secs)
            .unwrap_or(DEFAULT_DURATION)
    }

    /// The duration actually requested from STS:
    /// `min(profile max, caller request or profile default)`.
    pub fn clamp_duration(&self, requested: Option<SignedDuration>) -> SignedDuration {
        let wanted = requested.unwrap_or_else(|| self.default_duration());
        wanted.min(self.max_duration())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileSpec>,
}

impl ProfileConfig {
    /// Load from the default location: `<config dir>/sentinel/profiles.json`.
    pub fn load_default() -> Result<Self, IssueError> {
        let base = dirs::config_dir()
            .ok_or_else(|| IssueError::ProfileConfig("no OS config directory found".into()))?;
        Self::load(&base.join("sentinel").join("profiles.json"))
    }

    pub fn load(path: &Path) -> Result<Self, IssueError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            IssueError::ProfileConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            IssueError::ProfileConfig(format!("invalid {}: {e}", path.display()))
        })
    }

    pub fn get(&self, name: &str) -> Result<&ProfileSpec, IssueError> {
        self.profiles.get(name).ok_or_else(|| IssueError::UnknownProfile {
            profile: name.to_string(),
        })
    }
}

/// Default location of the profile file, for error messages and docs.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sentinel").join("profiles.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(max: Option<i64>, default: Option<i64>) -> ProfileSpec {
        ProfileSpec {
            role_arn: "arn:aws:iam::123456789012:role/dev".to_string(),
            region: None,
            max_duration_seconds: max,
            default_duration_seconds: default,
            external_id: None,
        }
    }

    #[test]
    fn clamp_is_min_of_request_and_profile_max() {
        let p = spec(Some(7200), None);
        assert_eq!(
            p.clamp_duration(Some(SignedDuration::from_secs(3600))),
            SignedDuration::from_secs(3600)
        );
        assert_eq!(
            p.clamp_duration(Some(SignedDuration::from_secs(86_400))),
            SignedDuration::from_secs(7200)
        );
        assert_eq!(p.clamp_duration(None), SignedDuration::from_secs(3600));
    }

    #[test]
    fn profile_file_parses() {
        let config: ProfileConfig = serde_json::from_str(
            r#"{
              "profiles": {
                "prod": {
                  "role_arn": "arn:aws:iam::123456789012:role/prod-operator",
                  "region": "us-east-1",
                  "max_duration_seconds": 3600
                }
              }
            }"#,
        )
        .unwrap();
        let prod = config.get("prod").unwrap();
        assert_eq!(prod.region.as_deref(), Some("us-east-1"));
        assert!(config.get("dev").is_err());
    }
}
