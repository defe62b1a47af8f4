//! Policy retrieval: SSM Parameter Store + KMS verification + cache.
//!
//! A policy document lives at a parameter path; its signature envelope
//! lives at `<path>.sig`. Loading fetches both, verifies (fail-closed when
//! signing is required), parses, validates, and publishes into the
//! process cache. Concurrent loaders of one path collapse onto a single
//! SSM round-trip via the cache slot's mutex.

use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;

use crate::cache::{CacheEntry, CachedPolicy, PolicyCache};
use crate::error::PolicyError;
use crate::model::{AccessPolicy, ApprovalPolicy, BreakGlassPolicy, RateLimitPolicy};
use crate::signature::{self, SignatureEnvelope};

/// Default deployment timeout for a single policy load.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Whether this deployment requires signed policies.
///
/// With `Required`, a missing or invalid signature artifact is fatal; the
/// document never reaches the parser, let alone the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningMode {
    Required,
    Disabled,
}

pub struct PolicyStore {
    ssm: aws_sdk_ssm::Client,
    kms: aws_sdk_kms::Client,
    signing: SigningMode,
    load_timeout: Duration,
}

impl PolicyStore {
    pub fn new(config: &aws_config::SdkConfig, signing: SigningMode) -> Self {
        Self {
            ssm: aws_sdk_ssm::Client::new(config),
            kms: aws_sdk_kms::Client::new(config),
            signing,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
        }
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub async fn load_access_policy(&self, path: &str) -> Result<Arc<AccessPolicy>, PolicyError> {
        self.load::<AccessPolicy>(path).await
    }

    pub async fn load_approval_policy(
        &self,
        path: &str,
    ) -> Result<Arc<ApprovalPolicy>, PolicyError> {
        self.load::<ApprovalPolicy>(path).await
    }

    pub async fn load_breakglass_policy(
        &self,
        path: &str,
    ) -> Result<Arc<BreakGlassPolicy>, PolicyError> {
        self.load::<BreakGlassPolicy>(path).await
    }

    pub async fn load_ratelimit_policy(
        &self,
        path: &str,
    ) -> Result<Arc<RateLimitPolicy>, PolicyError> {
        self.load::<RateLimitPolicy>(path).await
    }

    async fn load<T: PolicyDoc>(&self, path: &str) -> Result<Arc<T>, PolicyError> {
        let slot = PolicyCache::global().slot(path);
        let mut guard = slot.lock().await;

        let now = Timestamp::now();
        if let Some(entry) = guard.as_ref() {
            if entry.is_fresh(now) {
                if let Some(doc) = T::unwrap(&entry.doc) {
                    return Ok(doc);
                }
            }
        }

        // Miss or expired. We hold the slot for the duration of the fetch
        // so concurrent misses on this path wait here instead of racing to
        // SSM. Stale-on-failure is not permitted: an error propagates and
        // the expired entry is discarded.
        let (yaml, version) = self.fetch_verified(path).await?;
        let doc = Arc::new(T::parse(&yaml)?);
        *guard = Some(CacheEntry {
            version,
            fetched_at: now,
            doc: T::wrap(doc.clone()),
        });

        tracing::debug!(path = path, version = version, "policy loaded");
        Ok(doc)
    }

    /// Fetch the document, enforce the signing mode, and return the raw
    /// YAML plus the parameter version token.
    async fn fetch_verified(&self, path: &str) -> Result<(String, i64), PolicyError> {
        let seconds = self.load_timeout.as_secs();
        tokio::time::timeout(self.load_timeout, self.fetch_inner(path))
            .await
            .map_err(|_| PolicyError::LoadTimeout {
                path: path.to_string(),
                seconds,
            })?
    }

    async fn fetch_inner(&self, path: &str) -> Result<(String, i64), PolicyError> {
        let (yaml, version) = self.get_parameter(path).await?;

        match self.signing {
            SigningMode::Disabled => {}
            SigningMode::Required => {
                let sig_raw = match self.get_parameter(&format!("{path}.sig")).await {
                    Ok((value, _)) => value,
                    Err(PolicyError::ParameterNotFound { .. }) => {
                        return Err(PolicyError::SignatureMissing {
                            path: path.to_string(),
                        });
                    }
                    Err(e) => return Err(e),
                };
                let envelope = SignatureEnvelope::from_json(&sig_raw, path)?;
                signature::verify(&self.kms, yaml.as_bytes(), &envelope, path).await?;
            }
        }

        Ok((yaml, version))
    }

    async fn get_parameter(&self, path: &str) -> Result<(String, i64), PolicyError> {
        let resp = self
            .ssm
            .get_parameter()
            .name(path)
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_parameter_not_found() {
                    PolicyError::ParameterNotFound {
                        path: path.to_string(),
                    }
                } else {
                    PolicyError::ParameterService {
                        path: path.to_string(),
                        message: err.to_string(),
                    }
                }
            })?;

        let param = resp.parameter().ok_or_else(|| PolicyError::ParameterService {
            path: path.to_string(),
            message: "response carried no parameter".to_string(),
        })?;
        let value = param
            .value()
            .ok_or_else(|| PolicyError::ParameterService {
                path: path.to_string(),
                message: "parameter has no value".to_string(),
            })?
            .to_string();

        Ok((value, param.version()))
    }
}

/// Glue between a concrete policy type and the type-erased cache entry.
trait PolicyDoc: Sized + Send + Sync {
    fn parse(yaml: &str) -> Result<Self, PolicyError>;
    fn wrap(doc: Arc<Self>) -> CachedPolicy;
    fn unwrap(cached: &CachedPolicy) -> Option<Arc<Self>>;
}

impl PolicyDoc for AccessPolicy {
    fn parse(yaml: &str) -> Result<Self, PolicyError> {
        AccessPolicy::from_yaml(yaml)
    }
    fn wrap(doc: Arc<Self>) -> CachedPolicy {
        CachedPolicy::Access(doc)
    }
    fn unwrap(cached: &CachedPolicy) -> Option<Arc<Self>> {
        match cached {
            CachedPolicy::Access(doc) => Some(doc.clone()),
            _ => None,
        }
    }
}

impl PolicyDoc for ApprovalPolicy {
    fn parse(yaml: &str) -> Result<Self, PolicyError> {
        ApprovalPolicy::from_yaml(yaml)
    }
    fn wrap(doc: Arc<Self>) -> CachedPolicy {
        CachedPolicy::Approval(doc)
    }
    fn unwrap(cached: &CachedPolicy) -> Option<Arc<Self>> {
        match cached {
            CachedPolicy::Approval(doc) => Some(doc.clone()),
            _ => None,
        }
    }
}

impl PolicyDoc for BreakGlassPolicy {
    fn parse(yaml: &str) -> Result<Self, PolicyError> {
        BreakGlassPolicy::from_yaml(yaml)
    }
    fn wrap(doc: Arc<Self>) -> CachedPolicy {
        CachedPolicy::BreakGlass(doc)
    }
    fn unwrap(cached: &CachedPolicy) -> Option<Arc<Self>> {
        match cached {
            CachedPolicy::BreakGlass(doc) => Some(doc.clone()),
            _ => None,
        }
    }
}

impl PolicyDoc for RateLimitPolicy {
    fn parse(yaml: &str) -> Result<Self, PolicyError> {
        RateLimitPolicy::from_yaml(yaml)
    }
    fn wrap(doc: Arc<Self>) -> CachedPolicy {
        CachedPolicy::RateLimit(doc)
    }
    fn unwrap(cached: &CachedPolicy) -> Option<Arc<Self>> {
        match cached {
            CachedPolicy::RateLimit(doc) => Some(doc.clone()),
            _ => None,
        }
    }
}
