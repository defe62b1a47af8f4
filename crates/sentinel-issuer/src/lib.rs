//! sentinel-issuer
//!
//! The issuance state machine: resolve the caller, load and evaluate the
//! access policy, consult the approval or break-glass stores when the
//! decision demands it, assume the profile's role with a stamped
//! SourceIdentity, and record the session. Every outcome, allowed or not,
//! lands in the signed decision log.

use jiff::{SignedDuration, Timestamp};

use sentinel_core::identity::ArnIdentity;
use sentinel_core::ids;
use sentinel_core::models::{
    BreakGlassEvent, BreakGlassStatus, Credentials, Decision, Effect, EvalMode, ReasonCode,
    ServerSession,
};
use sentinel_core::source_identity::SourceIdentity;
use sentinel_core::validate;
use sentinel_core::AWS_SENTINEL_ENV;
use sentinel_policy::{evaluate, EvalEnvironment, EvalInput, MdmFailMode, PolicyStore, PostureProvider};
use sentinel_store::{ApprovalStore, BreakGlassStore, SessionStore};

pub mod decision_log;
pub mod error;
pub mod profile;
pub mod sts;

pub use crate::decision_log::{verify_file, DecisionLog, DecisionRecord};
pub use crate::error::IssueError;
pub use crate::profile::{ProfileConfig, ProfileSpec};

/// STS refuses sessions shorter than 15 minutes.
const STS_MIN_DURATION: SignedDuration = SignedDuration::from_secs(900);

/// One issuance request.
pub struct IssueRequest<'a> {
    pub profile: &'a str,
    pub requested_duration: Option<SignedDuration>,
    pub mode: EvalMode,
    /// Pre-resolved caller; `None` triggers an STS self-lookup.
    pub caller: Option<ArnIdentity>,
    /// Break-glass entry point: the id of an already-created active event.
    pub breakglass_id: Option<&'a str>,
}

/// A request to open the emergency access path.
pub struct BreakGlassRequest<'a> {
    pub profile: &'a str,
    pub reason_code: ReasonCode,
    pub justification: &'a str,
    pub duration: Option<SignedDuration>,
    /// Pre-resolved caller; `None` triggers an STS self-lookup.
    pub caller: Option<ArnIdentity>,
}

/// A successful issuance.
pub struct Issued {
    pub credentials: Credentials,
    pub source_identity: SourceIdentity,
    /// Present when the session store recorded a row.
    pub session_id: Option<String>,
    pub decision: Decision,
    pub role_arn: String,
    pub duration: SignedDuration,
}

/// What an evaluation (or break-glass validation) granted: the decision,
/// the SourceIdentity ingredients, and whether the matched rule insists
/// on a tracked server session.
struct Grant {
    decision: Decision,
    marker: Option<String>,
    request_id: String,
    needs_server_session: bool,
}

/// The break-glass wiring: the event store plus the paths of the two
/// documents that govern it.
pub struct BreakGlassConfig {
    pub store: BreakGlassStore,
    pub policy_path: String,
    pub ratelimit_path: String,
}

pub struct Issuer {
    sts: aws_sdk_sts::Client,
    policy_store: PolicyStore,
    profiles: ProfileConfig,
    approvals: ApprovalStore,
    breakglass: Option<BreakGlassConfig>,
    sessions: Option<SessionStore>,
    log: Option<DecisionLog>,
    mdm: Option<Box<dyn PostureProvider>>,
    mdm_fail_mode: MdmFailMode,
    access_policy_path: String,
    server_instance_id: String,
}

impl Issuer {
    pub fn new(
        aws: &aws_config::SdkConfig,
        policy_store: PolicyStore,
        profiles: ProfileConfig,
        approvals: ApprovalStore,
        access_policy_path: impl Into<String>,
    ) -> Self {
        Self {
            sts: aws_sdk_sts::Client::new(aws),
            policy_store,
            profiles,
            approvals,
            breakglass: None,
            sessions: None,
            log: None,
            mdm: None,
            mdm_fail_mode: MdmFailMode::default(),
            access_policy_path: access_policy_path.into(),
            server_instance_id: format!("srv-{}", ids::random_hex(4)),
        }
    }

    pub fn with_breakglass(mut self, config: BreakGlassConfig) -> Self {
        self.breakglass = Some(config);
        self
    }

    pub fn with_sessions(mut self, store: SessionStore) -> Self {
        self.sessions = Some(store);
        self
    }

    pub fn with_decision_log(mut self, log: DecisionLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_mdm(mut self, provider: Box<dyn PostureProvider>, fail_mode: MdmFailMode) -> Self {
        self.mdm = Some(provider);
        self.mdm_fail_mode = fail_mode;
        self
    }

    pub fn server_instance_id(&self) -> &str {
        &self.server_instance_id
    }

    pub fn sessions(&self) -> Option<&SessionStore> {
        self.sessions.as_ref()
    }

    /// Run the full issuance state machine.
    pub async fn issue(&self, req: IssueRequest<'_>) -> Result<Issued, IssueError> {
        validate::validate_profile_name(req.profile)?;

        // Nested-issuance guard: a Sentinel-issued session re-entering the
        // broker for the same profile would loop forever.
        if std::env::var(AWS_SENTINEL_ENV).as_deref() == Ok(req.profile) {
            return Err(IssueError::NestedIssuance {
                profile: req.profile.to_string(),
            });
        }

        let caller = match req.caller {
            Some(caller) => caller,
            None => sts::caller_identity(&self.sts).await?,
        };
        let user = caller.canonical_user()?;
        let spec = self.profiles.get(req.profile)?;
        let now = Timestamp::now();

        let grant = match req.breakglass_id {
            Some(event_id) => self.breakglass_grant(event_id, &user, req.profile, now).await?,
            None => self.evaluate_path(&user, req.profile, req.mode, now).await?,
        };

        // A session row is only mandatory when the matched rule insisted
        // on one; otherwise a disabled session store just skips the record.
        if self.sessions.is_none() && grant.needs_server_session {
            return Err(IssueError::SessionStoreRequired {
                rule: grant.decision.rule_name.clone(),
            });
        }

        let source_identity =
            SourceIdentity::new(&user, grant.marker.as_deref(), &grant.request_id)?;
        let duration = spec.clamp_duration(req.requested_duration);

        let credentials = sts::assume_role(
            &self.sts,
            &spec.role_arn,
            &source_identity,
            duration.as_secs(),
            spec.external_id.as_deref(),
        )
        .await?;

        // Session record before the caller sees anything: a row that fails
        // to insert rolls the issuance back.
        let session_id = match &self.sessions {
            Some(store) => {
                let session = ServerSession::new(
                    &grant.request_id,
                    &user,
                    req.profile,
                    &source_identity.to_string(),
                    &self.server_instance_id,
                    duration,
                    now,
                );
                store.create(&session).await.map_err(IssueError::SessionRecord)?;
                Some(session.id)
            }
            None => None,
        };

        self.log_decision(allow_record(
            &grant.decision,
            &user,
            req.profile,
            &self.access_policy_path,
            &source_identity,
            &spec.role_arn,
            duration,
        ))?;

        Ok(Issued {
            credentials,
            source_identity,
            session_id,
            decision: grant.decision,
            role_arn: spec.role_arn.clone(),
            duration,
        })
    }

    /// Re-mint credentials for an existing server session: policy is
    /// re-evaluated from scratch, but the SourceIdentity is the session's
    /// original one (STS keeps it immutable for the session's lifetime
    /// anyway).
    pub async fn reissue_for_session(
        &self,
        session: &ServerSession,
    ) -> Result<Credentials, IssueError> {
        let spec = self.profiles.get(&session.profile)?;
        let now = Timestamp::now();

        let grant = self
            .evaluate_path(&session.user, &session.profile, EvalMode::Server, now)
            .await?;

        let source_identity: SourceIdentity = session.source_identity.parse()?;

        let remaining = SignedDuration::from_secs(
            session.expires_at.as_second() - now.as_second(),
        );
        let duration = spec
            .clamp_duration(None)
            .min(remaining)
            .max(STS_MIN_DURATION);

        let credentials = sts::assume_role(
            &self.sts,
            &spec.role_arn,
            &source_identity,
            duration.as_secs(),
            spec.external_id.as_deref(),
        )
        .await?;

        self.log_decision(allow_record(
            &grant.decision,
            &session.user,
            &session.profile,
            &self.access_policy_path,
            &source_identity,
            &spec.role_arn,
            duration,
        ))?;

        Ok(credentials)
    }

    /// Open the emergency access path: check the break-glass policy,
    /// rate-limit, and record the event. The returned event's id feeds
    /// [`IssueRequest::breakglass_id`].
    pub async fn open_breakglass(
        &self,
        req: BreakGlassRequest<'_>,
    ) -> Result<BreakGlassEvent, IssueError> {
        validate::validate_profile_name(req.profile)?;
        let breakglass = self.breakglass.as_ref().ok_or_else(|| {
            IssueError::ProfileConfig("break-glass store is not configured".to_string())
        })?;

        let caller = match req.caller {
            Some(caller) => caller,
            None => sts::caller_identity(&self.sts).await?,
        };
        let user = caller.canonical_user()?;
        let now = Timestamp::now();

        let policy = self
            .policy_store
            .load_breakglass_policy(&breakglass.policy_path)
            .await?;

        let refused = |reason: &str| IssueError::Denied {
            rule: "break-glass-policy".to_string(),
            reason: reason.to_string(),
        };
        if !policy.allows_user(&user) {
            return Err(refused("user is not on the break-glass list"));
        }
        if !policy.allows_profile(req.profile) {
            return Err(refused("profile is not break-glass eligible"));
        }
        if !policy.allows_reason(req.reason_code) {
            return Err(refused("reason code is not allowed"));
        }
        if let Some(window) = &policy.time {
            if !window.contains(now)? {
                return Err(refused("outside the allowed time window"));
            }
        }

        let duration = req
            .duration
            .unwrap_or_else(|| policy.max_duration())
            .min(policy.max_duration());
        let event = BreakGlassEvent::new(
            &user,
            req.profile,
            req.reason_code,
            req.justification,
            duration,
            now,
        )?;

        let limits = self
            .policy_store
            .load_ratelimit_policy(&breakglass.ratelimit_path)
            .await?;
        breakglass.store.create(&event, &limits, now).await?;

        Ok(event)
    }

    /// Policy evaluation plus, on `require_approval`, the approval lookup.
    async fn evaluate_path(
        &self,
        user: &str,
        profile: &str,
        mode: EvalMode,
        now: Timestamp,
    ) -> Result<Grant, IssueError> {
        let policy = self
            .policy_store
            .load_access_policy(&self.access_policy_path)
            .await?;

        let input = EvalInput {
            user,
            profile,
            mode,
            now,
        };
        let env = EvalEnvironment {
            mdm: self.mdm.as_deref(),
            mdm_fail_mode: self.mdm_fail_mode,
        };
        let decision = evaluate(&policy, &input, &env).await;

        // Whether the rule the decision landed on carries the
        // require_server_session condition; the session-record step is
        // only mandatory for those.
        let needs_server_session = usize::try_from(decision.rule_index)
            .ok()
            .and_then(|index| policy.rules.get(index))
            .and_then(|rule| rule.conditions.as_ref())
            .and_then(|conditions| conditions.require_server_session)
            .unwrap_or(false);

        match decision.effect {
            Effect::Allow => Ok(Grant {
                decision,
                marker: None,
                request_id: ids::new_request_id(),
                needs_server_session,
            }),
            Effect::Deny => {
                self.log_decision(deny_record(
                    &decision,
                    user,
                    profile,
                    &self.access_policy_path,
                ))?;
                Err(IssueError::Denied {
                    rule: decision.rule_name,
                    reason: decision.reason,
                })
            }
            Effect::RequireApproval => {
                let approval = self
                    .approvals
                    .find_active_approval(user, profile, now)
                    .await?;
                match approval {
                    Some(approval) => {
                        tracing::info!(
                            approval_id = %approval.id,
                            user = user,
                            profile = profile,
                            "using active approval"
                        );
                        Ok(Grant {
                            decision,
                            marker: Some(approval_marker(&approval.id).to_string()),
                            request_id: ids::new_request_id(),
                            needs_server_session,
                        })
                    }
                    None => {
                        self.log_decision(deny_record(
                            &decision,
                            user,
                            profile,
                            &self.access_policy_path,
                        ))?;
                        Err(IssueError::ApprovalRequired {
                            profile: profile.to_string(),
                        })
                    }
                }
            }
        }
    }

    /// Validate a break-glass event and turn it into a grant: the event's
    /// id becomes the approval marker and its bound request id becomes the
    /// SourceIdentity request id.
    async fn breakglass_grant(
        &self,
        event_id: &str,
        user: &str,
        profile: &str,
        now: Timestamp,
    ) -> Result<Grant, IssueError> {
        let breakglass = self.breakglass.as_ref().ok_or_else(|| {
            IssueError::ProfileConfig("break-glass store is not configured".to_string())
        })?;
        let event = breakglass.store.get(event_id).await?;

        let unusable = |reason: &str| IssueError::BreakGlassUnusable {
            id: event_id.to_string(),
            reason: reason.to_string(),
        };
        if event.status != BreakGlassStatus::Active {
            return Err(unusable("event is not active"));
        }
        if event.is_expired(now) {
            return Err(unusable("event has expired"));
        }
        if event.invoker != user {
            return Err(unusable("event belongs to a different invoker"));
        }
        if event.profile != profile {
            return Err(unusable("event covers a different profile"));
        }

        let decision = Decision {
            effect: Effect::Allow,
            rule_name: "break-glass".to_string(),
            rule_index: -1,
            reason: format!("break-glass event {}", event.id),
            matched_at: now,
        };
        Ok(Grant {
            decision,
            marker: Some(approval_marker(&event.id).to_string()),
            request_id: event.request_id,
            needs_server_session: false,
        })
    }

    fn log_decision(&self, record: DecisionRecord) -> Result<(), IssueError> {
        match &self.log {
            Some(log) => log.append(&record),
            None => Ok(()),
        }
    }
}

/// SourceIdentity markers are 8 hex chars; store record ids are 16. The
/// marker is the id's first half, which remains unique enough to join
/// back to the record in queries.
fn approval_marker(record_id: &str) -> &str {
    &record_id[..record_id.len().min(8)]
}

fn deny_record(
    decision: &Decision,
    user: &str,
    profile: &str,
    policy_path: &str,
) -> DecisionRecord {
    DecisionRecord {
        timestamp: decision.matched_at.to_string(),
        user: user.to_string(),
        profile: profile.to_string(),
        effect: decision.effect,
        rule: decision.rule_name.clone(),
        rule_index: decision.rule_index,
        reason: decision.reason.clone(),
        policy_path: policy_path.to_string(),
        request_id: None,
        source_identity: None,
        role_arn: None,
        session_duration_seconds: None,
    }
}

fn allow_record(
    decision: &Decision,
    user: &str,
    profile: &str,
    policy_path: &str,
    source_identity: &SourceIdentity,
    role_arn: &str,
    duration: SignedDuration,
) -> DecisionRecord {
    DecisionRecord {
        timestamp: decision.matched_at.to_string(),
        user: user.to_string(),
        profile: profile.to_string(),
        effect: Effect::Allow,
        rule: decision.rule_name.clone(),
        rule_index: decision.rule_index,
        reason: decision.reason.clone(),
        policy_path: policy_path.to_string(),
        request_id: Some(source_identity.request_id().to_string()),
        source_identity: Some(source_identity.to_string()),
        role_arn: Some(role_arn.to_string()),
        session_duration_seconds: Some(duration.as_secs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_is_first_half_of_record_id() {
        assert_eq!(approval_marker("abcd1234deadbeef"), "abcd1234");
        assert_eq!(approval_marker("abcd1234"), "abcd1234");
    }

    #[test]
    fn deny_record_has_no_allow_fields() {
        let now: Timestamp = "2026-01-20T12:00:00Z".parse().unwrap();
        let record = deny_record(&Decision::default_deny(now), "alice", "dev", "/p");
        assert_eq!(record.effect, Effect::Deny);
        assert_eq!(record.rule_index, -1);
        assert!(record.request_id.is_none());
        assert!(record.source_identity.is_none());
    }

    #[test]
    fn allow_record_carries_the_stamp() {
        let now: Timestamp = "2026-01-20T12:00:00Z".parse().unwrap();
        let decision = Decision {
            effect: Effect::Allow,
            rule_name: "a".to_string(),
            rule_index: 0,
            reason: String::new(),
            matched_at: now,
        };
        let si = SourceIdentity::new("alice", Some("abcd1234"), "00ff00ff").unwrap();
        let record = allow_record(
            &decision,
            "alice",
            "prod",
            "/p",
            &si,
            "arn:aws:iam::123456789012:role/prod",
            SignedDuration::from_secs(3600),
        );
        assert_eq!(record.request_id.as_deref(), Some("00ff00ff"));
        assert_eq!(
            record.source_identity.as_deref(),
            Some("sentinel:alice:abcd1234:00ff00ff")
        );
        assert_eq!(record.session_duration_seconds, Some(3600));
    }
}
