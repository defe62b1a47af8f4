//! First-match policy evaluation.
//!
//! Rules are walked in source order; the first rule whose present
//! conditions all hold decides the outcome. No match is a deny. The
//! engine itself never errors: a condition that cannot be evaluated
//! either skips the rule or, for fail-closed MDM deployments, denies
//! outright.

use sentinel_core::models::{Decision, Effect, EvalMode};

use crate::mdm::{PostureLookup, PostureProvider};
use crate::model::{AccessPolicy, Rule};

/// What to do when the MDM provider cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MdmFailMode {
    /// Skip the rule (non-match) and keep evaluating.
    #[default]
    Open,
    /// Deny the whole evaluation.
    Closed,
}

/// Caller-side facts for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvalInput<'a> {
    /// Canonical username, already sanitized.
    pub user: &'a str,
    pub profile: &'a str,
    pub mode: EvalMode,
    pub now: jiff::Timestamp,
}

/// Deployment-side facts: the MDM provider (if any) and its failure mode.
#[derive(Default)]
pub struct EvalEnvironment<'a> {
    pub mdm: Option<&'a dyn PostureProvider>,
    pub mdm_fail_mode: MdmFailMode,
}

enum MatchOutcome {
    Match,
    NoMatch,
    MdmUnavailable,
}

/// Evaluate `policy` for `input`, producing a typed [`Decision`].
pub async fn evaluate(
    policy: &AccessPolicy,
    input: &EvalInput<'_>,
    env: &EvalEnvironment<'_>,
) -> Decision {
    for (index, rule) in policy.rules.iter().enumerate() {
        match rule_matches(rule, input, env).await {
            MatchOutcome::NoMatch => continue,
            MatchOutcome::MdmUnavailable => match env.mdm_fail_mode {
                MdmFailMode::Open => continue,
                MdmFailMode::Closed => {
                    tracing::warn!(
                        rule = %rule.name,
                        "MDM provider unavailable, failing closed"
                    );
                    return Decision {
                        effect: Effect::Deny,
                        rule_name: rule.name.clone(),
                        rule_index: index as i32,
                        reason: "mdm provider unavailable".to_string(),
                        matched_at: input.now,
                    };
                }
            },
            MatchOutcome::Match => {
                let mut effect = rule.effect;
                let mut reason = rule.reason.clone().unwrap_or_default();

                // A rule that demands a server session only honors its
                // effect in server mode; in standard mode it denies.
                let needs_server = rule
                    .conditions
                    .as_ref()
                    .and_then(|c| c.require_server_session)
                    .unwrap_or(false);
                if needs_server && input.mode == EvalMode::Standard {
                    effect = Effect::Deny;
                    reason = format!("rule {:?} requires a server session", rule.name);
                }

                return Decision {
                    effect,
                    rule_name: rule.name.clone(),
                    rule_index: index as i32,
                    reason,
                    matched_at: input.now,
                };
            }
        }
    }

    Decision::default_deny(input.now)
}

async fn rule_matches(
    rule: &Rule,
    input: &EvalInput<'_>,
    env: &EvalEnvironment<'_>,
) -> MatchOutcome {
    let Some(conditions) = rule.conditions.as_ref() else {
        return MatchOutcome::Match;
    };

    if !conditions.profiles.is_empty()
        && !conditions.profiles.iter().any(|p| p == input.profile)
    {
        return MatchOutcome::NoMatch;
    }

    // Membership is checked against the canonical user, never the raw
    // principal.
    if !conditions.users.is_empty() && !conditions.users.iter().any(|u| u == input.user) {
        return MatchOutcome::NoMatch;
    }

    if let Some(window) = &conditions.time {
        match window.contains(input.now) {
            Ok(true) => {}
            Ok(false) => return MatchOutcome::NoMatch,
            Err(e) => {
                // Unreachable for validated policies; a defective window
                // never matches.
                tracing::warn!(rule = %rule.name, error = %e, "time condition unevaluable");
                return MatchOutcome::NoMatch;
            }
        }
    }

    if let Some(mdm) = conditions.mdm.as_ref().filter(|m| !m.is_empty()) {
        let lookup = match env.mdm {
            Some(provider) => provider.lookup(input.user).await,
            None => PostureLookup::Unavailable,
        };
        match lookup {
            PostureLookup::Facts(facts) => {
                if let Some(want) = mdm.compliant {
                    if facts.compliant != want {
                        return MatchOutcome::NoMatch;
                    }
                }
                if let Some(want) = mdm.enrolled {
                    if facts.enrolled != want {
                        return MatchOutcome::NoMatch;
                    }
                }
            }
            PostureLookup::NotFound => return MatchOutcome::NoMatch,
            PostureLookup::Unavailable => return MatchOutcome::MdmUnavailable,
        }
    }

    MatchOutcome::Match
}
