use sentinel_core::models::{Effect, EvalMode};
use sentinel_policy::{
    evaluate, AccessPolicy, DeviceFacts, EvalEnvironment, EvalInput, MdmFailMode,
    StaticPostureProvider,
};

fn policy(yaml: &str) -> AccessPolicy {
    AccessPolicy::from_yaml(yaml).unwrap()
}

fn input<'a>(user: &'a str, profile: &'a str) -> EvalInput<'a> {
    EvalInput {
        user,
        profile,
        mode: EvalMode::Standard,
        now: "2026-01-20T15:00:00Z".parse().unwrap(),
    }
}

#[tokio::test]
async fn empty_policy_is_default_deny() {
    let p = policy("version: \"1\"\nrules: []\n");
    let d = evaluate(&p, &input("alice", "dev"), &EvalEnvironment::default()).await;

    assert_eq!(d.effect, Effect::Deny);
    assert_eq!(d.rule_name, "");
    assert_eq!(d.rule_index, -1);
    assert_eq!(d.reason, "no matching rule");
}

#[tokio::test]
async fn first_match_wins_over_later_deny() {
    let p = policy(
        r#"
version: "1"
rules:
  - name: a
    effect: allow
    conditions: { users: [alice] }
  - name: b
    effect: deny
    conditions: { users: [alice] }
"#,
    );
    let d = evaluate(&p, &input("alice", "dev"), &EvalEnvironment::default()).await;
    assert_eq!(d.effect, Effect::Allow);
    assert_eq!(d.rule_name, "a");
    assert_eq!(d.rule_index, 0);
}

#[tokio::test]
async fn non_matching_rules_are_skipped() {
    let p = policy(
        r#"
version: "1"
rules:
  - name: bob-only
    effect: allow
    conditions: { users: [bob] }
  - name: fallback-deny
    effect: deny
    reason: not on the list
"#,
    );
    let d = evaluate(&p, &input("alice", "dev"), &EvalEnvironment::default()).await;
    assert_eq!(d.effect, Effect::Deny);
    assert_eq!(d.rule_name, "fallback-deny");
    assert_eq!(d.rule_index, 1);
    assert_eq!(d.reason, "not on the list");
}

#[tokio::test]
async fn time_window_boundaries() {
    let p = policy(
        r#"
version: "1"
rules:
  - name: business-hours
    effect: allow
    conditions:
      time:
        hours: { start: "09:00", end: "18:00" }
        timezone: America/New_York
"#,
    );
    let env = EvalEnvironment::default();

    let at = |ts: &str| EvalInput {
        user: "alice",
        profile: "dev",
        mode: EvalMode::Standard,
        now: ts.parse().unwrap(),
    };

    let before = evaluate(&p, &at("2026-01-20T08:59:59-05:00"), &env).await;
    assert_eq!(before.effect, Effect::Deny, "08:59:59 must not match");

    let opening = evaluate(&p, &at("2026-01-20T09:00:00-05:00"), &env).await;
    assert_eq!(opening.effect, Effect::Allow, "start is inclusive");

    let closing = evaluate(&p, &at("2026-01-20T18:00:00-05:00"), &env).await;
    assert_eq!(closing.effect, Effect::Deny, "end is exclusive");
}

#[tokio::test]
async fn require_approval_is_a_distinct_terminal_effect() {
    let p = policy(
        r#"
version: "1"
rules:
  - name: prod-gate
    effect: require_approval
    conditions: { profiles: [prod] }
"#,
    );
    let d = evaluate(&p, &input("alice", "prod"), &EvalEnvironment::default()).await;
    assert_eq!(d.effect, Effect::RequireApproval);
}

#[tokio::test]
async fn server_session_rule_demotes_to_deny_in_standard_mode() {
    let p = policy(
        r#"
version: "1"
rules:
  - name: revocable-only
    effect: allow
    conditions: { require_server_session: true }
"#,
    );

    let standard = evaluate(&p, &input("alice", "dev"), &EvalEnvironment::default()).await;
    assert_eq!(standard.effect, Effect::Deny);
    assert_eq!(standard.rule_name, "revocable-only");

    let mut server_input = input("alice", "dev");
    server_input.mode = EvalMode::Server;
    let server = evaluate(&p, &server_input, &EvalEnvironment::default()).await;
    assert_eq!(server.effect, Effect::Allow);
}

#[tokio::test]
async fn mdm_facts_gate_the_rule() {
    let p = policy(
        r#"
version: "1"
rules:
  - name: compliant-devices
    effect: allow
    conditions:
      mdm: { compliant: true }
  - name: fallback
    effect: deny
"#,
    );

    let compliant = StaticPostureProvider::new()
        .with_device("alice", DeviceFacts { compliant: true, enrolled: true });
    let env = EvalEnvironment {
        mdm: Some(&compliant),
        mdm_fail_mode: MdmFailMode::Open,
    };
    assert_eq!(
        evaluate(&p, &input("alice", "dev"), &env).await.effect,
        Effect::Allow
    );

    let noncompliant = StaticPostureProvider::new()
        .with_device("alice", DeviceFacts { compliant: false, enrolled: true });
    let env = EvalEnvironment {
        mdm: Some(&noncompliant),
        mdm_fail_mode: MdmFailMode::Open,
    };
    assert_eq!(
        evaluate(&p, &input("alice", "dev"), &env).await.effect,
        Effect::Deny
    );

    // Unknown device: the rule is skipped, not treated as unavailable.
    let empty = StaticPostureProvider::new();
    let env = EvalEnvironment {
        mdm: Some(&empty),
        mdm_fail_mode: MdmFailMode::Closed,
    };
    assert_eq!(
        evaluate(&p, &input("alice", "dev"), &env).await.effect,
        Effect::Deny
    );
}

#[tokio::test]
async fn mdm_unavailable_follows_deployment_fail_mode() {
    let p = policy(
        r#"
version: "1"
rules:
  - name: compliant-devices
    effect: allow
    conditions:
      mdm: { compliant: true }
  - name: everyone
    effect: allow
"#,
    );
    let down = StaticPostureProvider::unavailable();

    // Fail-open: the MDM rule is skipped and the next rule allows.
    let env = EvalEnvironment {
        mdm: Some(&down),
        mdm_fail_mode: MdmFailMode::Open,
    };
    let open = evaluate(&p, &input("alice", "dev"), &env).await;
    assert_eq!(open.effect, Effect::Allow);
    assert_eq!(open.rule_name, "everyone");

    // Fail-closed: the evaluation denies at the MDM rule.
    let env = EvalEnvironment {
        mdm: Some(&down),
        mdm_fail_mode: MdmFailMode::Closed,
    };
    let closed = evaluate(&p, &input("alice", "dev"), &env).await;
    assert_eq!(closed.effect, Effect::Deny);
    assert_eq!(closed.rule_name, "compliant-devices");
}

#[tokio::test]
async fn conditions_are_anded() {
    let p = policy(
        r#"
version: "1"
rules:
  - name: alice-on-prod
    effect: allow
    conditions:
      users: [alice]
      profiles: [prod]
"#,
    );
    let env = EvalEnvironment::default();

    assert_eq!(
        evaluate(&p, &input("alice", "prod"), &env).await.effect,
        Effect::Allow
    );
    assert_eq!(
        evaluate(&p, &input("alice", "dev"), &env).await.effect,
        Effect::Deny
    );
    assert_eq!(
        evaluate(&p, &input("bob", "prod"), &env).await.effect,
        Effect::Deny
    );
}
