use sentinel_core::identity::{parse_arn, sanitize_user, ArnIdentity, PrincipalKind};

fn canonical(arn: &str) -> String {
    parse_arn(arn).unwrap().canonical_user().unwrap()
}

#[test]
fn iam_user_takes_trailing_path_segment() {
    let id = parse_arn("arn:aws:iam::123456789012:user/alice").unwrap();
    assert_eq!(id.kind, PrincipalKind::User);
    assert_eq!(id.raw_user, "alice");

    let nested = parse_arn("arn:aws:iam::123456789012:user/division/team/bob").unwrap();
    assert_eq!(nested.raw_user, "bob");
}

#[test]
fn assumed_role_takes_session_name() {
    let id = parse_arn("arn:aws:sts::123456789012:assumed-role/admin-role/carol").unwrap();
    assert_eq!(id.kind, PrincipalKind::AssumedRole);
    assert_eq!(id.raw_user, "carol");
}

#[test]
fn federated_user_and_root_are_distinct_kinds() {
    let fed = parse_arn("arn:aws:sts::123456789012:federated-user/dave").unwrap();
    assert_eq!(fed.kind, PrincipalKind::FederatedUser);
    assert_eq!(fed.raw_user, "dave");

    let root = parse_arn("arn:aws:iam::123456789012:root").unwrap();
    assert_eq!(root.kind, PrincipalKind::Root);
    assert_eq!(root.raw_user, "root");
}

#[test]
fn all_gov_and_iso_partitions_accepted() {
    for partition in ["aws", "aws-cn", "aws-us-gov", "aws-iso", "aws-iso-b"] {
        let arn = format!("arn:{partition}:iam::123456789012:user/alice");
        assert!(parse_arn(&arn).is_ok(), "partition {partition} rejected");
    }
}

#[test]
fn malformed_arns_rejected() {
    let bad = [
        "arn:gcp:iam::123456789012:user/alice",       // unknown partition
        "arn:aws:s3::123456789012:user/alice",        // wrong service
        "arn:aws:iam::12345678901:user/alice",        // 11-digit account
        "arn:aws:iam::12345678901x:user/alice",       // non-digit account
        "arn:aws:iam::123456789012:",                 // empty resource
        "arn:aws:iam::123456789012:user/",            // empty tail
        "arn:aws:iam::123456789012:group/devs",       // unsupported resource
        "arn:aws:sts::123456789012:assumed-role/role", // missing session
        "not-an-arn",
        "",
    ];
    for arn in bad {
        assert!(parse_arn(arn).is_err(), "accepted: {arn}");
    }
}

#[test]
fn control_byte_in_arn_never_yields_spliced_user() {
    // Either the parse fails outright or the result is the clean prefix;
    // it must never splice across the control byte into "aliceadmin".
    match parse_arn("arn:aws:iam::123456789012:user/alice\x00admin") {
        Err(_) => {}
        Ok(id) => {
            let user = id.canonical_user().unwrap();
            assert_ne!(user, "aliceadmin");
            assert_eq!(user, "alice");
        }
    }
}

#[test]
fn every_accepted_arn_sanitizes_to_the_invariant() {
    let arns = [
        "arn:aws:iam::123456789012:user/alice",
        "arn:aws:iam::123456789012:user/ops/bob-jones",
        "arn:aws:sts::123456789012:assumed-role/deploy/ci-runner-01",
        "arn:aws:sts::123456789012:federated-user/eve.adams",
        "arn:aws:iam::123456789012:root",
        "arn:aws:iam::123456789012:user/a.very.long.email.address@example.com",
    ];
    for arn in arns {
        let user = canonical(arn);
        assert!(!user.is_empty() && user.len() <= 20, "{arn} -> {user}");
        assert!(user.bytes().all(|b| b.is_ascii_alphanumeric()), "{arn} -> {user}");
    }
}

#[test]
fn email_users_canonicalize_to_local_part() {
    assert_eq!(canonical("arn:aws:iam::123456789012:user/alice@example.com"), "alice");
    assert_eq!(canonical("arn:aws:iam::123456789012:user/j.doe@corp.io"), "jdoe");
}

#[test]
fn raw_user_is_display_only_matching_uses_canonical() {
    let id: ArnIdentity = parse_arn("arn:aws:iam::123456789012:user/alice@example.com").unwrap();
    assert_eq!(id.raw_user, "alice@example.com");
    assert_eq!(id.canonical_user().unwrap(), "alice");
}

#[test]
fn sanitize_handles_homoglyphs_destructively() {
    // Cyrillic "а" (U+0430) looks like Latin "a" but is stripped, not mapped.
    assert_eq!(sanitize_user("\u{0430}lice").unwrap(), "lice");
}
