use crate::workflows::leads::{AccessDecision, AccessGate, AllowListGate, Role, Session};

fn session(identity: &str) -> Session {
    Session {
        identity: identity.to_string(),
    }
}

#[test]
fn listed_identity_is_allowed_case_insensitively() {
    let gate = AllowListGate::new([" Anne@Example.com "]);
    let decision = gate.has_access(Some(&session("anne@example.COM")), Role::Admin);
    assert!(decision.is_allowed());
}

#[test]
fn unknown_identity_is_forbidden() {
    let gate = AllowListGate::new(["anne@example.com"]);
    assert_eq!(
        gate.has_access(Some(&session("mallory@example.com")), Role::Admin),
        AccessDecision::Forbidden
    );
}

#[test]
fn missing_session_is_unauthenticated() {
    let gate = AllowListGate::new(["anne@example.com"]);
    assert_eq!(
        gate.has_access(None, Role::Admin),
        AccessDecision::Unauthenticated
    );
}

#[test]
fn blank_entries_grant_nothing() {
    let gate = AllowListGate::new(["", "   "]);
    assert_eq!(
        gate.has_access(Some(&session("")), Role::Admin),
        AccessDecision::Forbidden
    );
}
