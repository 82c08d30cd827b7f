use std::collections::BTreeSet;

use serde::Serialize;

/// Identity established by the external session provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Allowed,
    Unauthenticated,
    Forbidden,
}

impl AccessDecision {
    pub fn is_allowed(self) -> bool {
        self == AccessDecision::Allowed
    }
}

/// Capability check used to gate admin-only paths.
pub trait AccessGate: Send + Sync {
    fn has_access(&self, session: Option<&Session>, role: Role) -> AccessDecision;
}

/// Grants `Admin` to sessions whose identity is on a fixed allow-list.
#[derive(Debug, Clone, Default)]
pub struct AllowListGate {
    admins: BTreeSet<String>,
}

impl AllowListGate {
    pub fn new<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let admins = identities
            .into_iter()
            .map(|identity| identity.as_ref().trim().to_ascii_lowercase())
            .filter(|identity| !identity.is_empty())
            .collect();
        Self { admins }
    }
}

impl AccessGate for AllowListGate {
    fn has_access(&self, session: Option<&Session>, role: Role) -> AccessDecision {
        let Some(session) = session else {
            return AccessDecision::Unauthenticated;
        };

        match role {
            Role::Admin => {
                let identity = session.identity.trim().to_ascii_lowercase();
                if self.admins.contains(&identity) {
                    AccessDecision::Allowed
                } else {
                    AccessDecision::Forbidden
                }
            }
        }
    }
}
