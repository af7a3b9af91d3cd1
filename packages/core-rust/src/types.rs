use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Authenticated caller identity, resolved by the transport before dispatch.
///
/// Roles are stored as given; capability matching is case-insensitive and
/// happens in the authorization gate, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerClaims {
    /// Unique identifier for the authenticated subject.
    pub subject_id: String,
    /// Roles granted to the subject.
    pub roles: BTreeSet<String>,
}

impl CallerClaims {
    /// Builds claims from a subject and any iterable of role names.
    pub fn new<I, S>(subject_id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject_id: subject_id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Case-insensitive role membership test.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

/// Opaque reference to downstream credentials.
///
/// The dispatch core never inspects it; operation bodies hand it to whatever
/// collaborator acquires real credentials. `Debug` never prints the value.
#[derive(Clone, Default)]
pub struct CredentialsHandle(Option<Arc<str>>);

impl CredentialsHandle {
    /// A handle with no credentials attached.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }

    /// Wraps an opaque credential reference (e.g. a vault path or token id).
    pub fn new(reference: impl Into<Arc<str>>) -> Self {
        Self(Some(reference.into()))
    }

    /// Returns the wrapped reference, if any.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        self.0.as_deref()
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Debug for CredentialsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = if self.0.is_some() { "<redacted>" } else { "<none>" };
        f.debug_tuple("CredentialsHandle").field(&shown).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_role_ignores_case() {
        let claims = CallerClaims::new("alice", ["AKS-Operator"]);
        assert!(claims.has_role("aks-operator"));
        assert!(claims.has_role("AKS-OPERATOR"));
        assert!(!claims.has_role("AKS"));
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let handle = CredentialsHandle::new("kv://secret/aks-sp");
        let shown = format!("{handle:?}");
        assert!(!shown.contains("kv://"));
        assert!(shown.contains("<redacted>"));
        assert_eq!(handle.reference(), Some("kv://secret/aks-sp"));
        assert!(!CredentialsHandle::none().is_present());
    }
}
