//! Capability-based authorization.
//!
//! Capabilities are flat strings: a caller is allowed iff one of its roles
//! equals the operation's required capability, ignoring ASCII case. There is
//! no wildcard or hierarchy matching.

use day2_core::{CallerClaims, OperationDescriptor};

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Allowed,
    Denied,
}

impl AuthDecision {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Evaluates caller claims against a descriptor's capability requirement.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationGate;

impl AuthorizationGate {
    /// Pure predicate over its two inputs.
    #[must_use]
    pub fn check(&self, descriptor: &OperationDescriptor, claims: &CallerClaims) -> AuthDecision {
        check_capability(descriptor.required_capability(), claims)
    }
}

/// Returns `Allowed` iff `claims.roles` contains `capability` (case-insensitive).
///
/// A blank capability is never satisfied.
#[must_use]
pub fn check_capability(capability: &str, claims: &CallerClaims) -> AuthDecision {
    if !capability.is_empty() && claims.has_role(capability) {
        AuthDecision::Allowed
    } else {
        AuthDecision::Denied
    }
}

#[cfg(test)]
mod tests {
    use day2_core::{handler_fn, Arguments, ExecutionContext};
    use proptest::prelude::*;

    use super::*;

    fn start_cluster() -> OperationDescriptor {
        OperationDescriptor::builder("StartCluster", "AKS-Operator")
            .handler(handler_fn(|_ctx: ExecutionContext, _args: Arguments| async move {
                Ok(serde_json::Value::Null)
            }))
            .build()
            .unwrap()
    }

    #[test]
    fn allows_matching_role() {
        let claims = CallerClaims::new("alice", ["Viewer", "AKS-Operator"]);
        assert_eq!(
            AuthorizationGate.check(&start_cluster(), &claims),
            AuthDecision::Allowed
        );
    }

    #[test]
    fn match_ignores_case() {
        let claims = CallerClaims::new("alice", ["aks-operator"]);
        assert!(AuthorizationGate.check(&start_cluster(), &claims).is_allowed());
    }

    #[test]
    fn only_ascii_letters_fold() {
        let claims = CallerClaims::new("dora", ["äks-operator"]);
        assert_eq!(check_capability("ÄKS-Operator", &claims), AuthDecision::Denied);
        assert!(check_capability("äKS-OPERATOR", &claims).is_allowed());
    }

    #[test]
    fn denies_without_role() {
        let claims = CallerClaims::new("bob", ["Viewer"]);
        assert_eq!(
            AuthorizationGate.check(&start_cluster(), &claims),
            AuthDecision::Denied
        );
    }

    #[test]
    fn no_prefix_or_wildcard_matching() {
        for role in ["AKS", "AKS-*", "*", "AKS-Operator-Admin", " AKS-Operator"] {
            let claims = CallerClaims::new("carol", [role]);
            assert_eq!(
                check_capability("AKS-Operator", &claims),
                AuthDecision::Denied,
                "role {role:?} must not satisfy AKS-Operator"
            );
        }
    }

    #[test]
    fn empty_claims_are_denied() {
        assert_eq!(
            check_capability("AKS-Operator", &CallerClaims::default()),
            AuthDecision::Denied
        );
    }

    proptest! {
        #[test]
        fn allowed_iff_capability_in_roles(
            capability in "[A-Za-z][A-Za-z-]{0,11}",
            roles in proptest::collection::btree_set("[A-Za-z][A-Za-z-]{0,11}", 0..6),
        ) {
            let claims = CallerClaims::new("subject", roles.clone());
            let expected = roles.iter().any(|r| r.eq_ignore_ascii_case(&capability));
            let decision = check_capability(&capability, &claims);
            prop_assert_eq!(decision.is_allowed(), expected);
            // Same inputs, same answer.
            prop_assert_eq!(check_capability(&capability, &claims), decision);
        }

        #[test]
        fn granting_capability_always_allows(
            capability in "[A-Za-z][A-Za-z-]{0,11}",
            roles in proptest::collection::btree_set("[A-Za-z]{1,8}", 0..6),
            upper in any::<bool>(),
        ) {
            let granted = if upper { capability.to_ascii_uppercase() } else { capability.to_ascii_lowercase() };
            let claims = CallerClaims::new("subject", roles.into_iter().chain([granted]));
            prop_assert!(check_capability(&capability, &claims).is_allowed());
        }
    }
}
