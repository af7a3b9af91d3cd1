//! Bearer token verification and claim extraction.
//!
//! Callers present `Authorization: Bearer <jwt>`. The token is verified with
//! an HS256 shared secret; `sub` becomes the caller id and `roles` the
//! capability set checked by the authorization gate. The raw token travels
//! on as the operation's credentials handle.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use day2_core::{CallerClaims, CredentialsHandle};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::AuthConfig;

/// Claims carried in a Day2 access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Expiry, seconds since Unix epoch.
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("authorization header is not a bearer token")]
    InvalidScheme,
    #[error("invalid token")]
    InvalidToken,
    #[error("token has no subject")]
    MissingSubject,
}

/// A verified caller.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub claims: CallerClaims,
    /// The presented bearer token. Redacted in `Debug`.
    pub credentials: CredentialsHandle,
}

/// Verifies access tokens and turns them into [`CallerClaims`].
pub struct JwtAuthenticator {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
    issuer: Option<String>,
}

impl JwtAuthenticator {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        validation.leeway = config.leeway_secs;
        if let Some(iss) = config.issuer.as_deref() {
            validation.set_issuer(&[iss]);
            validation.set_required_spec_claims(&["exp", "iss"]);
        }

        Self {
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
        }
    }

    /// Extracts and verifies the bearer token in `headers`.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the header is absent, malformed, or the
    /// token fails verification.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Authenticated, AuthError> {
        let value = headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidScheme)?;
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidScheme)?;
        let claims = self.verify(token)?;
        Ok(Authenticated {
            claims,
            credentials: CredentialsHandle::new(token),
        })
    }

    /// Verifies a raw token.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` on a bad signature, expiry, or issuer, and
    /// `MissingSubject` when `sub` is blank.
    pub fn verify(&self, token: &str) -> Result<CallerClaims, AuthError> {
        let claims = decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map_err(|err| {
                debug!(error = %err, "token rejected");
                AuthError::InvalidToken
            })?
            .claims;
        if claims.sub.trim().is_empty() {
            return Err(AuthError::MissingSubject);
        }
        Ok(CallerClaims::new(claims.sub, claims.roles))
    }

    /// Signs a token for `subject`. Used by the CLI and tests.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue(
        &self,
        subject: &str,
        roles: &[&str],
        ttl_secs: u64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = TokenClaims {
            sub: subject.to_string(),
            roles: roles.iter().map(|r| (*r).to_string()).collect(),
            exp: jsonwebtoken::get_current_timestamp() + ttl_secs,
            iss: self.issuer.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn authenticator() -> JwtAuthenticator {
        JwtAuthenticator::new(&AuthConfig::new("test-secret"))
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn issued_token_round_trips_to_claims() {
        let auth = authenticator();
        let token = auth.issue("alice", &["AKS-Operator", "Viewer"], 300).unwrap();
        let caller = auth.authenticate(&bearer(&token)).unwrap();
        let claims = &caller.claims;
        assert_eq!(claims.subject_id, "alice");
        assert!(claims.has_role("aks-operator"));
        assert!(claims.has_role("Viewer"));
        assert_eq!(caller.credentials.reference(), Some(token.as_str()));
        assert!(!format!("{caller:?}").contains(&token));
    }

    #[test]
    fn missing_header_is_rejected() {
        assert_eq!(
            authenticator().authenticate(&HeaderMap::new()).err(),
            Some(AuthError::MissingToken)
        );
    }

    #[test]
    fn non_bearer_scheme_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic YWxpY2U6cHc="));
        assert_eq!(
            authenticator().authenticate(&headers).err(),
            Some(AuthError::InvalidScheme)
        );
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let other = JwtAuthenticator::new(&AuthConfig::new("other-secret"));
        let token = other.issue("mallory", &["AKS-Operator"], 300).unwrap();
        assert_eq!(
            authenticator().authenticate(&bearer(&token)).err(),
            Some(AuthError::InvalidToken)
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = authenticator();
        let claims = TokenClaims {
            sub: "alice".to_string(),
            roles: vec![],
            exp: jsonwebtoken::get_current_timestamp() - 3_600,
            iss: None,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &auth.encoding).unwrap();
        assert_eq!(auth.verify(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn issuer_is_enforced_when_configured() {
        let mut config = AuthConfig::new("test-secret");
        config.issuer = Some("day2".to_string());
        let strict = JwtAuthenticator::new(&config);

        let unscoped = authenticator().issue("alice", &[], 300).unwrap();
        assert_eq!(strict.verify(&unscoped), Err(AuthError::InvalidToken));

        let scoped = strict.issue("alice", &[], 300).unwrap();
        assert!(strict.verify(&scoped).is_ok());
    }

    #[test]
    fn blank_subject_is_rejected() {
        let auth = authenticator();
        let token = auth.issue("  ", &["AKS-Operator"], 300).unwrap();
        assert_eq!(auth.verify(&token), Err(AuthError::MissingSubject));
    }
}
