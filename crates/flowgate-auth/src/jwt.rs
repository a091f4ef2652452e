//! JWT claims resolver.
//!
//! Decodes the token's claims and takes `sub` as the user ID. Signature
//! verification is NOT performed here: tokens reaching the gateway were
//! already issued and validated by the external IAM, and the gateway has
//! no key material. Deployments that terminate trust elsewhere inject
//! their own [`IdentityResolver`](crate::IdentityResolver).

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use tracing::debug;

use flowgate_core::Identity;

use crate::{AuthError, IdentityResolver};

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    sub: Option<String>,
}

/// Resolver for JWT bearer tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct JwtIdentityResolver;

impl JwtIdentityResolver {
    /// Create the resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn decode_claims(token: &str) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = Self::decode_claims(token)?;
        let user_id = claims
            .sub
            .filter(|sub| !sub.is_empty())
            .ok_or_else(|| AuthError::Rejected("token carries no subject".into()))?;
        debug!(user_id = %user_id, "identity resolved from token claims");
        Ok(Identity::new(token, user_id))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    use flowgate_core::UserId;

    use super::*;

    #[derive(Serialize)]
    struct Claims<'a> {
        #[serde(skip_serializing_if = "Option::is_none")]
        sub: Option<&'a str>,
    }

    fn token_with_sub(sub: Option<&str>) -> String {
        encode(
            &Header::default(),
            &Claims { sub },
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn resolves_subject_as_user_id() {
        let token = token_with_sub(Some("u1"));
        let identity = JwtIdentityResolver::new().resolve(&token).await.unwrap();
        assert_eq!(identity.user_id, UserId::from("u1"));
        assert_eq!(identity.token, token);
    }

    #[tokio::test]
    async fn signature_is_not_checked() {
        // Same claims, different key: still resolves, by design.
        let token = encode(
            &Header::default(),
            &Claims { sub: Some("u1") },
            &EncodingKey::from_secret(b"some-other-secret"),
        )
        .unwrap();
        let identity = JwtIdentityResolver::new().resolve(&token).await.unwrap();
        assert_eq!(identity.user_id, UserId::from("u1"));
    }

    #[tokio::test]
    async fn missing_subject_is_rejected() {
        let token = token_with_sub(None);
        let err = JwtIdentityResolver::new().resolve(&token).await.unwrap_err();
        assert_matches!(err, AuthError::Rejected(_));
    }

    #[tokio::test]
    async fn empty_subject_is_rejected() {
        let token = token_with_sub(Some(""));
        let err = JwtIdentityResolver::new().resolve(&token).await.unwrap_err();
        assert_matches!(err, AuthError::Rejected(_));
    }

    #[tokio::test]
    async fn garbage_token_is_malformed() {
        let err = JwtIdentityResolver::new()
            .resolve("not-a-jwt")
            .await
            .unwrap_err();
        assert_matches!(err, AuthError::Malformed(_));
    }
}
