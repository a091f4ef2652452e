//! # flowgate-auth
//!
//! Turns the bearer credential a client presents at channel-open into an
//! authenticated [`Identity`]. The gateway only depends on the
//! [`IdentityResolver`] trait; [`jwt::JwtIdentityResolver`] is the
//! default implementation for deployments where tokens are JWTs issued by
//! an external IAM.

#![deny(unsafe_code)]

pub mod jwt;

use async_trait::async_trait;
use thiserror::Error;

use flowgate_core::Identity;

pub use jwt::JwtIdentityResolver;

/// Authentication failures at channel-open.
///
/// Any variant refuses the connection; no gateway state is created.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The handshake carried no authorization credential at all.
    #[error("no auth token provided")]
    MissingCredential,

    /// The credential was present but not decodable.
    #[error("malformed credential: {0}")]
    Malformed(String),

    /// The credential decoded but the resolver refused it.
    #[error("credential rejected: {0}")]
    Rejected(String),
}

/// Resolves a bearer token into an [`Identity`].
///
/// May suspend: a production resolver typically asks a remote identity
/// service. Retries, if any, belong to the implementation; the gateway
/// never retries a failed resolution.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve `token` or refuse the connection.
    async fn resolve(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Extract the raw token from an `Authorization` header value.
///
/// Strips a `Bearer ` scheme prefix when present; a bare token is
/// accepted as-is. An empty value (or a scheme with nothing after it)
/// is a missing credential.
pub fn bearer_token(header_value: &str) -> Result<&str, AuthError> {
    let token = header_value
        .strip_prefix("Bearer ")
        .unwrap_or(header_value)
        .trim();
    if token.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    Ok(token)
}
