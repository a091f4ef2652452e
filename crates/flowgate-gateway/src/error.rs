//! Gateway error taxonomy.

use thiserror::Error;

use flowgate_auth::AuthError;
use flowgate_bus::BusError;

/// Failures surfaced by the channel-open path.
///
/// Either variant means the open failed and no gateway state survives
/// for that attempt. Teardown of missing state is deliberately NOT an
/// error anywhere in the gateway; it is logged and swallowed.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The credential was missing or refused; the connection is rejected
    /// before any state is created.
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    /// The event bus rejected a subscribe call; partial state from the
    /// same open attempt has been rolled back.
    #[error("subscription creation failed: {0}")]
    SubscriptionCreation(#[from] BusError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_converts() {
        let err: GatewayError = AuthError::MissingCredential.into();
        assert!(matches!(err, GatewayError::Authentication(_)));
        assert!(err.to_string().contains("authentication failed"));
    }

    #[test]
    fn bus_error_converts() {
        let err: GatewayError = BusError::SubscribeRejected {
            path: "p".into(),
            reason: "down".into(),
        }
        .into();
        assert!(matches!(err, GatewayError::SubscriptionCreation(_)));
        assert!(err.to_string().contains("subscription creation failed"));
    }
}
