//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics`
/// endpoint. Must be called once at server startup before any metrics
/// are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

// Metric name constants to avoid typos across crates.

/// Channels opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Channels closed total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Currently open channels (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Rejected upgrades total (counter, labels: reason).
pub const WS_REJECTED_TOTAL: &str = "ws_rejected_total";
/// Fan-out drops total (counter).
pub const WS_DELIVERY_DROPS_TOTAL: &str = "ws_delivery_drops_total";
/// Channel lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Users with a live identity scope (gauge).
pub const IDENTITY_SCOPES_ACTIVE: &str = "identity_scopes_active";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // Build a recorder + handle (no global install to avoid test conflicts).
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_REJECTED_TOTAL,
            WS_DELIVERY_DROPS_TOTAL,
            WS_CONNECTION_DURATION_SECONDS,
            IDENTITY_SCOPES_ACTIVE,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
