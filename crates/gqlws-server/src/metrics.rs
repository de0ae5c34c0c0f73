//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::ServerError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint. Fails if a
/// global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Rejected handshakes (counter, labels: reason).
pub const WS_NEGOTIATION_FAILURES_TOTAL: &str = "ws_negotiation_failures_total";
/// Outbound frames dropped on a full send queue (counter).
pub const WS_SEND_DROPS_TOTAL: &str = "ws_send_drops_total";
/// Connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Operations started without errors (counter).
pub const SUBSCRIPTIONS_STARTED_TOTAL: &str = "subscriptions_started_total";
/// Operations whose start reported errors (counter).
pub const SUBSCRIPTIONS_REJECTED_TOTAL: &str = "subscriptions_rejected_total";
/// Stop requests (counter).
pub const SUBSCRIPTIONS_STOPPED_TOTAL: &str = "subscriptions_stopped_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // Build a recorder + handle (no global install to avoid test conflicts).
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_NEGOTIATION_FAILURES_TOTAL,
            WS_SEND_DROPS_TOTAL,
            WS_CONNECTION_DURATION_SECONDS,
            SUBSCRIPTIONS_STARTED_TOTAL,
            SUBSCRIPTIONS_REJECTED_TOTAL,
            SUBSCRIPTIONS_STOPPED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name {name} is not snake_case"
            );
        }
    }
}
