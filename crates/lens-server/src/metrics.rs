//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before any metric is recorded; a second install fails.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants shared by the gateway, hub, and sweeps.

/// RPC requests total (counter, labels: method).
pub const RPC_REQUESTS_TOTAL: &str = "rpc_requests_total";
/// RPC errors total (counter, labels: method, error_type).
pub const RPC_ERRORS_TOTAL: &str = "rpc_errors_total";
/// RPC request duration seconds (histogram, labels: method).
pub const RPC_REQUEST_DURATION_SECONDS: &str = "rpc_request_duration_seconds";
/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Frames dropped from full outbound queues (counter).
pub const HUB_DROPS_TOTAL: &str = "hub_drops_total";
/// `resync_required` markers raised (counter, labels: reason).
pub const HUB_RESYNCS_TOTAL: &str = "hub_resyncs_total";
/// Store events fanned out by the hub (counter, labels: type).
pub const HUB_EVENTS_TOTAL: &str = "hub_events_total";
/// Accepted store changes (counter).
pub const STORE_CHANGES_TOTAL: &str = "store_changes_total";
/// Registered stores (gauge).
pub const STORES_ACTIVE: &str = "stores_active";
/// Live sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Sessions ended by expiry (counter).
pub const SESSIONS_EXPIRED_TOTAL: &str = "sessions_expired_total";
/// Law evaluations (counter, labels: source).
pub const LAW_EVALUATIONS_TOTAL: &str = "law_evaluations_total";
/// Compliance sweep duration seconds (histogram).
pub const COMPLIANCE_SWEEP_DURATION_SECONDS: &str = "compliance_sweep_duration_seconds";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // No global install, so parallel tests cannot conflict.
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            RPC_REQUESTS_TOTAL,
            RPC_ERRORS_TOTAL,
            RPC_REQUEST_DURATION_SECONDS,
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            HUB_DROPS_TOTAL,
            HUB_RESYNCS_TOTAL,
            HUB_EVENTS_TOTAL,
            STORE_CHANGES_TOTAL,
            STORES_ACTIVE,
            SESSIONS_ACTIVE,
            SESSIONS_EXPIRED_TOTAL,
            LAW_EVALUATIONS_TOTAL,
            COMPLIANCE_SWEEP_DURATION_SECONDS,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
