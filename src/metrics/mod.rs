use crate::circuit_breaker::{BreakerMetrics, BreakerState, StateChangeListener};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use tracing::debug;

pub const STATE_GAUGE: &str = "circuit_breaker_state";
pub const TRANSITIONS_COUNTER: &str = "circuit_breaker_transitions_total";
pub const CONSECUTIVE_FAILURES_GAUGE: &str = "circuit_breaker_consecutive_failures";
pub const ERROR_RATE_GAUGE: &str = "circuit_breaker_error_rate";

/// Register all breaker metrics with descriptions
pub fn describe_metrics() {
    describe_gauge!(
        STATE_GAUGE,
        "Circuit breaker state (0 = closed, 1 = open, 2 = half-open)"
    );
    describe_counter!(
        TRANSITIONS_COUNTER,
        "Total number of circuit breaker state transitions"
    );
    describe_gauge!(
        CONSECUTIVE_FAILURES_GAUGE,
        "Consecutive failures recorded while closed"
    );
    describe_gauge!(
        ERROR_RATE_GAUGE,
        "Error rate over the rolling window (0 below the minimum sample count)"
    );

    debug!("Breaker metrics registered with descriptions");
}

/// Record circuit breaker state
pub fn record_state(breaker: &str, state: BreakerState) {
    let labels = [("breaker", breaker.to_string())];
    gauge!(STATE_GAUGE, &labels).set(state.as_gauge());
}

/// Record circuit breaker transition
pub fn record_transition(breaker: &str, from: BreakerState, to: BreakerState) {
    let labels = [
        ("breaker", breaker.to_string()),
        ("from", from.to_string()),
        ("to", to.to_string()),
    ];
    counter!(TRANSITIONS_COUNTER, &labels).increment(1);
}

/// Publish the gauges carried by a snapshot
pub fn record_snapshot(snapshot: &BreakerMetrics) {
    let labels = [("breaker", snapshot.name.clone())];
    gauge!(STATE_GAUGE, &labels).set(snapshot.state.as_gauge());
    gauge!(CONSECUTIVE_FAILURES_GAUGE, &labels).set(snapshot.consecutive_failures as f64);
    gauge!(ERROR_RATE_GAUGE, &labels).set(snapshot.error_rate);
}

/// Listener that mirrors every transition into the installed metrics recorder
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsListener;

impl StateChangeListener for MetricsListener {
    fn on_state_change(
        &self,
        name: &str,
        from: BreakerState,
        to: BreakerState,
    ) -> anyhow::Result<()> {
        record_transition(name, from, to);
        record_state(name, to);
        Ok(())
    }
}
