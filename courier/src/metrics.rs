//! Metrics declaration and recording.

use std::time::Duration;

use crate::engine::{InvocationState, PoolKey};

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    // Connection pool metrics

    /// Track number of pooled connections opened.
    pub static ref CONNECTIONS_OPENED: &'static str = {
        metrics::describe_counter!(
            "courier_connections_opened_total",
            "Total number of pooled connections opened."
        );
        "courier_connections_opened_total"
    };
    /// Track number of pooled connections closed.
    pub static ref CONNECTIONS_CLOSED: &'static str = {
        metrics::describe_counter!(
            "courier_connections_closed_total",
            "Total number of pooled connections closed."
        );
        "courier_connections_closed_total"
    };
    /// Track number of failed connection attempts.
    pub static ref CONNECTIONS_FAILED: &'static str = {
        metrics::describe_counter!(
            "courier_connections_failed_total",
            "Total number of connection attempts that failed."
        );
        "courier_connections_failed_total"
    };
    /// Gauge of invocations waiting for a connection.
    pub static ref INVOCATIONS_QUEUED: &'static str = {
        metrics::describe_gauge!(
            "courier_invocations_queued",
            "Number of invocations waiting for a pooled connection."
        );
        "courier_invocations_queued"
    };

    // Invocation metrics

    /// Track number of resolved invocations.
    pub static ref INVOCATIONS_TOTAL: &'static str = {
        metrics::describe_counter!(
            "courier_invocations_total",
            "Total number of resolved invocations."
        );
        "courier_invocations_total"
    };
    /// Histogram of invocation duration.
    pub static ref INVOCATION_DURATION: &'static str = {
        metrics::describe_histogram!(
            "courier_invocation_duration_seconds",
            metrics::Unit::Seconds,
            "Time from enqueueing an invocation to its resolution."
        );
        "courier_invocation_duration_seconds"
    };
}

/// Record a resolved invocation.
///
/// `state` is the final state (`completed` or `failed`), used as the
/// `outcome` label.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_invocation(pool: &PoolKey, state: InvocationState, duration: Duration) {
    let pool = pool.to_string();
    metrics::counter!(
        *INVOCATIONS_TOTAL,
        "pool" => pool.clone(),
        "outcome" => state.as_str()
    )
    .increment(1);
    metrics::histogram!(*INVOCATION_DURATION, "pool" => pool).record(duration.as_secs_f64());
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_invocation(_pool: &PoolKey, _state: InvocationState, _duration: Duration) {}
