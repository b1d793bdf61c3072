//! Health evaluation
//!
//! Pure mapping from the latest snapshots and the configured thresholds to a
//! [`HealthStatus`]. Rules are checked in priority order, first match wins:
//!
//! ```text
//! critical: delivery_rate           < delivery_rate_critical
//!           connection_success_rate < connection_failure_rate_critical
//!           error_rate              > error_rate_critical
//!           memory_usage            > memory_usage_critical
//! warning:  the same comparisons against the *_warning keys,
//!           plus avg_delivery_time_ms > avg_delivery_time_warning
//! healthy:  otherwise
//! ```
//!
//! A rule whose threshold key is missing is skipped. Zero-valued snapshots (what a failed
//! collector produces) trip the delivery and connection rules and therefore read as
//! critical.

use serde::{Deserialize, Serialize};

use crate::{
    config::Thresholds,
    metrics::{ConnectionSnapshot, DeliverySnapshot, PerformanceSnapshot},
};

/// Ordered by severity, `Healthy < Warning < Critical < Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    /// The monitor itself could not complete its last check
    Failed,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `value < threshold`, false when the threshold is not configured
pub(crate) fn below(value: f64, thresholds: &Thresholds, key: &str) -> bool {
    thresholds.get(key).is_some_and(|limit| value < limit)
}

/// `value > threshold`, false when the threshold is not configured
pub(crate) fn above(value: f64, thresholds: &Thresholds, key: &str) -> bool {
    thresholds.get(key).is_some_and(|limit| value > limit)
}

/// The individual critical-tier comparisons
///
/// Automatic recovery is gated on these so that recovery and health agree on what is
/// critical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CriticalConditions {
    pub delivery: bool,
    pub connection: bool,
    pub error_rate: bool,
    pub memory: bool,
}

impl CriticalConditions {
    pub fn evaluate(
        delivery: &DeliverySnapshot,
        connection: &ConnectionSnapshot,
        performance: &PerformanceSnapshot,
        thresholds: &Thresholds,
    ) -> Self {
        Self {
            delivery: below(delivery.delivery_rate, thresholds, "delivery_rate_critical"),
            connection: below(
                connection.connection_success_rate,
                thresholds,
                "connection_failure_rate_critical",
            ),
            error_rate: above(performance.error_rate, thresholds, "error_rate_critical"),
            memory: above(performance.memory_usage, thresholds, "memory_usage_critical"),
        }
    }

    pub fn any(&self) -> bool {
        self.delivery || self.connection || self.error_rate || self.memory
    }
}

fn is_warning(
    delivery: &DeliverySnapshot,
    connection: &ConnectionSnapshot,
    performance: &PerformanceSnapshot,
    thresholds: &Thresholds,
) -> bool {
    below(delivery.delivery_rate, thresholds, "delivery_rate_warning")
        || below(
            connection.connection_success_rate,
            thresholds,
            "connection_failure_rate_warning",
        )
        || above(performance.error_rate, thresholds, "error_rate_warning")
        || above(performance.memory_usage, thresholds, "memory_usage_warning")
        || above(
            delivery.avg_delivery_time_ms,
            thresholds,
            "avg_delivery_time_warning",
        )
}

/// Classify the latest snapshots
pub fn evaluate(
    delivery: &DeliverySnapshot,
    connection: &ConnectionSnapshot,
    performance: &PerformanceSnapshot,
    thresholds: &Thresholds,
) -> HealthStatus {
    if CriticalConditions::evaluate(delivery, connection, performance, thresholds).any() {
        return HealthStatus::Critical;
    }

    if is_warning(delivery, connection, performance, thresholds) {
        return HealthStatus::Warning;
    }

    HealthStatus::Healthy
}
