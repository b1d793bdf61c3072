//! Threshold rules that open and resolve alerts
//!
//! Every monitored quantity has up to two tiers, `<prefix>_critical` and `<prefix>_warning`.
//! The alert id equals the threshold key that was breached. Per tick and quantity:
//!
//! - critical tier breached → raise `<prefix>_critical`, resolve `<prefix>_warning`
//! - only warning tier breached → raise `<prefix>_warning`, resolve `<prefix>_critical`
//! - neither → resolve both

use std::collections::BTreeMap;

use crate::{
    config::Thresholds,
    health::{above, below},
    metrics::{ConnectionSnapshot, DeliverySnapshot, PerformanceSnapshot, Snapshot},
};

use super::{Alert, AlertChange, AlertSeverity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Breach {
    /// Alert when the value drops under the threshold
    Below,
    /// Alert when the value rises over the threshold
    Above,
}

/// The latest reading of every category, as seen by one tick
#[derive(Debug, Clone, Copy)]
pub struct Readings<'a> {
    pub delivery: &'a DeliverySnapshot,
    pub connection: &'a ConnectionSnapshot,
    pub performance: &'a PerformanceSnapshot,
}

#[derive(Debug, Clone, Copy)]
enum Quantity {
    DeliveryRate,
    ConnectionSuccessRate,
    ErrorRate,
    MemoryUsage,
    CpuUsage,
    AvgDeliveryTime,
    QueueDepth,
    DbResponseTime,
}

impl Quantity {
    fn read(&self, readings: &Readings<'_>) -> f64 {
        match self {
            Quantity::DeliveryRate => readings.delivery.delivery_rate,
            Quantity::ConnectionSuccessRate => readings.connection.connection_success_rate,
            Quantity::ErrorRate => readings.performance.error_rate,
            Quantity::MemoryUsage => readings.performance.memory_usage,
            Quantity::CpuUsage => readings.performance.cpu_usage,
            Quantity::AvgDeliveryTime => readings.delivery.avg_delivery_time_ms,
            Quantity::QueueDepth => readings.delivery.queue_depth as f64,
            Quantity::DbResponseTime => readings.performance.db_response_time_ms,
        }
    }

    fn component(&self) -> &'static str {
        match self {
            Quantity::DeliveryRate | Quantity::AvgDeliveryTime | Quantity::QueueDepth => {
                "delivery"
            }
            Quantity::ConnectionSuccessRate => "connection",
            Quantity::ErrorRate
            | Quantity::MemoryUsage
            | Quantity::CpuUsage
            | Quantity::DbResponseTime => "performance",
        }
    }
}

struct QuantityRule {
    prefix: &'static str,
    title: &'static str,
    label: &'static str,
    breach: Breach,
    quantity: Quantity,
}

const RULES: &[QuantityRule] = &[
    QuantityRule {
        prefix: "delivery_rate",
        title: "Low delivery rate",
        label: "delivery rate",
        breach: Breach::Below,
        quantity: Quantity::DeliveryRate,
    },
    QuantityRule {
        prefix: "connection_failure_rate",
        title: "Connection failures",
        label: "connection success rate",
        breach: Breach::Below,
        quantity: Quantity::ConnectionSuccessRate,
    },
    QuantityRule {
        prefix: "error_rate",
        title: "High error rate",
        label: "error rate",
        breach: Breach::Above,
        quantity: Quantity::ErrorRate,
    },
    QuantityRule {
        prefix: "memory_usage",
        title: "Memory pressure",
        label: "memory usage",
        breach: Breach::Above,
        quantity: Quantity::MemoryUsage,
    },
    QuantityRule {
        prefix: "cpu_usage",
        title: "High CPU usage",
        label: "CPU usage",
        breach: Breach::Above,
        quantity: Quantity::CpuUsage,
    },
    QuantityRule {
        prefix: "avg_delivery_time",
        title: "Slow delivery",
        label: "average delivery time (ms)",
        breach: Breach::Above,
        quantity: Quantity::AvgDeliveryTime,
    },
    QuantityRule {
        prefix: "queue_depth",
        title: "Delivery queue backlog",
        label: "queue depth",
        breach: Breach::Above,
        quantity: Quantity::QueueDepth,
    },
    QuantityRule {
        prefix: "db_response_time",
        title: "Slow downstream dependency",
        label: "database response time (ms)",
        breach: Breach::Above,
        quantity: Quantity::DbResponseTime,
    },
];

impl QuantityRule {
    fn breached(&self, value: f64, thresholds: &Thresholds, key: &str) -> bool {
        match self.breach {
            Breach::Below => below(value, thresholds, key),
            Breach::Above => above(value, thresholds, key),
        }
    }

    fn alert(
        &self,
        key: String,
        severity: AlertSeverity,
        value: f64,
        limit: f64,
        component: &str,
        readings: &Readings<'_>,
    ) -> Alert {
        let comparison = match self.breach {
            Breach::Below => "below",
            Breach::Above => "above",
        };

        Alert::new(key, severity, self.title)
            .message(format!(
                "{} is {value:.3}, {comparison} the {severity} threshold of {limit}",
                self.label
            ))
            .component(component)
            .metrics(component_metrics(component, readings))
            .metric("value", value)
            .metric("threshold", limit)
    }
}

fn snapshot_metrics<S: Snapshot>(snapshot: &S) -> BTreeMap<String, serde_json::Value> {
    snapshot
        .fields()
        .into_iter()
        .map(|(name, value)| (name.to_string(), serde_json::Value::from(value)))
        .collect()
}

fn component_metrics(
    component: &str,
    readings: &Readings<'_>,
) -> BTreeMap<String, serde_json::Value> {
    match component {
        "delivery" => snapshot_metrics(readings.delivery),
        "connection" => snapshot_metrics(readings.connection),
        _ => snapshot_metrics(readings.performance),
    }
}

/// Alert changes implied by one set of readings
pub fn evaluate(readings: &Readings<'_>, thresholds: &Thresholds) -> Vec<AlertChange> {
    let mut changes = Vec::with_capacity(RULES.len() * 2);

    for rule in RULES {
        let value = rule.quantity.read(readings);
        let component = rule.quantity.component();
        let critical_key = format!("{}_critical", rule.prefix);
        let warning_key = format!("{}_warning", rule.prefix);

        let tier = if rule.breached(value, thresholds, &critical_key) {
            Some((AlertSeverity::Critical, critical_key.clone(), warning_key.clone()))
        } else if rule.breached(value, thresholds, &warning_key) {
            Some((AlertSeverity::Warning, warning_key.clone(), critical_key.clone()))
        } else {
            None
        };

        match tier {
            Some((severity, breached, other)) => {
                // breached() only returns true for configured keys
                let limit = thresholds.get(&breached).unwrap_or_default();
                changes.push(AlertChange::Resolve(other));
                changes.push(AlertChange::Raise(rule.alert(
                    breached, severity, value, limit, component, readings,
                )));
            }
            None => {
                changes.push(AlertChange::Resolve(critical_key));
                changes.push(AlertChange::Resolve(warning_key));
            }
        }
    }

    changes
}
