//! Metric snapshot types
//!
//! One record type per metric category. Every record has a zero-valued `Default`
//! which stands in for a reading that could not be taken.

pub mod history;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// The three metric categories the engine tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricCategory {
    Delivery,
    Connection,
    Performance,
}

impl MetricCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::Delivery => "delivery",
            MetricCategory::Connection => "connection",
            MetricCategory::Performance => "performance",
        }
    }
}

impl std::fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common view over the snapshot records
///
/// `fields` lists the numeric readings that dashboards chart and compute trends for.
pub trait Snapshot: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static {
    const CATEGORY: MetricCategory;

    fn timestamp(&self) -> DateTime<Utc>;

    fn fields(&self) -> Vec<(&'static str, f64)>;

    /// Whether the reading is usable (rates within [0, 1], no NaN, no negative durations)
    fn is_plausible(&self) -> bool;
}

fn is_ratio(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySnapshot {
    pub total_sent: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub delivery_rate: f64,
    pub avg_delivery_time_ms: f64,
    pub queue_depth: u64,
    pub offline_queue_size: u64,
    pub retry_queue_size: u64,
    pub messages_per_second: f64,
    pub timestamp: DateTime<Utc>,
}

impl DeliverySnapshot {
    /// Snapshot with `delivery_rate = delivered / max(sent, 1)`, stamped now
    pub fn from_counts(total_sent: u64, total_delivered: u64, total_failed: u64) -> Self {
        let delivery_rate = (total_delivered as f64 / total_sent.max(1) as f64).clamp(0.0, 1.0);

        Self {
            total_sent,
            total_delivered,
            total_failed,
            delivery_rate,
            timestamp: Utc::now(),
            ..Self::default()
        }
    }
}

impl Snapshot for DeliverySnapshot {
    const CATEGORY: MetricCategory = MetricCategory::Delivery;

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("delivery_rate", self.delivery_rate),
            ("avg_delivery_time_ms", self.avg_delivery_time_ms),
            ("queue_depth", self.queue_depth as f64),
            ("offline_queue_size", self.offline_queue_size as f64),
            ("retry_queue_size", self.retry_queue_size as f64),
            ("messages_per_second", self.messages_per_second),
        ]
    }

    fn is_plausible(&self) -> bool {
        is_ratio(self.delivery_rate)
            && is_non_negative(self.avg_delivery_time_ms)
            && is_non_negative(self.messages_per_second)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSnapshot {
    pub total_connections: u64,
    pub active_connections: u64,
    pub failed_connections: u64,
    pub connection_success_rate: f64,
    pub avg_connection_time_ms: f64,
    pub reconnection_count: u64,
    pub namespace_distribution: BTreeMap<String, u64>,
    pub timestamp: DateTime<Utc>,
}

impl ConnectionSnapshot {
    /// Snapshot with `connection_success_rate = active / max(attempts, 1)`, stamped now
    pub fn from_counts(
        total_connections: u64,
        active_connections: u64,
        failed_connections: u64,
    ) -> Self {
        let connection_success_rate =
            (active_connections as f64 / total_connections.max(1) as f64).clamp(0.0, 1.0);

        Self {
            total_connections,
            active_connections,
            failed_connections,
            connection_success_rate,
            timestamp: Utc::now(),
            ..Self::default()
        }
    }
}

impl Snapshot for ConnectionSnapshot {
    const CATEGORY: MetricCategory = MetricCategory::Connection;

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("active_connections", self.active_connections as f64),
            ("failed_connections", self.failed_connections as f64),
            ("connection_success_rate", self.connection_success_rate),
            ("avg_connection_time_ms", self.avg_connection_time_ms),
            ("reconnection_count", self.reconnection_count as f64),
        ]
    }

    fn is_plausible(&self) -> bool {
        is_ratio(self.connection_success_rate) && is_non_negative(self.avg_connection_time_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSnapshot {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub memory_available_bytes: u64,
    pub notification_latency_ms: f64,
    pub transport_latency_ms: f64,
    pub db_response_time_ms: f64,
    pub error_rate: f64,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot for PerformanceSnapshot {
    const CATEGORY: MetricCategory = MetricCategory::Performance;

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("cpu_usage", self.cpu_usage),
            ("memory_usage", self.memory_usage),
            ("notification_latency_ms", self.notification_latency_ms),
            ("transport_latency_ms", self.transport_latency_ms),
            ("db_response_time_ms", self.db_response_time_ms),
            ("error_rate", self.error_rate),
        ]
    }

    fn is_plausible(&self) -> bool {
        is_ratio(self.cpu_usage)
            && is_ratio(self.memory_usage)
            && is_ratio(self.error_rate)
            && is_non_negative(self.notification_latency_ms)
            && is_non_negative(self.transport_latency_ms)
            && is_non_negative(self.db_response_time_ms)
    }
}
