//! Provider serving preset snapshots
//!
//! Used when no live source is configured, and to drive the engine from tests. The
//! presets can be swapped at any time; every read is stamped with the current time.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::metrics::{ConnectionSnapshot, DeliverySnapshot, PerformanceSnapshot};

use super::{ConnectionStatsProvider, DeliveryStatsProvider, PerformanceStatsProvider};

#[derive(Debug, Default)]
pub struct FixedStats {
    delivery: RwLock<DeliverySnapshot>,
    connection: RwLock<ConnectionSnapshot>,
    performance: RwLock<PerformanceSnapshot>,
}

impl FixedStats {
    pub fn new(
        delivery: DeliverySnapshot,
        connection: ConnectionSnapshot,
        performance: PerformanceSnapshot,
    ) -> Self {
        Self {
            delivery: RwLock::new(delivery),
            connection: RwLock::new(connection),
            performance: RwLock::new(performance),
        }
    }

    /// Readings well within the default thresholds
    pub fn healthy() -> Self {
        let delivery = DeliverySnapshot {
            avg_delivery_time_ms: 150.0,
            messages_per_second: 12.0,
            ..DeliverySnapshot::from_counts(1_000, 990, 10)
        };

        let connection = ConnectionSnapshot {
            avg_connection_time_ms: 35.0,
            ..ConnectionSnapshot::from_counts(100, 98, 2)
        };

        let performance = PerformanceSnapshot {
            cpu_usage: 0.25,
            memory_usage: 0.45,
            memory_available_bytes: 8 * 1024 * 1024 * 1024,
            notification_latency_ms: 20.0,
            transport_latency_ms: 5.0,
            db_response_time_ms: 3.0,
            error_rate: 0.001,
            timestamp: Utc::now(),
        };

        Self::new(delivery, connection, performance)
    }

    pub async fn set_delivery(&self, snapshot: DeliverySnapshot) {
        *self.delivery.write().await = snapshot;
    }

    pub async fn set_connection(&self, snapshot: ConnectionSnapshot) {
        *self.connection.write().await = snapshot;
    }

    pub async fn set_performance(&self, snapshot: PerformanceSnapshot) {
        *self.performance.write().await = snapshot;
    }

    /// Change only the delivery rate of the preset
    pub async fn set_delivery_rate(&self, rate: f64) {
        self.delivery.write().await.delivery_rate = rate;
    }
}

#[async_trait]
impl DeliveryStatsProvider for FixedStats {
    async fn delivery_stats(&self) -> Result<DeliverySnapshot> {
        let mut snapshot = self.delivery.read().await.clone();
        snapshot.timestamp = Utc::now();
        Ok(snapshot)
    }
}

#[async_trait]
impl ConnectionStatsProvider for FixedStats {
    async fn connection_stats(&self) -> Result<ConnectionSnapshot> {
        let mut snapshot = self.connection.read().await.clone();
        snapshot.timestamp = Utc::now();
        Ok(snapshot)
    }
}

#[async_trait]
impl PerformanceStatsProvider for FixedStats {
    async fn performance_stats(&self) -> Result<PerformanceSnapshot> {
        let mut snapshot = self.performance.read().await.clone();
        snapshot.timestamp = Utc::now();
        Ok(snapshot)
    }
}
