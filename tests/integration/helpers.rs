//! Helper functions for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pulsewatch::{
    Monitor,
    alerts::Alert,
    collectors::{Collectors, DeliveryStatsProvider, fixed::FixedStats},
    config::{MonitorConfig, Thresholds},
    metrics::DeliverySnapshot,
};

/// Delivery provider that counts its calls and can be made to fail, panic or stall
#[derive(Default)]
pub struct ControlledDelivery {
    pub inner: FixedStats,
    pub calls: AtomicUsize,
    pub failing: AtomicBool,
    pub panicking: AtomicBool,
    pub stall_ms: AtomicUsize,
}

impl ControlledDelivery {
    pub fn healthy() -> Self {
        Self {
            inner: FixedStats::healthy(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryStatsProvider for ControlledDelivery {
    async fn delivery_stats(&self) -> anyhow::Result<DeliverySnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let stall_ms = self.stall_ms.load(Ordering::SeqCst);
        if stall_ms > 0 {
            tokio::time::sleep(Duration::from_millis(stall_ms as u64)).await;
        }

        if self.panicking.load(Ordering::SeqCst) {
            panic!("delivery counters corrupted");
        }

        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("notification manager unavailable");
        }

        self.inner.delivery_stats().await
    }
}

/// Config ticking once per second with a raised delivery critical threshold
pub fn create_test_config() -> MonitorConfig {
    MonitorConfig {
        monitoring_interval: 1,
        thresholds: Thresholds::default().with("delivery_rate_critical", 0.7),
        ..MonitorConfig::default()
    }
}

pub fn create_monitor(
    delivery: Arc<ControlledDelivery>,
    stats: Arc<FixedStats>,
    config: MonitorConfig,
) -> Arc<Monitor> {
    let collectors = Collectors::new(delivery, stats.clone(), stats);
    Arc::new(Monitor::new(config, collectors).unwrap())
}

/// Monitor over healthy fixed readings, with a handle on the delivery provider
pub fn create_healthy_monitor() -> (Arc<Monitor>, Arc<ControlledDelivery>) {
    let delivery = Arc::new(ControlledDelivery::healthy());
    let monitor = create_monitor(
        delivery.clone(),
        Arc::new(FixedStats::healthy()),
        create_test_config(),
    );
    (monitor, delivery)
}

/// Callback recording the ids of the alerts it was invoked for
pub fn recording_callback() -> (
    Arc<std::sync::Mutex<Vec<String>>>,
    impl Fn(&Alert) -> anyhow::Result<()> + Send + Sync + 'static,
) {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback = move |alert: &Alert| -> anyhow::Result<()> {
        sink.lock().unwrap().push(alert.id.clone());
        Ok(())
    };
    (seen, callback)
}

pub fn create_mock_stats_json(delivery_rate: f64) -> serde_json::Value {
    serde_json::json!({
        "total_sent": 1000,
        "total_delivered": (delivery_rate * 1000.0) as u64,
        "total_failed": 1000 - (delivery_rate * 1000.0) as u64,
        "delivery_rate": delivery_rate,
        "avg_delivery_time_ms": 180.0,
        "queue_depth": 12,
        "offline_queue_size": 3,
        "retry_queue_size": 1,
        "messages_per_second": 25.0
    })
}
