//! Alert lifecycle driven through monitoring ticks

use std::sync::Arc;

use pretty_assertions::assert_eq;
use pulsewatch::{
    alerts::AlertSeverity,
    collectors::fixed::FixedStats,
    config::MonitorConfig,
    health::HealthStatus,
    metrics::PerformanceSnapshot,
};

use crate::helpers::*;

#[tokio::test]
async fn test_delivery_degradation_end_to_end() {
    let (monitor, delivery) = create_healthy_monitor();
    let (seen, callback) = recording_callback();
    monitor.register_alert_callback(callback).await;

    delivery.inner.set_delivery_rate(0.9).await;
    for _ in 0..3 {
        monitor.run_tick().await.unwrap();
    }
    assert_eq!(monitor.health().await.status, HealthStatus::Healthy);
    assert!(monitor.alerts(10).await.active.is_empty());

    delivery.inner.set_delivery_rate(0.5).await;
    for _ in 0..3 {
        monitor.run_tick().await.unwrap();
    }
    let health = monitor.health().await;
    assert_eq!(health.status, HealthStatus::Critical);
    assert_eq!(health.active_alert_count, 1);

    let alerts = monitor.alerts(10).await;
    assert_eq!(alerts.active.len(), 1);
    assert_eq!(alerts.active[0].id, "delivery_rate_critical");
    assert_eq!(alerts.active[0].severity, AlertSeverity::Critical);
    assert_eq!(*seen.lock().unwrap(), vec!["delivery_rate_critical".to_string()]);

    delivery.inner.set_delivery_rate(0.95).await;
    monitor.run_tick().await.unwrap();

    let health = monitor.health().await;
    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.active_alert_count, 0);

    let alerts = monitor.alerts(10).await;
    assert!(alerts.active.is_empty());
    assert_eq!(alerts.history.len(), 1);
    assert!(alerts.history[0].resolved);
    assert!(alerts.history[0].resolved_at.is_some());
}

#[tokio::test]
async fn test_end_to_end_with_running_scheduler() {
    let delivery = Arc::new(ControlledDelivery::healthy());
    // only the first tick is scheduled, the rest are requested
    let config = MonitorConfig {
        monitoring_interval: 3_600,
        ..create_test_config()
    };
    let monitor = create_monitor(delivery.clone(), Arc::new(FixedStats::healthy()), config);
    delivery.inner.set_delivery_rate(0.9).await;

    monitor.start().await;
    monitor.tick_now().await.unwrap();
    assert_eq!(monitor.health().await.status, HealthStatus::Healthy);

    delivery.inner.set_delivery_rate(0.5).await;
    let report = monitor.tick_now().await.unwrap();
    assert_eq!(report.status, HealthStatus::Critical);
    assert_eq!(report.opened, vec!["delivery_rate_critical".to_string()]);

    // the breach persists, nothing new opens
    let report = monitor.tick_now().await.unwrap();
    assert!(report.opened.is_empty());

    delivery.inner.set_delivery_rate(0.95).await;
    monitor.tick_now().await.unwrap();
    monitor.stop().await;

    let alerts = monitor.alerts(10).await;
    assert!(alerts.active.is_empty());
    assert_eq!(alerts.history.len(), 1);
}

#[tokio::test]
async fn test_alert_metrics_refresh_while_active() {
    let (monitor, delivery) = create_healthy_monitor();

    delivery.inner.set_delivery_rate(0.4).await;
    monitor.run_tick().await.unwrap();
    delivery.inner.set_delivery_rate(0.3).await;
    monitor.run_tick().await.unwrap();

    let alerts = monitor.alerts(10).await;
    assert_eq!(alerts.history.len(), 1);
    assert_eq!(alerts.active[0].metrics["value"], serde_json::json!(0.3));
    assert_eq!(alerts.active[0].metrics["threshold"], serde_json::json!(0.7));
}

#[tokio::test]
async fn test_reading_at_threshold_resolves_critical() {
    let delivery = Arc::new(ControlledDelivery::healthy());
    let monitor = create_monitor(
        delivery.clone(),
        Arc::new(FixedStats::healthy()),
        MonitorConfig::default(),
    );

    delivery.inner.set_delivery_rate(0.4).await;
    let report = monitor.run_tick().await.unwrap();
    assert_eq!(report.opened, vec!["delivery_rate_critical".to_string()]);

    // still below 0.5, same occurrence
    delivery.inner.set_delivery_rate(0.49).await;
    let report = monitor.run_tick().await.unwrap();
    assert!(report.opened.is_empty());
    assert_eq!(report.status, HealthStatus::Critical);
    let alerts = monitor.alerts(10).await;
    assert_eq!(alerts.active.len(), 1);
    assert_eq!(alerts.history.len(), 1);

    // exactly at the critical threshold is no longer critical, only the warning tier holds
    delivery.inner.set_delivery_rate(0.5).await;
    let report = monitor.run_tick().await.unwrap();
    assert_eq!(report.status, HealthStatus::Warning);
    assert_eq!(report.opened, vec!["delivery_rate_warning".to_string()]);

    let alerts = monitor.alerts(10).await;
    assert_eq!(alerts.active.len(), 1);
    assert_eq!(alerts.active[0].id, "delivery_rate_warning");
    assert_eq!(alerts.history[1].id, "delivery_rate_critical");
    assert!(alerts.history[1].resolved);
}

#[tokio::test]
async fn test_escalation_swaps_warning_for_critical() {
    let stats = Arc::new(FixedStats::healthy());
    let delivery = Arc::new(ControlledDelivery::healthy());
    let monitor = create_monitor(delivery, stats.clone(), create_test_config());

    let performance = |memory_usage| PerformanceSnapshot {
        memory_usage,
        cpu_usage: 0.2,
        error_rate: 0.001,
        ..PerformanceSnapshot::default()
    };

    stats.set_performance(performance(0.85)).await;
    monitor.run_tick().await.unwrap();
    assert_eq!(monitor.alerts(10).await.active[0].id, "memory_usage_warning");

    stats.set_performance(performance(0.95)).await;
    monitor.run_tick().await.unwrap();
    let alerts = monitor.alerts(10).await;
    assert_eq!(alerts.active.len(), 1);
    assert_eq!(alerts.active[0].id, "memory_usage_critical");
    assert_eq!(alerts.active[0].component, "performance");

    // warning occurrence resolved, critical one open
    assert_eq!(alerts.history.len(), 2);
    assert_eq!(alerts.history[0].id, "memory_usage_critical");
    assert!(alerts.history[1].resolved);
}

#[tokio::test]
async fn test_failing_callback_does_not_block_others() {
    let (monitor, delivery) = create_healthy_monitor();

    monitor
        .register_alert_callback(|_| anyhow::bail!("pager service down"))
        .await;
    monitor
        .register_alert_callback(|_| panic!("callback bug"))
        .await;
    let (seen, callback) = recording_callback();
    monitor.register_alert_callback(callback).await;

    delivery.inner.set_delivery_rate(0.1).await;
    monitor.run_tick().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["delivery_rate_critical".to_string()]);
    assert_eq!(monitor.health().await.status, HealthStatus::Critical);
}
