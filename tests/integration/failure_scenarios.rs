//! Failure and chaos tests for the monitoring engine
//!
//! These tests verify that the engine handles failures gracefully:
//! - Collectors that error
//! - Collectors that panic mid-tick
//! - Recovery actions that fail
//! - Implausible readings

use std::sync::Arc;
use std::sync::atomic::Ordering;

use assert_matches::assert_matches;
use async_trait::async_trait;
use pulsewatch::{
    Monitor, MonitorError,
    collectors::{
        Collectors, ConnectionStatsProvider, DeliveryStatsProvider, PerformanceStatsProvider,
        fixed::FixedStats,
    },
    config::MonitorConfig,
    health::HealthStatus,
    metrics::{ConnectionSnapshot, DeliverySnapshot, PerformanceSnapshot},
    monitor::TICK_FAILED_ALERT,
    recovery::{DELIVERY_FAILURE, RecoveryAction, Remediator},
};

use crate::helpers::*;

struct Unavailable;

#[async_trait]
impl DeliveryStatsProvider for Unavailable {
    async fn delivery_stats(&self) -> anyhow::Result<DeliverySnapshot> {
        anyhow::bail!("notification manager unavailable")
    }
}

#[async_trait]
impl ConnectionStatsProvider for Unavailable {
    async fn connection_stats(&self) -> anyhow::Result<ConnectionSnapshot> {
        anyhow::bail!("websocket layer unavailable")
    }
}

#[async_trait]
impl PerformanceStatsProvider for Unavailable {
    async fn performance_stats(&self) -> anyhow::Result<PerformanceSnapshot> {
        anyhow::bail!("database unavailable")
    }
}

struct BrokenRemediator;

#[async_trait]
impl Remediator for BrokenRemediator {
    async fn remediate(&self, condition: &str) -> anyhow::Result<()> {
        anyhow::bail!("cannot remediate {condition}")
    }
}

struct PanickingAction;

#[async_trait]
impl RecoveryAction for PanickingAction {
    fn name(&self) -> &str {
        DELIVERY_FAILURE
    }

    async fn run(&self) -> anyhow::Result<()> {
        panic!("remediation bug")
    }
}

#[tokio::test]
async fn test_all_collectors_failing_reads_critical() {
    let unavailable = Arc::new(Unavailable);
    let collectors = Collectors::new(unavailable.clone(), unavailable.clone(), unavailable);
    let monitor = Monitor::new(MonitorConfig::default(), collectors).unwrap();

    let report = monitor.run_tick().await.unwrap();
    assert_eq!(report.status, HealthStatus::Critical);
    assert_eq!(report.fallbacks, vec!["delivery", "connection", "performance"]);

    let mut opened = report.opened.clone();
    opened.sort();
    assert_eq!(
        opened,
        vec![
            "connection_failure_rate_critical".to_string(),
            "delivery_rate_critical".to_string()
        ]
    );

    // zero snapshots are recorded, queries keep working
    let dashboard = monitor.delivery_dashboard().await;
    assert_eq!(dashboard.time_series.len(), 1);
    assert_eq!(dashboard.current.delivery_rate, 0.0);
}

#[tokio::test]
async fn test_erroring_collector_is_isolated() {
    let (monitor, delivery) = create_healthy_monitor();
    delivery.failing.store(true, Ordering::SeqCst);

    let report = monitor.run_tick().await.unwrap();
    assert_eq!(report.fallbacks, vec!["delivery"]);
    assert_eq!(report.status, HealthStatus::Critical);

    // the other categories carry real readings
    let performance = monitor.performance_dashboard().await;
    assert_eq!(performance.current.memory_usage, 0.45);
}

#[tokio::test]
async fn test_panicking_collector_marks_monitor_failed() {
    let (monitor, delivery) = create_healthy_monitor();
    monitor.start().await;
    monitor.tick_now().await.unwrap();

    delivery.panicking.store(true, Ordering::SeqCst);
    assert_matches!(monitor.tick_now().await, Err(MonitorError::TickFailed(_)));

    let health = monitor.health().await;
    assert_eq!(health.status, HealthStatus::Failed);
    let alerts = monitor.alerts(10).await;
    assert_eq!(alerts.active.len(), 1);
    assert_eq!(alerts.active[0].id, TICK_FAILED_ALERT);
    assert_eq!(alerts.active[0].component, "monitor");

    // the worker survives the panic
    assert!(monitor.is_running().await);

    delivery.panicking.store(false, Ordering::SeqCst);
    monitor.tick_now().await.unwrap();
    assert_eq!(monitor.health().await.status, HealthStatus::Healthy);
    assert!(monitor.alerts(10).await.active.is_empty());

    monitor.stop().await;
}

#[tokio::test]
async fn test_failing_recovery_does_not_abort_tick() {
    let stats = Arc::new(FixedStats::healthy());
    stats.set_delivery_rate(0.1).await;
    let collectors = Collectors::new(stats.clone(), stats.clone(), stats);
    let monitor = Monitor::with_remediator(
        MonitorConfig::default(),
        collectors,
        Some(Arc::new(BrokenRemediator)),
    )
    .unwrap();

    let report = monitor.run_tick().await.unwrap();
    assert_eq!(report.recovery.len(), 1);
    assert!(!report.recovery[0].success);

    // attempted again while the condition holds
    monitor.run_tick().await.unwrap();
    let stats = monitor.recovery_stats().await;
    assert_eq!(stats["delivery_failure"].attempts, 2);
    assert_eq!(stats["delivery_failure"].successes, 0);

    assert!(!monitor.trigger_recovery("delivery_failure").await);
}

#[tokio::test]
async fn test_implausible_reading_is_replaced() {
    let (monitor, delivery) = create_healthy_monitor();
    delivery.inner.set_delivery_rate(1.7).await;

    let report = monitor.run_tick().await.unwrap();
    assert_eq!(report.fallbacks, vec!["delivery"]);
    assert_eq!(monitor.delivery_dashboard().await.current.delivery_rate, 0.0);
}

#[tokio::test]
async fn test_panicking_recovery_does_not_fail_tick() {
    let (monitor, delivery) = create_healthy_monitor();
    let (seen, callback) = recording_callback();
    monitor.register_alert_callback(callback).await;
    monitor.register_recovery_action(Arc::new(PanickingAction)).await;
    delivery.inner.set_delivery_rate(0.2).await;

    for _ in 0..3 {
        let report = monitor.run_tick().await.unwrap();
        assert_eq!(report.status, HealthStatus::Critical);
        assert_eq!(report.recovery.len(), 1);
        assert!(!report.recovery[0].success);
    }

    // one ongoing breach, one alert occurrence, one notification
    assert_eq!(monitor.health().await.status, HealthStatus::Critical);
    let alerts = monitor.alerts(10).await;
    assert_eq!(alerts.history.len(), 1);
    assert_eq!(alerts.history[0].id, "delivery_rate_critical");
    assert_eq!(*seen.lock().unwrap(), vec!["delivery_rate_critical".to_string()]);

    assert!(!monitor.trigger_recovery(DELIVERY_FAILURE).await);
    assert_eq!(monitor.recovery_stats().await[DELIVERY_FAILURE].attempts, 4);
}
