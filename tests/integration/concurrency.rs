//! Concurrency and race condition tests
//!
//! These tests verify thread-safety of concurrent operation:
//! - Racing start/stop callers
//! - Queries running while ticks commit
//! - Manual recovery alongside the scheduler

use std::time::Duration;

use pulsewatch::health::HealthStatus;

use crate::helpers::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_start_stop_leaves_consistent_state() {
    let (monitor, delivery) = create_healthy_monitor();

    let mut tasks = vec![];
    for i in 0..20 {
        let monitor = monitor.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                monitor.start().await;
            } else {
                monitor.stop().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    monitor.stop().await;
    assert!(!monitor.is_running().await);

    // no orphaned worker keeps ticking
    let calls = delivery.calls();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(delivery.calls(), calls);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_spawn_single_worker() {
    let (monitor, delivery) = create_healthy_monitor();

    let starts: Vec<_> = (0..10)
        .map(|_| {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.start().await })
        })
        .collect();

    let mut started = 0;
    for task in starts {
        if task.await.unwrap() {
            started += 1;
        }
    }
    assert_eq!(started, 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(delivery.calls(), 1);

    monitor.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queries_see_committed_ticks() {
    let (monitor, delivery) = create_healthy_monitor();
    monitor.run_tick().await.unwrap();

    let writer = {
        let monitor = monitor.clone();
        let delivery = delivery.clone();
        tokio::spawn(async move {
            for i in 0..30 {
                let rate = if i % 2 == 0 { 0.2 } else { 0.99 };
                delivery.inner.set_delivery_rate(rate).await;
                monitor.run_tick().await.unwrap();
            }
        })
    };

    let mut readers = vec![];
    for _ in 0..4 {
        let monitor = monitor.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..50 {
                // status and alert count come from the same committed tick
                let health = monitor.health().await;
                match health.status {
                    HealthStatus::Critical => assert_eq!(health.active_alert_count, 1),
                    HealthStatus::Healthy => assert_eq!(health.active_alert_count, 0),
                    other => panic!("unexpected status {other}"),
                }

                let dashboard = monitor.delivery_dashboard().await;
                assert!(dashboard.time_series.len() <= monitor.config().dashboard_points);
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    assert_eq!(monitor.delivery_dashboard().await.time_series.len(), 31);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_manual_recovery_during_ticks() {
    let (monitor, delivery) = create_healthy_monitor();
    delivery.inner.set_delivery_rate(0.1).await;
    monitor.start().await;

    let triggers: Vec<_> = (0..8)
        .map(|_| {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.trigger_recovery("memory_pressure").await })
        })
        .collect();

    for _ in 0..3 {
        monitor.tick_now().await.unwrap();
    }
    for task in triggers {
        assert!(task.await.unwrap());
    }

    monitor.stop().await;

    let stats = monitor.recovery_stats().await;
    assert_eq!(stats["memory_pressure"].attempts, 8);
    assert!(stats["delivery_failure"].attempts >= 3);
}
