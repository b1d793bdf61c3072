//! Start/stop lifecycle of the background scheduler

use std::time::Duration;

use assert_matches::assert_matches;
use pulsewatch::MonitorError;

use crate::helpers::*;

#[tokio::test]
async fn test_scheduler_ticks_on_interval() {
    let (monitor, delivery) = create_healthy_monitor();

    assert!(monitor.start().await);
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(monitor.stop().await);

    // ticks at 0s, 1s and 2s
    let calls = delivery.calls();
    assert!((2..=4).contains(&calls), "unexpected tick count {calls}");
}

#[tokio::test]
async fn test_start_twice_spawns_one_worker() {
    let (monitor, delivery) = create_healthy_monitor();

    assert!(monitor.start().await);
    assert!(!monitor.start().await);
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    // a second worker would have doubled the calls
    let calls = delivery.calls();
    assert!((1..=2).contains(&calls), "unexpected tick count {calls}");

    monitor.stop().await;
}

#[tokio::test]
async fn test_stop_halts_ticking() {
    let (monitor, delivery) = create_healthy_monitor();

    monitor.start().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(monitor.stop().await);
    assert!(!monitor.is_running().await);

    let calls = delivery.calls();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(delivery.calls(), calls);

    // stopping again changes nothing
    assert!(!monitor.stop().await);
}

#[tokio::test]
async fn test_restart_after_stop() {
    let (monitor, delivery) = create_healthy_monitor();

    monitor.start().await;
    monitor.stop().await;
    let calls = delivery.calls();

    assert!(monitor.start().await);
    monitor.tick_now().await.unwrap();
    assert!(delivery.calls() > calls);

    monitor.stop().await;
}

#[tokio::test]
async fn test_tick_now_requires_running_scheduler() {
    let (monitor, _delivery) = create_healthy_monitor();

    assert_matches!(monitor.tick_now().await, Err(MonitorError::SchedulerStopped));

    // run_tick works regardless
    monitor.run_tick().await.unwrap();
    assert!(monitor.health().await.last_check.is_some());
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_tick() {
    let (monitor, delivery) = create_healthy_monitor();
    delivery.stall_ms.store(1_000, std::sync::atomic::Ordering::SeqCst);

    monitor.start().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = std::time::Instant::now();
    assert!(monitor.stop().await);
    let elapsed = started.elapsed();

    // the stalled tick finishes, then the worker exits well before the abort deadline
    assert!(elapsed < Duration::from_secs(5), "stop took {elapsed:?}");
    assert!(monitor.health().await.last_check.is_some());
}
