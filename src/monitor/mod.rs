//! The monitoring engine
//!
//! A [`Monitor`] is built once by the composition root and shared by `Arc`. It ties the
//! collectors, metric history, alerting and recovery together and owns the background
//! [`Scheduler`] that drives them.
//!
//! ## Tick
//!
//! ```text
//! collect (no lock held)
//!   → history write lock: append, evaluate health + alert rules, commit alert changes,
//!     record last check
//!   → release, dispatch callbacks for newly opened alerts
//!   → automatic recovery for critical conditions
//! ```
//!
//! Locks are always taken in the order history → alerts → status, by ticks and queries
//! alike. Readers therefore never see a snapshot without the alert changes it caused.

pub mod query;
pub mod scheduler;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, instrument, trace, warn};

use crate::alerts::rules::{self, Readings};
use crate::alerts::{Alert, AlertChange, AlertManager, AlertSeverity};
use crate::collectors::Collectors;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::health::{self, CriticalConditions, HealthStatus};
use crate::metrics::history::MetricHistory;
use crate::recovery::{ActionStats, RecoveryAction, RecoveryEngine, RecoveryOutcome, Remediator};
use crate::util::panic_message;

pub use scheduler::Scheduler;

/// Raised when a tick aborts, resolved by the next tick that completes
pub const TICK_FAILED_ALERT: &str = "monitor_tick_failed";

/// Bookkeeping about the ticks themselves
#[derive(Debug, Clone, Default)]
pub(crate) struct TickStatus {
    pub(crate) last_check: Option<DateTime<Utc>>,
    pub(crate) last_failure: Option<TickFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickFailure {
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// What a completed tick did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub status: HealthStatus,
    /// Ids of the alerts this tick opened
    pub opened: Vec<String>,
    /// Categories whose collector failed and were recorded as zero snapshots
    pub fallbacks: Vec<&'static str>,
    pub recovery: Vec<RecoveryOutcome>,
    pub checked_at: DateTime<Utc>,
}

/// State shared between the scheduler worker and the query side
pub(crate) struct Engine {
    pub(crate) config: MonitorConfig,
    collectors: Collectors,
    pub(crate) history: Arc<RwLock<MetricHistory>>,
    pub(crate) alerts: AlertManager,
    pub(crate) status: RwLock<TickStatus>,
    pub(crate) recovery: RecoveryEngine,
    /// Serializes ticks from the worker and from `run_tick`
    tick_lock: Mutex<()>,
}

impl Engine {
    fn new(
        config: MonitorConfig,
        collectors: Collectors,
        remediator: Option<Arc<dyn Remediator>>,
    ) -> Self {
        let history = Arc::new(RwLock::new(MetricHistory::new(config.history_capacity)));
        let recovery =
            RecoveryEngine::with_defaults(history.clone(), remediator, config.recovery_timeout());

        Self {
            alerts: AlertManager::new(config.alert_history_capacity),
            status: RwLock::new(TickStatus::default()),
            tick_lock: Mutex::new(()),
            config,
            collectors,
            history,
            recovery,
        }
    }

    /// Run one tick, turning a panic anywhere inside it into a recorded failure
    pub(crate) async fn tick(&self) -> MonitorResult<TickReport> {
        let _serial = self.tick_lock.lock().await;

        match AssertUnwindSafe(self.collect_and_evaluate()).catch_unwind().await {
            Ok(report) => Ok(report),
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!("monitoring tick aborted: {reason}");
                self.record_failure(&reason).await;
                Err(MonitorError::TickFailed(reason))
            }
        }
    }

    #[instrument(skip(self))]
    async fn collect_and_evaluate(&self) -> TickReport {
        let collected = self.collectors.collect().await;
        let thresholds = &self.config.thresholds;

        let (mut report, opened, conditions) = {
            let mut history = self.history.write().await;
            history.append(collected.delivery.clone());
            history.append(collected.connection.clone());
            history.append(collected.performance.clone());

            let status = health::evaluate(
                &collected.delivery,
                &collected.connection,
                &collected.performance,
                thresholds,
            );
            let conditions = CriticalConditions::evaluate(
                &collected.delivery,
                &collected.connection,
                &collected.performance,
                thresholds,
            );

            let readings = Readings {
                delivery: &collected.delivery,
                connection: &collected.connection,
                performance: &collected.performance,
            };
            let mut changes = rules::evaluate(&readings, thresholds);
            changes.push(AlertChange::Resolve(TICK_FAILED_ALERT.to_string()));

            let opened = self.alerts.apply(changes).await;

            let checked_at = Utc::now();
            let mut tick_status = self.status.write().await;
            tick_status.last_check = Some(checked_at);
            tick_status.last_failure = None;

            let report = TickReport {
                status,
                opened: opened.iter().map(|alert| alert.id.clone()).collect(),
                fallbacks: collected.failures,
                recovery: Vec::new(),
                checked_at,
            };

            (report, opened, conditions)
        };

        trace!("tick committed with status {}", report.status);
        self.alerts.dispatch(&opened).await;

        if self.config.auto_recovery && conditions.any() {
            report.recovery = self.recovery.run_automatic(&conditions).await;
            for outcome in report.recovery.iter().filter(|outcome| !outcome.success) {
                warn!("automatic recovery {} did not succeed", outcome.action);
            }
        }

        report
    }

    async fn record_failure(&self, reason: &str) {
        let alert = Alert::new(TICK_FAILED_ALERT, AlertSeverity::Emergency, "Monitoring tick failed")
            .message(format!("the monitoring tick aborted: {reason}"))
            .component("monitor")
            .metric("reason", reason);
        self.alerts.raise(alert).await;

        self.status.write().await.last_failure = Some(TickFailure {
            reason: reason.to_string(),
            at: Utc::now(),
        });
    }
}

/// Metrics collection, alerting and recovery for one monitored system
pub struct Monitor {
    engine: Arc<Engine>,
    scheduler: Scheduler,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("interval", &self.engine.config.interval())
            .finish_non_exhaustive()
    }
}

impl Monitor {
    pub fn new(config: MonitorConfig, collectors: Collectors) -> MonitorResult<Self> {
        Self::with_remediator(config, collectors, None)
    }

    /// Monitor whose built-in recovery actions hand off to `remediator`
    pub fn with_remediator(
        config: MonitorConfig,
        collectors: Collectors,
        remediator: Option<Arc<dyn Remediator>>,
    ) -> MonitorResult<Self> {
        config.validate()?;

        let interval = config.interval();
        let engine = Arc::new(Engine::new(config, collectors, remediator));
        let scheduler = Scheduler::new(engine.clone(), interval);

        debug!("monitor created with a {interval:?} interval");
        Ok(Self { engine, scheduler })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.engine.config
    }

    /// Start the background scheduler, returns `false` if it was already running
    pub async fn start(&self) -> bool {
        self.scheduler.start().await
    }

    /// Stop the background scheduler, returns `false` if it was not running
    pub async fn stop(&self) -> bool {
        self.scheduler.stop().await
    }

    pub async fn is_running(&self) -> bool {
        self.scheduler.is_running().await
    }

    /// Have the running scheduler tick right away and wait for the result
    pub async fn tick_now(&self) -> MonitorResult<TickReport> {
        self.scheduler.tick_now().await
    }

    /// Tick on the caller's task, whether or not the scheduler is running
    pub async fn run_tick(&self) -> MonitorResult<TickReport> {
        self.engine.tick().await
    }

    pub async fn register_alert_callback<F>(&self, callback: F)
    where
        F: Fn(&Alert) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.engine.alerts.register_callback(callback).await;
    }

    /// Run a recovery action by name; `false` for unknown actions and failed runs
    pub async fn trigger_recovery(&self, name: &str) -> bool {
        self.engine.recovery.trigger(name).await
    }

    /// Run a recovery action by name and return its outcome
    pub async fn recover(&self, name: &str) -> MonitorResult<RecoveryOutcome> {
        self.engine
            .recovery
            .trigger_outcome(name)
            .await
            .ok_or_else(|| MonitorError::UnknownAction(name.to_string()))
    }

    pub async fn register_recovery_action(&self, action: Arc<dyn RecoveryAction>) {
        self.engine.recovery.register(action).await;
    }

    pub async fn recovery_actions(&self) -> Vec<String> {
        self.engine.recovery.action_names().await
    }

    pub async fn recovery_stats(&self) -> std::collections::BTreeMap<String, ActionStats> {
        self.engine.recovery.stats().await
    }
}
