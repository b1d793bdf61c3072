//! Recovery actions
//!
//! A fixed set of named, idempotent remediation routines, invoked manually by name or
//! automatically by the scheduler when a critical condition holds:
//!
//! ```text
//! delivery rate critical      → delivery_failure
//! connection success critical → connection_failure
//! error rate critical         → high_error_rate
//! memory usage critical       → memory_pressure
//! (manual only)               → downstream_slowdown
//! ```
//!
//! Long-running remediation belongs to an external system; the built-in actions forward
//! the condition to an optional [`Remediator`]. Every run is cut off after a timeout.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::health::CriticalConditions;
use crate::metrics::history::MetricHistory;
use crate::util::panic_message;

pub const CONNECTION_FAILURE: &str = "connection_failure";
pub const DELIVERY_FAILURE: &str = "delivery_failure";
pub const HIGH_ERROR_RATE: &str = "high_error_rate";
pub const MEMORY_PRESSURE: &str = "memory_pressure";
pub const DOWNSTREAM_SLOWDOWN: &str = "downstream_slowdown";

#[async_trait]
pub trait RecoveryAction: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

/// External hook that carries out remediation for a condition
#[async_trait]
pub trait Remediator: Send + Sync {
    async fn remediate(&self, condition: &str) -> Result<()>;
}

/// Forwards the condition to the remediator, succeeds trivially without one
pub struct DelegatedAction {
    name: &'static str,
    remediator: Option<Arc<dyn Remediator>>,
}

impl DelegatedAction {
    pub fn new(name: &'static str, remediator: Option<Arc<dyn Remediator>>) -> Self {
        Self { name, remediator }
    }
}

#[async_trait]
impl RecoveryAction for DelegatedAction {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self) -> Result<()> {
        match &self.remediator {
            Some(remediator) => remediator.remediate(self.name).await,
            None => {
                debug!("no remediator configured, nothing to do for {}", self.name);
                Ok(())
            }
        }
    }
}

/// Shrinks metric history to a quarter of its capacity, then delegates
pub struct MemoryPressureAction {
    history: Arc<RwLock<MetricHistory>>,
    delegate: DelegatedAction,
}

impl MemoryPressureAction {
    pub fn new(history: Arc<RwLock<MetricHistory>>, remediator: Option<Arc<dyn Remediator>>) -> Self {
        Self {
            history,
            delegate: DelegatedAction::new(MEMORY_PRESSURE, remediator),
        }
    }
}

#[async_trait]
impl RecoveryAction for MemoryPressureAction {
    fn name(&self) -> &str {
        MEMORY_PRESSURE
    }

    async fn run(&self) -> Result<()> {
        let dropped = {
            let mut history = self.history.write().await;
            let keep = (history.capacity() / 4).max(1);
            history.trim(keep)
        };
        debug!("dropped {dropped} snapshots from metric history");

        self.delegate.run().await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub action: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionStats {
    pub attempts: u64,
    pub successes: u64,
    pub last_outcome: Option<RecoveryOutcome>,
}

pub struct RecoveryEngine {
    actions: RwLock<HashMap<String, Arc<dyn RecoveryAction>>>,
    stats: RwLock<BTreeMap<String, ActionStats>>,
    timeout: Duration,
}

impl std::fmt::Debug for RecoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryEngine")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RecoveryEngine {
    /// Engine without any action
    pub fn new(timeout: Duration) -> Self {
        Self {
            actions: RwLock::new(HashMap::new()),
            stats: RwLock::new(BTreeMap::new()),
            timeout,
        }
    }

    /// Engine with the five built-in actions
    pub fn with_defaults(
        history: Arc<RwLock<MetricHistory>>,
        remediator: Option<Arc<dyn Remediator>>,
        timeout: Duration,
    ) -> Self {
        let mut actions: HashMap<String, Arc<dyn RecoveryAction>> = HashMap::new();

        for name in [CONNECTION_FAILURE, DELIVERY_FAILURE, HIGH_ERROR_RATE, DOWNSTREAM_SLOWDOWN] {
            actions.insert(
                name.to_string(),
                Arc::new(DelegatedAction::new(name, remediator.clone())),
            );
        }
        actions.insert(
            MEMORY_PRESSURE.to_string(),
            Arc::new(MemoryPressureAction::new(history, remediator)),
        );

        Self {
            actions: RwLock::new(actions),
            stats: RwLock::new(BTreeMap::new()),
            timeout,
        }
    }

    /// Add an action, replacing any action with the same name
    pub async fn register(&self, action: Arc<dyn RecoveryAction>) {
        let name = action.name().to_string();
        debug!("registering recovery action {name}");
        self.actions.write().await.insert(name, action);
    }

    pub async fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run an action by name, `false` for unknown names and failed runs
    pub async fn trigger(&self, name: &str) -> bool {
        self.trigger_outcome(name)
            .await
            .is_some_and(|outcome| outcome.success)
    }

    /// Run an action by name, `None` when no such action is registered
    #[instrument(skip(self))]
    pub async fn trigger_outcome(&self, name: &str) -> Option<RecoveryOutcome> {
        let Some(action) = self.actions.read().await.get(name).cloned() else {
            warn!("unknown recovery action requested: {name}");
            return None;
        };

        let run = AssertUnwindSafe(action.run()).catch_unwind();
        let success = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(Ok(()))) => {
                info!("recovery action {name} succeeded");
                true
            }
            Ok(Ok(Err(e))) => {
                error!("recovery action {name} failed: {e:#}");
                false
            }
            Ok(Err(panic)) => {
                error!(
                    "recovery action {name} panicked: {}",
                    panic_message(panic.as_ref())
                );
                false
            }
            Err(_) => {
                error!("recovery action {name} timed out after {:?}", self.timeout);
                false
            }
        };

        let outcome = RecoveryOutcome {
            action: name.to_string(),
            success,
            timestamp: Utc::now(),
        };

        let mut stats = self.stats.write().await;
        let entry = stats.entry(name.to_string()).or_default();
        entry.attempts += 1;
        if success {
            entry.successes += 1;
        }
        entry.last_outcome = Some(outcome.clone());

        Some(outcome)
    }

    /// Run the action of every critical condition, once each
    pub async fn run_automatic(&self, conditions: &CriticalConditions) -> Vec<RecoveryOutcome> {
        let mut outcomes = Vec::new();

        for (critical, name) in [
            (conditions.delivery, DELIVERY_FAILURE),
            (conditions.connection, CONNECTION_FAILURE),
            (conditions.error_rate, HIGH_ERROR_RATE),
            (conditions.memory, MEMORY_PRESSURE),
        ] {
            if !critical {
                continue;
            }

            debug!("critical condition, triggering automatic recovery {name}");
            if let Some(outcome) = self.trigger_outcome(name).await {
                outcomes.push(outcome);
            }
        }

        outcomes
    }

    pub async fn stats(&self) -> BTreeMap<String, ActionStats> {
        self.stats.read().await.clone()
    }
}
