//! Alert lifecycle
//!
//! The [`AlertManager`] owns the set of active alerts, keyed by a stable id per
//! condition, and a bounded history of every alert occurrence.
//!
//! ```text
//! raise(id)   id not active → open, append to history, notify callbacks
//!             id active     → refresh metrics in place (no history entry, no callbacks)
//! resolve(id) id active     → mark resolved, drop from active set
//!             id not active → no-op
//! ```
//!
//! All state sits behind one mutex. Callbacks are collected under the lock and invoked
//! after it has been released, so a callback may call back into the manager.

pub mod notify;
pub mod rules;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
            AlertSeverity::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable key of the condition, e.g. `delivery_rate_critical`
    pub id: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    /// Subsystem the alert is about (`delivery`, `connection`, `performance`, `monitor`)
    pub component: String,
    /// Readings at trigger time, refreshed while the alert stays active
    pub metrics: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(id: impl Into<String>, severity: AlertSeverity, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            severity,
            title: title.into(),
            message: String::new(),
            component: String::new(),
            metrics: BTreeMap::new(),
            created_at: Utc::now(),
            resolved: false,
            resolved_at: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    pub fn metric(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    pub fn metrics(mut self, metrics: BTreeMap<String, serde_json::Value>) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Invoked once per newly opened alert
pub type AlertCallback = Arc<dyn Fn(&Alert) -> anyhow::Result<()> + Send + Sync>;

/// A single mutation of the alert state
#[derive(Debug, Clone)]
pub enum AlertChange {
    Raise(Alert),
    Resolve(String),
}

#[derive(Debug)]
struct AlertBook {
    active: HashMap<String, Alert>,
    history: VecDeque<Alert>,
    history_capacity: usize,
}

impl AlertBook {
    /// Returns the alert when it was newly opened
    fn raise(&mut self, alert: Alert) -> Option<Alert> {
        if let Some(existing) = self.active.get_mut(&alert.id) {
            trace!("alert {} still active, refreshing metrics", alert.id);
            existing.metrics = alert.metrics;
            return None;
        }

        info!("alert opened: {} ({})", alert.id, alert.severity);

        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(alert.clone());
        self.active.insert(alert.id.clone(), alert.clone());

        Some(alert)
    }

    fn resolve(&mut self, id: &str) -> bool {
        let Some(mut alert) = self.active.remove(id) else {
            return false;
        };

        let now = Utc::now();
        alert.resolved = true;
        alert.resolved_at = Some(now);
        info!("alert resolved: {id}");

        // the history entry of this occurrence may already have been evicted
        if let Some(entry) = self
            .history
            .iter_mut()
            .rev()
            .find(|entry| entry.id == id && !entry.resolved)
        {
            *entry = alert;
        }

        true
    }

    fn active_sorted(&self) -> Vec<Alert> {
        let mut active: Vec<Alert> = self.active.values().cloned().collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        active
    }

    fn recent_history(&self, limit: usize) -> Vec<Alert> {
        self.history.iter().rev().take(limit).cloned().collect()
    }
}

/// Active alerts, alert history and callback registry
pub struct AlertManager {
    book: Mutex<AlertBook>,
    callbacks: RwLock<Vec<AlertCallback>>,
}

impl std::fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertManager").finish_non_exhaustive()
    }
}

impl AlertManager {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            book: Mutex::new(AlertBook {
                active: HashMap::new(),
                history: VecDeque::new(),
                history_capacity: history_capacity.max(1),
            }),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Open an alert or refresh the metrics of the active one with the same id
    ///
    /// Returns `true` when a new alert was opened (and callbacks were notified).
    pub async fn raise(&self, alert: Alert) -> bool {
        let opened = self.apply(vec![AlertChange::Raise(alert)]).await;
        let is_new = !opened.is_empty();
        self.dispatch(&opened).await;
        is_new
    }

    /// Resolve the active alert with this id, returns whether there was one
    pub async fn resolve(&self, id: &str) -> bool {
        self.book.lock().await.resolve(id)
    }

    /// Apply a batch of changes under a single lock acquisition
    ///
    /// Returns the newly opened alerts. Callbacks are not invoked; pass the result to
    /// [`AlertManager::dispatch`] once any outer locks are released.
    pub async fn apply(&self, changes: Vec<AlertChange>) -> Vec<Alert> {
        let mut book = self.book.lock().await;

        changes
            .into_iter()
            .filter_map(|change| match change {
                AlertChange::Raise(alert) => book.raise(alert),
                AlertChange::Resolve(id) => {
                    book.resolve(&id);
                    None
                }
            })
            .collect()
    }

    /// Invoke every registered callback for every alert, in registration order
    ///
    /// A failing or panicking callback is logged and does not stop the others.
    #[instrument(skip_all, fields(alerts = alerts.len()))]
    pub async fn dispatch(&self, alerts: &[Alert]) {
        if alerts.is_empty() {
            return;
        }

        let callbacks = self.callbacks.read().await.clone();
        if callbacks.is_empty() {
            trace!("no alert callbacks registered");
            return;
        }

        for alert in alerts {
            for (index, callback) in callbacks.iter().enumerate() {
                match catch_unwind(AssertUnwindSafe(|| callback(alert))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("alert callback #{index} failed for {}: {e:#}", alert.id),
                    Err(_) => error!("alert callback #{index} panicked for {}", alert.id),
                }
            }
        }
    }

    pub async fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&Alert) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut callbacks = self.callbacks.write().await;
        callbacks.push(Arc::new(callback));
        debug!("registered alert callback #{}", callbacks.len() - 1);
    }

    /// Active alerts, oldest first
    pub async fn active(&self) -> Vec<Alert> {
        self.book.lock().await.active_sorted()
    }

    /// Active alerts and up to `limit` history entries, read under one lock
    pub async fn view(&self, limit: usize) -> (Vec<Alert>, Vec<Alert>) {
        let book = self.book.lock().await;
        (book.active_sorted(), book.recent_history(limit))
    }

    pub async fn active_count(&self) -> usize {
        self.book.lock().await.active.len()
    }

    pub async fn is_active(&self, id: &str) -> bool {
        self.book.lock().await.active.contains_key(id)
    }

    /// Up to `limit` alerts from history, newest first
    pub async fn history(&self, limit: usize) -> Vec<Alert> {
        self.book.lock().await.recent_history(limit)
    }
}
