//! Read-only, dashboard-shaped views of the engine state
//!
//! Every query clones what it needs under read locks and succeeds on an empty history:
//! the current value is then the zero snapshot, series are empty and trends are stable.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::Alert;
use crate::health::{self, HealthStatus};
use crate::metrics::history::{HistoryEntry, MetricHistory, MetricTrend};
use crate::metrics::{ConnectionSnapshot, DeliverySnapshot, PerformanceSnapshot, Snapshot};

use super::{Engine, Monitor, TickStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub active_alert_count: usize,
    /// When the last tick completed, `None` before the first one
    pub last_check: Option<DateTime<Utc>>,
}

/// Current value, trends and recent series of one metric category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard<S> {
    pub current: S,
    pub health: HealthStatus,
    /// Keyed by field name
    pub trends: BTreeMap<String, MetricTrend>,
    /// Oldest first
    pub time_series: Vec<S>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertsView {
    pub active: Vec<Alert>,
    /// Newest first
    pub history: Vec<Alert>,
}

fn status_of(history: &MetricHistory, tick_status: &TickStatus, engine: &Engine) -> HealthStatus {
    if tick_status.last_failure.is_some() {
        return HealthStatus::Failed;
    }

    health::evaluate(
        &history.latest::<DeliverySnapshot>(),
        &history.latest::<ConnectionSnapshot>(),
        &history.latest::<PerformanceSnapshot>(),
        &engine.config.thresholds,
    )
}

fn trends<S: HistoryEntry>(current: &S, series: &[S]) -> BTreeMap<String, MetricTrend> {
    current
        .fields()
        .into_iter()
        .map(|(name, _)| {
            let values: Vec<f64> = series
                .iter()
                .filter_map(|snapshot| {
                    snapshot
                        .fields()
                        .into_iter()
                        .find(|(field, _)| *field == name)
                        .map(|(_, value)| value)
                })
                .collect();

            (name.to_string(), MetricTrend::from_values(&values))
        })
        .collect()
}

impl Engine {
    pub(crate) async fn health(&self) -> HealthReport {
        let history = self.history.read().await;
        let active_alert_count = self.alerts.active_count().await;
        let tick_status = self.status.read().await;

        HealthReport {
            status: status_of(&history, &tick_status, self),
            active_alert_count,
            last_check: tick_status.last_check,
        }
    }

    pub(crate) async fn dashboard<S: HistoryEntry>(&self) -> Dashboard<S> {
        let (current, time_series, health) = {
            let history = self.history.read().await;
            let tick_status = self.status.read().await;
            (
                history.latest::<S>(),
                history.recent::<S>(self.config.dashboard_points),
                status_of(&history, &tick_status, self),
            )
        };

        Dashboard {
            trends: trends(&current, &time_series),
            current,
            health,
            time_series,
        }
    }
}

impl Monitor {
    pub async fn health(&self) -> HealthReport {
        self.engine.health().await
    }

    pub async fn delivery_dashboard(&self) -> Dashboard<DeliverySnapshot> {
        self.engine.dashboard().await
    }

    pub async fn connection_dashboard(&self) -> Dashboard<ConnectionSnapshot> {
        self.engine.dashboard().await
    }

    pub async fn performance_dashboard(&self) -> Dashboard<PerformanceSnapshot> {
        self.engine.dashboard().await
    }

    /// Active alerts and up to `limit` history entries
    pub async fn alerts(&self, limit: usize) -> AlertsView {
        let _history = self.engine.history.read().await;
        let (active, history) = self.engine.alerts.view(limit).await;
        AlertsView { active, history }
    }
}
