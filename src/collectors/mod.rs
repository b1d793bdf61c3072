//! Metric collectors
//!
//! One trait per metric category. Implementations may fail; the [`Collectors`] bundle
//! turns every failure (and every implausible reading) into the zero-valued snapshot
//! of that category, so errors never leave the engine boundary.
//!
//! Each provider is only ever called from the single scheduler worker, one call at a
//! time, so implementations need not guard against concurrent calls to themselves.

pub mod fixed;
pub mod remote;
pub mod system;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{instrument, trace, warn};

use crate::metrics::{ConnectionSnapshot, DeliverySnapshot, PerformanceSnapshot, Snapshot};

#[async_trait]
pub trait DeliveryStatsProvider: Send + Sync {
    async fn delivery_stats(&self) -> Result<DeliverySnapshot>;
}

#[async_trait]
pub trait ConnectionStatsProvider: Send + Sync {
    async fn connection_stats(&self) -> Result<ConnectionSnapshot>;
}

#[async_trait]
pub trait PerformanceStatsProvider: Send + Sync {
    async fn performance_stats(&self) -> Result<PerformanceSnapshot>;
}

/// Snapshots of all three categories taken in one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedMetrics {
    pub delivery: DeliverySnapshot,
    pub connection: ConnectionSnapshot,
    pub performance: PerformanceSnapshot,
    /// Categories that fell back to the zero snapshot
    pub failures: Vec<&'static str>,
}

/// The providers the engine pulls from
#[derive(Clone)]
pub struct Collectors {
    delivery: Arc<dyn DeliveryStatsProvider>,
    connection: Arc<dyn ConnectionStatsProvider>,
    performance: Arc<dyn PerformanceStatsProvider>,
}

impl Collectors {
    pub fn new(
        delivery: Arc<dyn DeliveryStatsProvider>,
        connection: Arc<dyn ConnectionStatsProvider>,
        performance: Arc<dyn PerformanceStatsProvider>,
    ) -> Self {
        Self {
            delivery,
            connection,
            performance,
        }
    }

    /// Call every provider in turn; never fails
    #[instrument(skip(self))]
    pub async fn collect(&self) -> CollectedMetrics {
        let mut failures = Vec::new();

        let delivery = checked(self.delivery.delivery_stats().await, &mut failures);
        let connection = checked(self.connection.connection_stats().await, &mut failures);
        let performance = checked(self.performance.performance_stats().await, &mut failures);

        trace!("collected metrics ({} fallbacks)", failures.len());

        CollectedMetrics {
            delivery,
            connection,
            performance,
            failures,
        }
    }
}

fn checked<S: Snapshot>(result: Result<S>, failures: &mut Vec<&'static str>) -> S {
    let category = S::CATEGORY.as_str();

    match result {
        Ok(snapshot) if snapshot.is_plausible() => snapshot,
        Ok(_) => {
            warn!("{category} collector returned implausible data, using zero snapshot");
            failures.push(category);
            S::default()
        }
        Err(e) => {
            warn!("{category} collector failed, using zero snapshot: {e:#}");
            failures.push(category);
            S::default()
        }
    }
}
