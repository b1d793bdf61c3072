//! OS-level performance readings
//!
//! [`SystemStatsProvider`] reads CPU and memory usage through `sysinfo`. Application-level
//! fields (error rate, latencies) come from an optional inner provider, and the round-trip
//! time of an optional [`DownstreamProbe`] fills `db_response_time_ms`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sysinfo::System;
use tokio::sync::Mutex;
use tracing::{instrument, trace, warn};

use crate::config::ProbeConfig;
use crate::metrics::PerformanceSnapshot;

use super::PerformanceStatsProvider;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A trivial request against a dependency, timed by the caller
#[async_trait]
pub trait DownstreamProbe: Send + Sync {
    async fn probe(&self) -> Result<()>;
}

/// Probes a dependency with a GET request, any 2xx counts as success
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(config: ProbeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            url: config.url,
            client,
        })
    }
}

#[async_trait]
impl DownstreamProbe for HttpProbe {
    async fn probe(&self) -> Result<()> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("probe request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("probe responded with {}", response.status());
        }

        Ok(())
    }
}

pub struct SystemStatsProvider {
    /// Kept between reads, CPU usage is computed from the difference of two refreshes
    system: Mutex<System>,
    application: Option<Arc<dyn PerformanceStatsProvider>>,
    probe: Option<Arc<dyn DownstreamProbe>>,
}

impl SystemStatsProvider {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            system: Mutex::new(system),
            application: None,
            probe: None,
        }
    }

    /// Take error rate and latencies from another provider
    pub fn with_application_stats(mut self, provider: Arc<dyn PerformanceStatsProvider>) -> Self {
        self.application = Some(provider);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn DownstreamProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    async fn read_system(&self) -> (f64, f64, u64) {
        let mut system = self.system.lock().await;
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpus = system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|cpu| cpu.cpu_usage() as f64).sum::<f64>() / cpus.len() as f64
        };

        let total = system.total_memory();
        let available = system.available_memory();
        let memory_usage = if total == 0 {
            0.0
        } else {
            total.saturating_sub(available) as f64 / total as f64
        };

        // sysinfo reports CPU usage in percent
        ((cpu_usage / 100.0).clamp(0.0, 1.0), memory_usage.clamp(0.0, 1.0), available)
    }

    /// Round-trip time in milliseconds; a failed probe reports the time it took to fail
    async fn measure_probe(&self) -> Option<f64> {
        let probe = self.probe.as_ref()?;

        let start = Instant::now();
        let result = probe.probe().await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        if let Err(e) = result {
            warn!("downstream probe failed after {elapsed_ms:.1}ms: {e:#}");
        }

        Some(elapsed_ms)
    }
}

impl Default for SystemStatsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PerformanceStatsProvider for SystemStatsProvider {
    #[instrument(skip(self))]
    async fn performance_stats(&self) -> Result<PerformanceSnapshot> {
        let mut snapshot = match &self.application {
            Some(provider) => provider.performance_stats().await.unwrap_or_else(|e| {
                warn!("application performance stats unavailable: {e:#}");
                PerformanceSnapshot::default()
            }),
            None => PerformanceSnapshot::default(),
        };

        let (cpu_usage, memory_usage, memory_available_bytes) = self.read_system().await;
        snapshot.cpu_usage = cpu_usage;
        snapshot.memory_usage = memory_usage;
        snapshot.memory_available_bytes = memory_available_bytes;

        if let Some(db_response_time_ms) = self.measure_probe().await {
            snapshot.db_response_time_ms = db_response_time_ms;
        }

        snapshot.timestamp = Utc::now();
        trace!(
            "cpu {:.3}, memory {:.3}, db {:.1}ms",
            snapshot.cpu_usage, snapshot.memory_usage, snapshot.db_response_time_ms
        );

        Ok(snapshot)
    }
}
