use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pulsewatch::{
    Monitor,
    alerts::notify::Notifier,
    collectors::{
        Collectors, ConnectionStatsProvider, DeliveryStatsProvider, PerformanceStatsProvider,
        fixed::FixedStats,
        remote::RemoteStatsProvider,
        system::{HttpProbe, SystemStatsProvider},
    },
    config::{MonitorConfig, read_config_file},
    util::{get_config_path, get_source_token},
};
use tracing::{debug, info, instrument, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("pulsewatch", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<MonitorConfig> {
    let Some(path) = args.file.clone().or_else(get_config_path) else {
        info!("no config file given, using defaults");
        return Ok(MonitorConfig::default());
    };

    read_config_file(&path).with_context(|| format!("failed to load config from {path}"))
}

#[instrument(skip_all)]
fn build_collectors(config: &MonitorConfig) -> anyhow::Result<Collectors> {
    let mut system = SystemStatsProvider::new();

    if let Some(probe) = &config.probe {
        debug!("probing downstream dependency at {}", probe.url);
        system = system.with_probe(Arc::new(HttpProbe::new(probe.clone())?));
    }

    let Some(source) = &config.source else {
        warn!("no stats source configured, delivery and connection readings are fixed");
        let fixed = Arc::new(FixedStats::healthy());
        return Ok(Collectors::new(fixed.clone(), fixed, Arc::new(system)));
    };

    let mut source = source.clone();
    if source.token.is_none() {
        source.token = get_source_token();
    }

    debug!("polling stats from {}", source.url);
    let remote = Arc::new(RemoteStatsProvider::new(source)?);
    let delivery: Arc<dyn DeliveryStatsProvider> = remote.clone();
    let connection: Arc<dyn ConnectionStatsProvider> = remote.clone();
    let performance: Arc<dyn PerformanceStatsProvider> =
        Arc::new(system.with_application_stats(remote));

    Ok(Collectors::new(delivery, connection, performance))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = load_config(&args)?;
    let collectors = build_collectors(&config)?;
    let targets = config.alerts.clone();

    let monitor = Arc::new(Monitor::new(config, collectors)?);

    for target in targets {
        monitor
            .register_alert_callback(Notifier::new(target).into_callback())
            .await;
    }
    monitor
        .register_alert_callback(|alert| {
            info!("[{}] {}: {}", alert.severity, alert.title, alert.message);
            Ok(())
        })
        .await;

    monitor.start().await;
    info!("monitoring every {:?}", monitor.config().interval());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("shutting down");
    monitor.stop().await;

    let health = monitor.health().await;
    debug!(
        "final status {} with {} active alerts",
        health.status, health.active_alert_count
    );

    Ok(())
}
