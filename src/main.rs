use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edge_optimizer::{
    agent::EdgeOptimizerAgent,
    config::Config,
    experiments::ExperimentRunner,
    inference::{
        CloudExecutor, CloudInferenceService, HttpCloudService, LocalExecutor, MockCloudService,
        MockLocalEngine,
    },
    models::ExperimentMode,
    monitoring::{PowerTracker, SnapshotSource, SystemMonitor},
};

#[derive(Parser)]
#[command(name = "edge-optimizer")]
#[command(about = "Power-aware routing between local and cloud inference")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a comparison experiment session
    Run {
        /// Which inference paths the session exercises
        #[arg(long, value_enum, default_value_t = ExperimentMode::Both)]
        mode: ExperimentMode,
        /// Override the configured session duration, in seconds
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,
    },
    /// Probe cloud provider connectivity without starting a session
    Probe,
    /// Log a one-shot snapshot, estimate, and routing decision
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("edge_optimizer={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting edge-optimizer v{}", env!("CARGO_PKG_VERSION"));

    // Invalid configuration is fatal here, before any component exists.
    let config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    // Process-wide handles, constructed once and passed to every dependent
    // component.
    let monitor: Arc<dyn SnapshotSource> = Arc::new(SystemMonitor::new());
    let tracker = Arc::new(PowerTracker::new(&config.power));
    let local = Arc::new(LocalExecutor::new(
        Box::new(MockLocalEngine::new(&config.local)),
        config.local.clone(),
    ));
    let cloud = if config.cloud.enabled {
        let service: Arc<dyn CloudInferenceService> = if config.cloud.use_mock_cloud {
            Arc::new(MockCloudService::new())
        } else {
            Arc::new(HttpCloudService::new(config.cloud.clone()))
        };
        Some(Arc::new(CloudExecutor::new(service, &config.cloud)))
    } else {
        None
    };

    match cli.command {
        Command::Run { mode, duration } => {
            let runner = ExperimentRunner::new(
                monitor,
                tracker,
                local,
                cloud,
                config.experiment.clone(),
                config.power.power_model(),
            );

            let token = CancellationToken::new();
            let signal_token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling session");
                    signal_token.cancel();
                }
            });

            let (document, path) = runner
                .run(mode, duration.map(Duration::from_secs), token)
                .await?;
            info!(
                "Session {} {:?}: {} samples, results at {}",
                document.session_id,
                document.status,
                document.raw_samples.len(),
                path.display()
            );
            for (lane, stats) in &document.summary.lanes {
                info!(
                    "  {} lane: {} calls, {:.0}% success, avg latency {:?}ms, avg draw {:?}W",
                    lane,
                    stats.invocations,
                    stats.success_rate * 100.0,
                    stats.avg_latency_ms,
                    stats.avg_estimated_watts
                );
            }
        }
        Command::Probe => match cloud {
            Some(executor) => {
                let report = executor.probe().await;
                if report.reachable {
                    info!(
                        "Provider '{}' reachable ({}ms)",
                        report.provider,
                        report.latency.as_millis()
                    );
                } else {
                    warn!(
                        "Provider '{}' unreachable: {}",
                        report.provider,
                        report.error.unwrap_or_else(|| "unknown".to_string())
                    );
                }
            }
            None => warn!("No cloud path configured, nothing to probe"),
        },
        Command::Status => {
            let agent = EdgeOptimizerAgent::new(
                config.thresholds.clone(),
                monitor.clone(),
                tracker.clone(),
                local,
                cloud,
            );
            let snapshot = monitor.sample().await;
            tracker.record(snapshot.clone()).await;
            info!(
                "Snapshot: cpu={:.1}%, memory={:.1}%, battery={:?}, temperature={:?}",
                snapshot.cpu_percent,
                snapshot.memory_percent,
                snapshot.battery_percent,
                snapshot.temperature_celsius
            );
            match tracker.estimate().await {
                Ok(estimate) => info!(
                    "Estimated draw: {:.1}W ({:.1}W above idle), confidence {:.2}",
                    estimate.estimated_watts, estimate.overhead_watts, estimate.confidence
                ),
                Err(e) => info!("No estimate yet: {}", e),
            }
            info!(
                "Window: {} of {} snapshots",
                tracker.len().await,
                config.power.window_capacity
            );
            match tracker.drain_rate().await {
                Ok(rate) => info!(
                    "Battery drain: {:.2}%/hour over {:.0}s",
                    rate.percent_per_hour, rate.observed_secs
                ),
                Err(e) => info!("No drain metric: {}", e),
            }
            let decision = agent.decide().await;
            info!("Would route: {} ({})", decision.path, decision.reason);
        }
    }

    Ok(())
}
