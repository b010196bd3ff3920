//! sensorgen Binary Entry Point
//!
//! Runs the configured telemetry pipelines until Ctrl+C / SIGTERM, or until
//! every pipeline has reached its run duration or tick limit.
//! Core functionality is provided by the `sensorgen` library crate.

use std::time::Duration;

use clap::Parser;
use sensorgen::{
    Pipeline,
    config::{AppConfig, parse_run_duration},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// sensorgen - Synthetic Sensor Telemetry Generator
#[derive(Parser, Debug)]
#[command(name = "sensorgen", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/sensorgen.yaml",
        env = "SENSORGEN_CONFIG"
    )]
    config: String,

    /// Run only the named pipeline (repeatable)
    #[arg(short, long = "pipeline")]
    pipelines: Vec<String>,

    /// Run duration for every pipeline, e.g. 10m (overrides config file; `unbounded` or 0 = until stopped)
    #[arg(long, value_parser = parse_run_duration)]
    run_duration: Option<Duration>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sensorgen=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("sensorgen - Synthetic Sensor Telemetry Generator");

    let cli = Cli::parse();

    tracing::info!(path = %cli.config, "Loading configuration");
    let config = AppConfig::load(&cli.config)?;

    let mut pipelines = Vec::new();
    for pipeline_config in config.select(&cli.pipelines)? {
        let mut pipeline_config = pipeline_config.clone();
        if let Some(duration) = cli.run_duration {
            pipeline_config.run_duration = Some(duration);
        }
        pipelines.push(pipeline_config.to_pipeline()?);
    }

    for index in 0..pipelines.len() {
        if let Err(e) = pipelines[index].start().await {
            tracing::error!(
                pipeline = %pipelines[index].name(),
                error = %e,
                "Failed to start pipeline"
            );
            stop_all(&mut pipelines[..index]).await;
            return Err(e.into());
        }
    }

    tracing::info!(count = pipelines.len(), "Pipelines running, press Ctrl+C to stop");

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = all_finished(&pipelines) => {
            tracing::info!("All pipelines finished");
        }
    }

    stop_all(&mut pipelines).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves once every pipeline's run has been cancelled.
async fn all_finished(pipelines: &[Pipeline]) {
    for pipeline in pipelines {
        pipeline.finished().await;
    }
}

/// Stop each pipeline (draining its queue) and log the outcome.
async fn stop_all(pipelines: &mut [Pipeline]) {
    for pipeline in pipelines {
        match pipeline.stop().await {
            Ok(Some(summary)) => tracing::info!(
                pipeline = %pipeline.name(),
                ticks = summary.producer.ticks,
                rejected = summary.producer.rejected_ticks,
                missed_deadlines = summary.producer.missed_deadlines,
                committed = summary.consumer.ticks_committed,
                rows = summary.consumer.rows_committed,
                lost_batches = summary.consumer.lost_batches.len(),
                "Run summary"
            ),
            Ok(None) => {}
            Err(e) => tracing::error!(pipeline = %pipeline.name(), error = %e, "Failed to stop pipeline"),
        }
    }
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
