use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vsp_core::{Clock, MonotonicClock};
use vsp_monitor::cli::Cli;
use vsp_monitor::spawn_stream;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    if cli.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let source = cli.open_source(&config, clock.clone())?;
    info!(
        source = source.name(),
        sample_rate_hz = config.sample_rate_hz,
        window = config.window_size_samples,
        "Starting vital-sign monitor"
    );

    let handle = spawn_stream(config, source, clock)?;

    let deadline = async {
        match cli.duration_secs {
            Some(secs) if secs.is_finite() && secs > 0.0 => {
                tokio::time::sleep(Duration::from_secs_f64(secs)).await
            }
            _ => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Unable to listen for Ctrl-C");
            }
            info!("Interrupted");
        }
        _ = deadline => info!("Duration elapsed"),
        _ = handle.producer_finished() => info!("Source finished"),
    }

    let snapshot = handle.latest_snapshot();
    handle.stop().await;
    let summary = handle.join().await?;

    info!(
        accepted = summary.ingest.records_accepted,
        malformed = summary.ingest.records_malformed,
        buffered = snapshot.samples_ingested,
        measured_hz = snapshot.ingest_rate_hz,
        frames = summary.consumer.frames_rendered,
        analyses = summary.consumer.analysis.analyses_run,
        succeeded = summary.consumer.analysis.analyses_succeeded,
        "Monitor stopped"
    );
    if let Some(report) = summary.consumer.last_report {
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}
