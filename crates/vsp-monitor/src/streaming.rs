//! Producer/consumer orchestration
//!
//! The producer task is the only owner of the [`Monitor`]: it polls the
//! source, filters every record and publishes an immutable snapshot over a
//! watch channel. The consumer task renders the display series on its own
//! tick and runs the analyzer at a coarser period, broadcasting one
//! [`AnalysisReport`] per analysis.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn, Level};
use vsp_core::{Clock, PeriodicTrigger, RateMeter, SampleSource, VspResult};
use vsp_processing::{
    AnalysisResult, Analyzer, Monitor, MonitorConfig, MonitorStats, ScheduleConfig, Smoother,
    WindowSnapshot,
};

/// Commands for controlling the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCommand {
    /// Stop ingesting and release the source
    Stop,
    /// Discard filter history, e.g. after the device reconnected
    ResetFilters,
}

/// One analysis as seen by the consumer
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    /// Wall clock time of the analysis
    pub timestamp: DateTime<Utc>,
    /// Records ingested when the analyzed snapshot was taken
    pub samples_ingested: u64,
    /// Whether the windows held only real samples
    pub warm: bool,
    pub result: AnalysisResult,
}

impl AnalysisReport {
    /// Level the report is logged at. Figures from windows still holding
    /// fill values are provisional and stay at debug.
    pub fn log_level(&self) -> Level {
        match (self.warm, self.result.is_success()) {
            (false, _) => Level::DEBUG,
            (true, true) => Level::INFO,
            (true, false) => Level::WARN,
        }
    }
}

/// What the consumer saw over the stream's lifetime
#[derive(Debug, Clone, Default)]
pub struct ConsumerSummary {
    pub frames_rendered: u64,
    pub analysis: MonitorStats,
    pub last_report: Option<AnalysisReport>,
}

/// Final state of a finished stream
#[derive(Debug, Clone)]
pub struct StreamSummary {
    /// Producer counters (records accepted and dropped)
    pub ingest: MonitorStats,
    pub consumer: ConsumerSummary,
}

/// Handle to a running producer/consumer pair
pub struct StreamHandle {
    commands: mpsc::Sender<StreamCommand>,
    snapshots: watch::Receiver<Arc<WindowSnapshot>>,
    reports: broadcast::Sender<AnalysisReport>,
    producer: JoinHandle<VspResult<MonitorStats>>,
    consumer: JoinHandle<ConsumerSummary>,
}

impl StreamHandle {
    /// Receive analysis reports from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisReport> {
        self.reports.subscribe()
    }

    /// Latest published snapshot
    pub fn latest_snapshot(&self) -> Arc<WindowSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Ask the producer to stop; a producer that already finished is not an error
    pub async fn stop(&self) {
        let _ = self.commands.send(StreamCommand::Stop).await;
    }

    pub async fn reset_filters(&self) {
        let _ = self.commands.send(StreamCommand::ResetFilters).await;
    }

    /// Resolves once the producer has stopped publishing
    pub async fn producer_finished(&self) {
        let mut snapshots = self.snapshots.clone();
        while snapshots.changed().await.is_ok() {}
    }

    /// Wait for both tasks to finish
    pub async fn join(self) -> anyhow::Result<StreamSummary> {
        let StreamHandle {
            commands,
            producer,
            consumer,
            ..
        } = self;
        // Keep the command channel open until the producer is done so it
        // stops on the source, not on a closed channel
        let ingest = producer.await??;
        drop(commands);
        let consumer = consumer.await?;
        Ok(StreamSummary { ingest, consumer })
    }
}

/// Build the monitor and start both tasks
pub fn spawn_stream(
    config: MonitorConfig,
    source: Box<dyn SampleSource>,
    clock: Arc<dyn Clock>,
) -> VspResult<StreamHandle> {
    let monitor = Monitor::new(config.clone())?;
    let schedule = config.schedule;

    let (command_tx, command_rx) = mpsc::channel(32);
    let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(monitor.snapshot()));
    let (report_tx, _) = broadcast::channel(256);

    let producer = tokio::spawn(run_producer(
        monitor,
        source,
        schedule,
        command_rx,
        snapshot_tx,
        clock.clone(),
    ));

    let consumer = tokio::spawn(run_consumer(
        snapshot_rx.clone(),
        Analyzer::new(config.sample_rate_hz, config.analyzer),
        Smoother::from_config(&config.smoother),
        schedule,
        report_tx.clone(),
        clock,
    ));

    Ok(StreamHandle {
        commands: command_tx,
        snapshots: snapshot_rx,
        reports: report_tx,
        producer,
        consumer,
    })
}

/// Poll the source, filter and publish until stopped or exhausted. The
/// source is closed on every exit path.
pub async fn run_producer(
    mut monitor: Monitor,
    mut source: Box<dyn SampleSource>,
    schedule: ScheduleConfig,
    mut commands: mpsc::Receiver<StreamCommand>,
    snapshots: watch::Sender<Arc<WindowSnapshot>>,
    clock: Arc<dyn Clock>,
) -> VspResult<MonitorStats> {
    info!(source = source.name(), "Producer started");

    let result = produce(
        &mut monitor,
        source.as_mut(),
        schedule,
        &mut commands,
        &snapshots,
        clock.as_ref(),
    )
    .await;
    source.close();

    let stats = monitor.stats();
    match &result {
        Ok(()) => info!(
            source = source.name(),
            accepted = stats.records_accepted,
            malformed = stats.records_malformed,
            measured_hz = monitor.ingest_rate_hz(),
            "Producer stopped"
        ),
        Err(e) => error!(source = source.name(), error = %e, "Producer failed"),
    }
    result.map(|()| stats)
}

async fn produce(
    monitor: &mut Monitor,
    source: &mut dyn SampleSource,
    schedule: ScheduleConfig,
    commands: &mut mpsc::Receiver<StreamCommand>,
    snapshots: &watch::Sender<Arc<WindowSnapshot>>,
    clock: &dyn Clock,
) -> VspResult<()> {
    let mut poll_timer = interval(schedule.poll_interval());
    poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut rate = RateMeter::new(RATE_WINDOW);
    let nominal_hz = monitor.config().sample_rate_hz;
    let mut lines = Vec::new();

    loop {
        tokio::select! {
            _ = poll_timer.tick() => {
                lines.clear();
                let polled = source.poll_lines(&mut lines)?;
                if let Some(measured_hz) = rate.record(clock.now(), polled as u64) {
                    monitor.set_ingest_rate(measured_hz);
                    log_ingest_rate(measured_hz, nominal_hz);
                }
                if polled > 0 {
                    monitor.ingest_lines(lines.iter());
                    snapshots.send_replace(Arc::new(monitor.snapshot()));
                }

                if source.is_exhausted() {
                    debug!(source = source.name(), "Source exhausted");
                    return Ok(());
                }
            }

            command = commands.recv() => {
                match command {
                    Some(StreamCommand::ResetFilters) => monitor.reset_filters(),
                    Some(StreamCommand::Stop) => {
                        info!("Stop requested");
                        return Ok(());
                    }
                    None => {
                        debug!("Control channel closed");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Window over which the ingest rate is measured
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Relative deviation from the nominal rate tolerated before warning
const RATE_TOLERANCE: f64 = 0.1;

/// Whether a measured ingest rate is close enough to the configured one
pub fn rate_matches_nominal(measured_hz: f64, nominal_hz: f64) -> bool {
    (measured_hz - nominal_hz).abs() <= nominal_hz * RATE_TOLERANCE
}

fn log_ingest_rate(measured_hz: f64, nominal_hz: f64) {
    if rate_matches_nominal(measured_hz, nominal_hz) {
        debug!(measured_hz, nominal_hz, "Ingest rate");
    } else {
        // BPM and filter design assume the nominal rate
        warn!(measured_hz, nominal_hz, "Ingest rate differs from configured sample rate");
    }
}

/// Render on every display tick and analyze once per analysis period until
/// the producer goes away
pub async fn run_consumer(
    mut snapshots: watch::Receiver<Arc<WindowSnapshot>>,
    analyzer: Analyzer,
    smoother: Smoother,
    schedule: ScheduleConfig,
    reports: broadcast::Sender<AnalysisReport>,
    clock: Arc<dyn Clock>,
) -> ConsumerSummary {
    let mut display_timer = interval(schedule.display_tick());
    display_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut trigger = PeriodicTrigger::new(schedule.analysis_period());
    let mut summary = ConsumerSummary::default();
    let mut last_analyzed: Option<u64> = None;

    loop {
        tokio::select! {
            _ = display_timer.tick() => {
                let snapshot = snapshots.borrow_and_update().clone();
                render(&snapshot, &smoother);
                summary.frames_rendered += 1;

                if trigger.fire(clock.now()) && snapshot.samples_ingested > 0 {
                    analyze(&snapshot, &analyzer, &reports, &mut summary);
                    last_analyzed = Some(snapshot.samples_ingested);
                }
            }

            changed = snapshots.changed() => {
                if changed.is_err() {
                    // Producer finished; analyze whatever arrived since the last run
                    let snapshot = snapshots.borrow().clone();
                    if snapshot.samples_ingested > 0 && last_analyzed != Some(snapshot.samples_ingested) {
                        analyze(&snapshot, &analyzer, &reports, &mut summary);
                    }
                    break;
                }
            }
        }
    }

    debug!(frames = summary.frames_rendered, "Consumer stopped");
    summary
}

/// Headless stand-in for the plot: trace the newest display value per channel
fn render(snapshot: &WindowSnapshot, smoother: &Smoother) {
    if !tracing::enabled!(Level::TRACE) {
        return;
    }
    for (channel, series) in snapshot.display(smoother) {
        if let Some(latest) = series.last() {
            tracing::trace!(channel = %channel, value = latest, "Display");
        }
    }
}

fn analyze(
    snapshot: &WindowSnapshot,
    analyzer: &Analyzer,
    reports: &broadcast::Sender<AnalysisReport>,
    summary: &mut ConsumerSummary,
) {
    let Some(result) = snapshot.analyze(analyzer) else {
        return;
    };
    summary.analysis.record_analysis(&result);

    let report = AnalysisReport {
        timestamp: Utc::now(),
        samples_ingested: snapshot.samples_ingested,
        warm: snapshot.warm,
        result,
    };
    log_report(&report, snapshot);

    // No subscribers is fine
    let _ = reports.send(report.clone());
    summary.last_report = Some(report);
}

fn log_report(report: &AnalysisReport, snapshot: &WindowSnapshot) {
    let result = &report.result;
    let level = report.log_level();
    match (result.bpm, result.spo2) {
        (Some(bpm), Some(spo2)) if level == Level::INFO => info!(
            bpm,
            spo2,
            spo2_normal = result.is_normal_spo2(),
            samples = report.samples_ingested,
            "Vitals"
        ),
        _ if level == Level::WARN => warn!(
            status = %result.status,
            samples = report.samples_ingested,
            malformed = snapshot.malformed_records,
            "Analysis unavailable"
        ),
        _ => debug!(
            status = %result.status,
            bpm = ?result.bpm,
            spo2 = ?result.spo2,
            samples = report.samples_ingested,
            "Windows warming up, vitals provisional"
        ),
    }
}
