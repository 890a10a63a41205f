//! Synchronous sample pipeline
//!
//! [`Monitor`] owns every channel's filter chain and windows. Records go in
//! one at a time; readers get immutable [`WindowSnapshot`]s.

use crate::analyzer::{AnalysisResult, Analyzer};
use crate::config::{ChannelConfig, MonitorConfig};
use crate::filters::FilterChain;
use crate::smoother::Smoother;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};
use vsp_core::{Channel, ChannelMap, SampleRecord, SlidingWindow, VspError, VspResult};

/// Counters describing the stream so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    /// Records decoded and filtered
    pub records_accepted: u64,
    /// Records dropped as malformed
    pub records_malformed: u64,
    /// Analyses run
    pub analyses_run: u64,
    /// Analyses that produced BPM and SpO2
    pub analyses_succeeded: u64,
}

impl MonitorStats {
    pub fn record_analysis(&mut self, result: &AnalysisResult) {
        self.analyses_run += 1;
        if result.is_success() {
            self.analyses_succeeded += 1;
        }
    }
}

/// Filtered window of one channel plus its display settings
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelWindow {
    pub channel: Channel,
    /// Filtered samples, oldest first
    pub filtered: Vec<f64>,
    pub invert: bool,
    pub display_gain: f64,
    pub smooth: bool,
}

impl ChannelWindow {
    /// Display series: gain and polarity applied, smoothed if enabled
    pub fn display(&self, smoother: &Smoother) -> Vec<f64> {
        let scale = if self.invert {
            -self.display_gain
        } else {
            self.display_gain
        };
        let scaled: Vec<f64> = self.filtered.iter().map(|x| x * scale).collect();

        if self.smooth {
            smoother.apply(&scaled)
        } else {
            scaled
        }
    }
}

/// Immutable copy of the pipeline windows at one instant
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowSnapshot {
    /// Filtered windows in channel map order
    pub channels: Vec<ChannelWindow>,
    /// Unfiltered infrared window used for analysis
    pub raw_ir: Option<Vec<f64>>,
    /// Unfiltered red window used for analysis
    pub raw_red: Option<Vec<f64>>,
    /// Records accepted so far
    pub samples_ingested: u64,
    /// Records dropped so far
    pub malformed_records: u64,
    /// Device timestamp of the newest record, when the layout carries one
    pub last_timestamp: Option<f64>,
    /// Whether every window holds only real samples
    pub warm: bool,
    /// Records per second measured at the source, once a window has closed
    pub ingest_rate_hz: Option<f64>,
}

impl WindowSnapshot {
    pub fn channel(&self, channel: Channel) -> Option<&ChannelWindow> {
        self.channels.iter().find(|w| w.channel == channel)
    }

    /// Run the analyzer on the raw PPG windows; `None` without both channels
    pub fn analyze(&self, analyzer: &Analyzer) -> Option<AnalysisResult> {
        match (&self.raw_red, &self.raw_ir) {
            (Some(red), Some(ir)) => Some(analyzer.analyze(red, ir)),
            _ => None,
        }
    }

    /// Display series for every channel
    pub fn display(&self, smoother: &Smoother) -> Vec<(Channel, Vec<f64>)> {
        self.channels
            .iter()
            .map(|w| (w.channel, w.display(smoother)))
            .collect()
    }
}

struct ChannelPipeline {
    config: ChannelConfig,
    chain: FilterChain,
    primed: bool,
    filtered: SlidingWindow<f64>,
    raw: Option<SlidingWindow<f64>>,
}

impl ChannelPipeline {
    fn new(config: &ChannelConfig, sample_rate_hz: f64, window: usize) -> VspResult<Self> {
        let chain = FilterChain::design(&config.filter_specs(sample_rate_hz))?;
        let raw = config.channel.is_ppg().then(|| SlidingWindow::new(window));

        Ok(ChannelPipeline {
            config: config.clone(),
            chain,
            primed: false,
            filtered: SlidingWindow::new(window),
            raw,
        })
    }

    fn process(&mut self, x: f64) -> f64 {
        if !self.primed {
            self.chain.prime(x);
            self.primed = true;
        }
        let y = self.chain.process_sample(x);

        self.filtered.push(y);
        if let Some(raw) = self.raw.as_mut() {
            raw.push(x);
        }
        y
    }

    fn window(&self) -> ChannelWindow {
        ChannelWindow {
            channel: self.config.channel,
            filtered: self.filtered.as_sequence(),
            invert: self.config.invert,
            display_gain: self.config.display_gain,
            smooth: self.config.smooth,
        }
    }
}

/// Per-channel filtering and windowing for one device stream
pub struct Monitor {
    config: MonitorConfig,
    map: ChannelMap,
    channels: Vec<ChannelPipeline>,
    analyzer: Analyzer,
    smoother: Smoother,
    stats: MonitorStats,
    last_timestamp: Option<f64>,
    ingest_rate_hz: Option<f64>,
}

impl Monitor {
    /// Build the pipeline; fails if the configuration is invalid
    pub fn new(config: MonitorConfig) -> VspResult<Self> {
        config.validate()?;

        let channels = config
            .channels
            .iter()
            .map(|c| ChannelPipeline::new(c, config.sample_rate_hz, config.window_size_samples))
            .collect::<VspResult<Vec<_>>>()?;

        for pipeline in &channels {
            debug!(
                channel = %pipeline.config.channel,
                field = pipeline.config.field,
                stages = pipeline.chain.len(),
                "Channel pipeline ready"
            );
        }

        info!(
            sample_rate_hz = config.sample_rate_hz,
            window = config.window_size_samples,
            channels = channels.len(),
            "Monitor created"
        );

        Ok(Monitor {
            map: config.channel_map(),
            analyzer: Analyzer::new(config.sample_rate_hz, config.analyzer),
            smoother: Smoother::from_config(&config.smoother),
            channels,
            config,
            stats: MonitorStats::default(),
            last_timestamp: None,
            ingest_rate_hz: None,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn channel_map(&self) -> &ChannelMap {
        &self.map
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn smoother(&self) -> &Smoother {
        &self.smoother
    }

    /// Record the measured ingest rate so snapshots carry it
    pub fn set_ingest_rate(&mut self, rate_hz: f64) {
        self.ingest_rate_hz = Some(rate_hz);
    }

    /// Measured ingest rate, when known
    pub fn ingest_rate_hz(&self) -> Option<f64> {
        self.ingest_rate_hz
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    /// Decode and process one device line; malformed lines are counted and
    /// returned as errors without touching any filter state
    pub fn ingest_line(&mut self, line: &str) -> VspResult<SampleRecord> {
        match self.map.parse(line) {
            Ok(record) => self.ingest_record(&record),
            Err(e) => {
                self.stats.records_malformed += 1;
                trace!(line, error = %e, "Dropping malformed record");
                Err(e)
            }
        }
    }

    /// Process every line of a batch, returning how many were accepted
    pub fn ingest_lines<I, S>(&mut self, lines: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines
            .into_iter()
            .filter(|line| self.ingest_line(line.as_ref()).is_ok())
            .count()
    }

    /// Filter a decoded record; returns the filtered value of every channel
    pub fn ingest_record(&mut self, record: &SampleRecord) -> VspResult<SampleRecord> {
        // Check completeness first so a partial record leaves no trace
        let mut inputs = Vec::with_capacity(self.channels.len());
        for pipeline in &self.channels {
            let channel = pipeline.config.channel;
            match record.value(channel) {
                Some(x) => inputs.push(x),
                None => {
                    self.stats.records_malformed += 1;
                    return Err(VspError::malformed(format!("record has no {} value", channel)));
                }
            }
        }

        let values = self
            .channels
            .iter_mut()
            .zip(inputs)
            .map(|(pipeline, x)| (pipeline.config.channel, pipeline.process(x)))
            .collect();

        self.stats.records_accepted += 1;
        if record.timestamp.is_some() {
            self.last_timestamp = record.timestamp;
        }

        Ok(SampleRecord {
            timestamp: record.timestamp,
            values,
        })
    }

    /// Discard filter history after a discontinuity; the next sample
    /// re-primes every chain
    pub fn reset_filters(&mut self) {
        for pipeline in &mut self.channels {
            pipeline.chain.reset();
            pipeline.primed = false;
        }
        info!("Filter state reset");
    }

    /// Copy the current windows
    pub fn snapshot(&self) -> WindowSnapshot {
        let raw_of = |channel: Channel| {
            self.channels
                .iter()
                .find(|p| p.config.channel == channel)
                .and_then(|p| p.raw.as_ref())
                .map(SlidingWindow::as_sequence)
        };

        WindowSnapshot {
            channels: self.channels.iter().map(ChannelPipeline::window).collect(),
            raw_ir: raw_of(Channel::Ir),
            raw_red: raw_of(Channel::Red),
            samples_ingested: self.stats.records_accepted,
            malformed_records: self.stats.records_malformed,
            last_timestamp: self.last_timestamp,
            warm: self.channels.iter().all(|p| p.filtered.is_warm()),
            ingest_rate_hz: self.ingest_rate_hz,
        }
    }

    /// Analyze the current raw PPG windows; `None` when the layout has no
    /// red/infrared pair
    pub fn analyze(&mut self) -> Option<AnalysisResult> {
        let result = self.snapshot().analyze(&self.analyzer)?;
        self.stats.record_analysis(&result);
        Some(result)
    }

    /// Display series of every channel
    pub fn display(&self) -> Vec<(Channel, Vec<f64>)> {
        self.snapshot().display(&self.smoother)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalysisStatus;
    use std::f64::consts::PI;

    fn device_line(i: usize) -> String {
        let t = i as f64 / 100.0;
        let ecg = 1800.0 + 300.0 * (2.0 * PI * 1.2 * t).sin() + 40.0 * (2.0 * PI * 50.0 * t).cos();
        let ir = 50_000.0 + 600.0 * (2.0 * PI * 1.2 * t).sin();
        let red = 40_000.0 + 320.0 * (2.0 * PI * 1.2 * t).sin();
        format!("{:.3},{:.3},{:.3}", ecg, ir, red)
    }

    #[test]
    fn test_windows_fill_and_warm_up() {
        let mut monitor = Monitor::new(MonitorConfig::default()).unwrap();
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.channels.len(), 3);
        assert!(snapshot.channels.iter().all(|w| w.filtered.len() == 500));
        assert!(!snapshot.warm);

        let accepted = monitor.ingest_lines((0..520).map(device_line));
        assert_eq!(accepted, 520);

        let snapshot = monitor.snapshot();
        assert!(snapshot.warm);
        assert_eq!(snapshot.samples_ingested, 520);
        assert_eq!(snapshot.raw_ir.as_ref().map(Vec::len), Some(500));

        // Raw windows hold the unfiltered values, newest last
        let last_ir: f64 = device_line(519).split(',').nth(1).unwrap().parse().unwrap();
        assert_eq!(snapshot.raw_ir.unwrap()[499], last_ir);
    }

    #[test]
    fn test_malformed_lines_are_counted_and_skipped() {
        let mut monitor = Monitor::new(MonitorConfig::default()).unwrap();
        monitor.ingest_line(&device_line(0)).unwrap();
        let before = monitor.snapshot();

        for line in ["", "garbage", "1,2", "1,x,3"] {
            let result = monitor.ingest_line(line);
            assert!(matches!(result, Err(VspError::MalformedSample { .. })));
        }

        let after = monitor.snapshot();
        assert_eq!(monitor.stats().records_malformed, 4);
        assert_eq!(monitor.stats().records_accepted, 1);
        assert_eq!(after.malformed_records, 4);
        assert_eq!(after.channels, before.channels);
    }

    #[test]
    fn test_record_missing_channel_is_rejected() {
        let mut monitor = Monitor::new(MonitorConfig::default()).unwrap();
        let record = SampleRecord {
            timestamp: None,
            values: vec![(Channel::Ir, 1.0), (Channel::Red, 2.0)],
        };
        assert!(monitor.ingest_record(&record).is_err());
        assert_eq!(monitor.stats().records_malformed, 1);
        assert_eq!(monitor.snapshot().samples_ingested, 0);
    }

    #[test]
    fn test_priming_removes_startup_transient() {
        let mut monitor = Monitor::new(MonitorConfig::ppg_only()).unwrap();
        for _ in 0..50 {
            let filtered = monitor.ingest_line("51234,48710").unwrap();
            for (_, y) in filtered.values {
                assert!(y.abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_reset_filters_reprimes_on_next_sample() {
        let mut monitor = Monitor::new(MonitorConfig::ppg_only()).unwrap();
        monitor.ingest_lines(vec!["1000,1000"; 100]);

        // Reconnect at a different level
        monitor.reset_filters();
        let filtered = monitor.ingest_line("30000,20000").unwrap();
        assert!(filtered.values.iter().all(|(_, y)| y.abs() < 1e-6));

        // Windows keep their history across a reset
        assert_eq!(monitor.snapshot().samples_ingested, 101);
    }

    #[test]
    fn test_analysis_uses_raw_windows() {
        let mut monitor = Monitor::new(MonitorConfig::default()).unwrap();
        monitor.ingest_lines((0..500).map(device_line));

        let result = monitor.analyze().unwrap();
        assert_eq!(result.status, AnalysisStatus::Success);
        let bpm = result.bpm.unwrap();
        assert!((bpm - 72.0).abs() < 72.0 * 0.02, "bpm {}", bpm);

        // R = (640/40000) / (1200/50000) = 2/3
        let spo2 = result.spo2.unwrap();
        assert!((spo2 - 93.33).abs() < 0.1, "spo2 {}", spo2);

        let stats = monitor.stats();
        assert_eq!(stats.analyses_run, 1);
        assert_eq!(stats.analyses_succeeded, 1);
    }

    #[test]
    fn test_short_window_reports_insufficient_data() {
        let config = MonitorConfig {
            window_size_samples: 50,
            ..MonitorConfig::default()
        };
        let mut monitor = Monitor::new(config).unwrap();
        monitor.ingest_lines((0..80).map(device_line));

        let result = monitor.analyze().unwrap();
        assert_eq!(result.status, AnalysisStatus::InsufficientData);
        assert_eq!(monitor.stats().analyses_succeeded, 0);
    }

    #[test]
    fn test_no_analysis_without_ppg_pair() {
        let mut config = MonitorConfig::default();
        config.channels.retain(|c| c.channel != Channel::Red);
        let mut monitor = Monitor::new(config).unwrap();
        monitor.ingest_lines((0..200).map(device_line));

        assert!(monitor.snapshot().raw_red.is_none());
        assert!(monitor.analyze().is_none());
    }

    #[test]
    fn test_display_applies_gain_and_polarity() {
        let mut monitor = Monitor::new(MonitorConfig::default()).unwrap();
        monitor.ingest_lines((0..600).map(device_line));

        let snapshot = monitor.snapshot();
        let display = monitor.display();

        let ir = snapshot.channel(Channel::Ir).unwrap();
        let (_, ir_display) = display.iter().find(|(c, _)| *c == Channel::Ir).unwrap();
        for (shown, filtered) in ir_display.iter().zip(&ir.filtered) {
            assert_eq!(*shown, -filtered);
        }

        let ecg = snapshot.channel(Channel::Ecg).unwrap();
        let (_, ecg_display) = display.iter().find(|(c, _)| *c == Channel::Ecg).unwrap();
        assert_eq!(ecg_display.len(), ecg.filtered.len());
        let expected = monitor.smoother().apply(&ecg.filtered.iter().map(|x| 2.0 * x).collect::<Vec<_>>());
        assert_eq!(*ecg_display, expected);
    }

    #[test]
    fn test_ecg_powerline_removed() {
        let mut monitor = Monitor::new(MonitorConfig::default()).unwrap();
        let (mut with_hum, mut without_hum) = (Vec::new(), Vec::new());

        let mut clean = Monitor::new(MonitorConfig::default()).unwrap();
        for i in 0..1500 {
            let t = i as f64 / 100.0;
            let beat = 300.0 * (2.0 * PI * 1.2 * t).sin();
            let hum = 80.0 * (2.0 * PI * 50.0 * t).cos();
            let a = monitor.ingest_line(&format!("{},{},{}", 1800.0 + beat + hum, 50000, 40000)).unwrap();
            let b = clean.ingest_line(&format!("{},{},{}", 1800.0 + beat, 50000, 40000)).unwrap();
            with_hum.push(a.value(Channel::Ecg).unwrap());
            without_hum.push(b.value(Channel::Ecg).unwrap());
        }

        let residual = with_hum[1000..]
            .iter()
            .zip(&without_hum[1000..])
            .fold(0.0f64, |acc, (a, b)| acc.max((a - b).abs()));
        assert!(residual < 1.0, "residual hum {}", residual);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = MonitorConfig::default();
        config.channels[0].filters.push(crate::filters::FilterKind::Notch {
            center_hz: 75.0,
            quality: 30.0,
        });
        let result = Monitor::new(config);
        assert!(matches!(result, Err(e) if e.is_configuration()));
    }

    #[test]
    fn test_timestamp_tracking() {
        let config = MonitorConfig {
            timestamp_field: Some(0),
            channels: vec![
                crate::config::ChannelConfig::ppg(Channel::Ir, 1),
                crate::config::ChannelConfig::ppg(Channel::Red, 2),
            ],
            ..MonitorConfig::default()
        };
        let mut monitor = Monitor::new(config).unwrap();
        monitor.ingest_line("1000,5,6").unwrap();
        monitor.ingest_line("1010,5,6").unwrap();
        assert_eq!(monitor.snapshot().last_timestamp, Some(1010.0));
    }
}
