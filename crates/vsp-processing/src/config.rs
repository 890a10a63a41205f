//! Monitor configuration
//!
//! Everything the pipeline needs to know about a deployment: sample rate,
//! which record field carries which channel, the filter chain of every
//! channel, display smoothing, analyzer calibration and the stream cadence.

use crate::analyzer::AnalyzerConfig;
use crate::filters::{self, FilterKind, FilterSpec};
use crate::smoother::SmootherConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use vsp_core::{Channel, ChannelMap, VspError, VspResult};

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Nominal device sample rate (Hz)
    pub sample_rate_hz: f64,
    /// Samples kept per display and analysis window
    pub window_size_samples: usize,
    /// Record field carrying a device timestamp, if any
    pub timestamp_field: Option<usize>,
    /// Per-channel routing and conditioning
    pub channels: Vec<ChannelConfig>,
    /// Display smoothing for channels with `smooth` set
    pub smoother: SmootherConfig,
    /// BPM/SpO2 estimation parameters
    pub analyzer: AnalyzerConfig,
    /// Stream cadence
    pub schedule: ScheduleConfig,
}

/// Routing and conditioning of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channel: Channel,
    /// Zero-based field index in the device record
    pub field: usize,
    /// Filters applied in order
    pub filters: Vec<FilterKind>,
    /// Negate the filtered value for display
    pub invert: bool,
    /// Display scale factor
    pub display_gain: f64,
    /// Run the display smoother over this channel's window
    pub smooth: bool,
}

impl ChannelConfig {
    /// ECG: powerline notch, then 0.5-40 Hz band-pass, doubled and smoothed for display
    pub fn ecg(field: usize) -> Self {
        ChannelConfig {
            channel: Channel::Ecg,
            field,
            filters: vec![
                FilterKind::Notch {
                    center_hz: 50.0,
                    quality: 30.0,
                },
                FilterKind::Bandpass {
                    low_hz: 0.5,
                    high_hz: 40.0,
                    order: 2,
                },
            ],
            invert: false,
            display_gain: 2.0,
            smooth: true,
        }
    }

    /// PPG: 0.5-12 Hz band-pass, inverted for display
    pub fn ppg(channel: Channel, field: usize) -> Self {
        ChannelConfig {
            channel,
            field,
            filters: vec![FilterKind::Bandpass {
                low_hz: 0.5,
                high_hz: 12.0,
                order: 2,
            }],
            invert: true,
            display_gain: 1.0,
            smooth: false,
        }
    }

    /// Filter specs at a given sample rate
    pub fn filter_specs(&self, sample_rate_hz: f64) -> Vec<FilterSpec> {
        self.filters
            .iter()
            .map(|kind| FilterSpec::new(sample_rate_hz, *kind))
            .collect()
    }
}

/// Stream cadence in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Consumer display tick
    pub display_tick_ms: u64,
    /// Period between analyses
    pub analysis_period_ms: u64,
    /// Producer source poll interval
    pub poll_interval_ms: u64,
}

impl ScheduleConfig {
    pub fn display_tick(&self) -> Duration {
        Duration::from_millis(self.display_tick_ms)
    }

    pub fn analysis_period(&self) -> Duration {
        Duration::from_millis(self.analysis_period_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            display_tick_ms: 20,
            analysis_period_ms: 500,
            poll_interval_ms: 10,
        }
    }
}

/// Preset configurations
impl MonitorConfig {
    /// Combined ECG + PPG board, records `ecg,ir,red`
    pub fn ecg_ppg() -> Self {
        MonitorConfig {
            sample_rate_hz: 100.0,
            window_size_samples: 500,
            timestamp_field: None,
            channels: vec![
                ChannelConfig::ecg(0),
                ChannelConfig::ppg(Channel::Ir, 1),
                ChannelConfig::ppg(Channel::Red, 2),
            ],
            smoother: SmootherConfig::default(),
            analyzer: AnalyzerConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }

    /// Pulse oximeter only, records `ir,red`
    pub fn ppg_only() -> Self {
        MonitorConfig {
            channels: vec![
                ChannelConfig::ppg(Channel::Ir, 0),
                ChannelConfig::ppg(Channel::Red, 1),
            ],
            ..Self::ecg_ppg()
        }
    }

    /// Record layout implied by the channel list
    pub fn channel_map(&self) -> ChannelMap {
        ChannelMap {
            fields: self.channels.iter().map(|c| (c.channel, c.field)).collect(),
            timestamp_field: self.timestamp_field,
        }
    }

    /// Configuration of one channel
    pub fn channel(&self, channel: Channel) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.channel == channel)
    }

    /// True when both PPG channels are mapped, so analysis can run
    pub fn has_ppg_pair(&self) -> bool {
        self.channel(Channel::Ir).is_some() && self.channel(Channel::Red).is_some()
    }

    /// Validate entire configuration
    pub fn validate(&self) -> VspResult<()> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(VspError::configuration("Sample rate must be positive"));
        }

        if self.window_size_samples == 0 {
            return Err(VspError::configuration("Window size must be greater than 0"));
        }

        self.channel_map().validate()?;

        for channel in &self.channels {
            if !channel.display_gain.is_finite() {
                return Err(VspError::configuration(format!(
                    "Channel {} display gain must be finite",
                    channel.channel
                )));
            }

            for spec in channel.filter_specs(self.sample_rate_hz) {
                filters::design(&spec).map_err(|e| {
                    VspError::configuration(format!(
                        "Channel {} filter '{}' invalid: {}",
                        channel.channel,
                        spec.kind.label(),
                        e
                    ))
                })?;
            }
        }

        let calibration = self.analyzer.calibration;
        if !(calibration.a.is_finite() && calibration.b.is_finite()) {
            return Err(VspError::configuration("SpO2 calibration must be finite"));
        }

        if !(self.analyzer.min_peak_distance_factor > 0.0) {
            return Err(VspError::configuration(
                "Minimum peak distance factor must be positive",
            ));
        }

        if self.schedule.display_tick_ms == 0 {
            return Err(VspError::configuration("Display tick must be greater than 0"));
        }

        if self.schedule.analysis_period_ms == 0 {
            return Err(VspError::configuration("Analysis period must be greater than 0"));
        }

        if self.schedule.poll_interval_ms == 0 {
            return Err(VspError::configuration("Poll interval must be greater than 0"));
        }

        Ok(())
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> VspResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Import configuration from JSON
    pub fn from_json(json: &str) -> VspResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> VspResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::ecg_ppg()
    }
}
