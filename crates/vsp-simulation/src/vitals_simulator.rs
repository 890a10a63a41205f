//! Synthetic ECG/PPG device
//!
//! Produces device lines in the same comma-separated layout a real board
//! emits, with a known heart rate and a red/infrared amplitude ratio chosen
//! so the linear SpO2 calibration maps back to the configured saturation.

use crate::signal_patterns::SignalPattern;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::debug;
use vsp_core::{Channel, ChannelMap, Clock, SamplePacer, SampleSource, VspError, VspResult};

/// Noise configuration; amplitudes are fractions of each channel's pulse amplitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Gaussian noise standard deviation (0.0 = no noise)
    pub gaussian_std: f64,
    /// Baseline wander amplitude
    pub baseline_wander: f64,
    /// Baseline wander frequency (Hz)
    pub wander_freq_hz: f64,
    /// Powerline pickup on the ECG lead
    pub powerline_amplitude: f64,
}

impl NoiseConfig {
    /// Clean signal
    pub fn none() -> Self {
        NoiseConfig {
            gaussian_std: 0.0,
            baseline_wander: 0.0,
            wander_freq_hz: 0.2,
            powerline_amplitude: 0.0,
        }
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        NoiseConfig {
            gaussian_std: 0.01,
            baseline_wander: 0.05,
            wander_freq_hz: 0.2,
            powerline_amplitude: 0.1,
        }
    }
}

/// Configuration for vital-sign simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsConfig {
    /// Sampling rate in Hz
    pub sample_rate_hz: f64,
    /// Simulated heart rate
    pub heart_rate_bpm: f64,
    /// Simulated oxygen saturation (%)
    pub spo2_percent: f64,
    /// Calibration `(a, b)` of `SpO2 = a - b·R` used to derive the red amplitude
    pub spo2_calibration: (f64, f64),
    /// Record layout to emit
    pub layout: ChannelMap,
    /// ECG baseline and R-wave amplitude (ADC counts)
    pub ecg_baseline: f64,
    pub ecg_amplitude: f64,
    /// Infrared DC level and pulse amplitude (ADC counts)
    pub ir_dc: f64,
    pub ir_ac: f64,
    /// Red DC level (ADC counts); the red pulse amplitude is derived
    pub red_dc: f64,
    /// Powerline frequency, if any pickup is simulated
    pub powerline_freq: Option<f64>,
    /// Noise configuration
    pub noise: NoiseConfig,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

impl Default for VitalsConfig {
    fn default() -> Self {
        VitalsConfig {
            sample_rate_hz: 100.0,
            heart_rate_bpm: 72.0,
            spo2_percent: 97.0,
            spo2_calibration: (110.0, 25.0),
            layout: ChannelMap::ecg_ir_red(),
            ecg_baseline: 1800.0,
            ecg_amplitude: 600.0,
            ir_dc: 50_000.0,
            ir_ac: 1_000.0,
            red_dc: 40_000.0,
            powerline_freq: Some(50.0),
            noise: NoiseConfig::default(),
            seed: None,
        }
    }
}

impl VitalsConfig {
    /// Ratio of ratios that yields the configured saturation
    pub fn target_ratio(&self) -> f64 {
        let (a, b) = self.spo2_calibration;
        (a - self.spo2_percent) / b
    }

    /// Red pulse amplitude giving [`VitalsConfig::target_ratio`]
    pub fn red_ac(&self) -> f64 {
        self.target_ratio() * (self.ir_ac / self.ir_dc) * self.red_dc
    }

    pub fn validate(&self) -> VspResult<()> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(VspError::configuration("Sampling rate must be positive"));
        }
        if !(self.heart_rate_bpm > 0.0 && self.heart_rate_bpm <= 300.0) {
            return Err(VspError::configuration(format!(
                "Heart rate {} BPM outside (0, 300]",
                self.heart_rate_bpm
            )));
        }
        if self.spo2_calibration.1 <= 0.0 {
            return Err(VspError::configuration("Calibration slope must be positive"));
        }
        if !(0.0..=100.0).contains(&self.spo2_percent) || self.target_ratio() < 0.0 {
            return Err(VspError::configuration(format!(
                "SpO2 {} % cannot be represented by the calibration",
                self.spo2_percent
            )));
        }
        if self.ir_dc <= 0.0 || self.red_dc <= 0.0 || self.ir_ac <= 0.0 {
            return Err(VspError::configuration("PPG levels must be positive"));
        }
        if self.noise.gaussian_std < 0.0 {
            return Err(VspError::configuration("Noise level must not be negative"));
        }
        self.layout.validate()
    }
}

/// Vital-sign simulator
pub struct VitalsSimulator {
    config: VitalsConfig,
    rng: StdRng,
    normal_dist: Normal<f64>,
    ppg: SignalPattern,
    ppg_mean: f64,
    sample_index: u64,
}

impl VitalsSimulator {
    /// Create new simulator with configuration
    pub fn new(config: VitalsConfig) -> VspResult<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let normal_dist = Normal::new(0.0, config.noise.gaussian_std)
            .map_err(|e| VspError::configuration(format!("Invalid noise distribution: {}", e)))?;

        let ppg = SignalPattern::ppg();
        debug!(
            bpm = config.heart_rate_bpm,
            spo2 = config.spo2_percent,
            ratio = config.target_ratio(),
            "Vitals simulator created"
        );

        Ok(VitalsSimulator {
            ppg_mean: ppg.cycle_mean(),
            ppg,
            config,
            rng,
            normal_dist,
            sample_index: 0,
        })
    }

    pub fn config(&self) -> &VitalsConfig {
        &self.config
    }

    /// Samples generated so far
    pub fn samples_generated(&self) -> u64 {
        self.sample_index
    }

    /// Restart from time zero
    pub fn reset_time(&mut self) {
        self.sample_index = 0;
    }

    /// Channel values for the next tick
    pub fn next_values(&mut self) -> Vec<(Channel, f64)> {
        let t = self.sample_index as f64 / self.config.sample_rate_hz;
        let phase = (t * self.config.heart_rate_bpm / 60.0).fract();
        self.sample_index += 1;

        let channels = self.config.layout.channels();
        channels
            .into_iter()
            .map(|channel| {
                let value = self.channel_value(channel, t, phase);
                (channel, value)
            })
            .collect()
    }

    fn channel_value(&mut self, channel: Channel, t: f64, phase: f64) -> f64 {
        let noise = self.config.noise;
        let wander = noise.baseline_wander * (2.0 * PI * noise.wander_freq_hz * t).sin();

        let (clean, amplitude) = match channel {
            Channel::Ecg => {
                let mut v = self.config.ecg_baseline
                    + self.config.ecg_amplitude * SignalPattern::Ecg.value_at_phase(phase);
                if let Some(freq) = self.config.powerline_freq {
                    v += noise.powerline_amplitude
                        * self.config.ecg_amplitude
                        * (2.0 * PI * freq * t).cos();
                }
                (v, self.config.ecg_amplitude)
            }
            // Pulse centered on its cycle mean so the window mean tracks the DC level
            Channel::Ir => {
                let shape = self.ppg.value_at_phase(phase) - self.ppg_mean;
                (self.config.ir_dc + self.config.ir_ac * shape, self.config.ir_ac)
            }
            Channel::Red => {
                let red_ac = self.config.red_ac();
                let shape = self.ppg.value_at_phase(phase) - self.ppg_mean;
                (self.config.red_dc + red_ac * shape, red_ac)
            }
        };

        clean + amplitude * (wander + self.normal_dist.sample(&mut self.rng))
    }

    /// Next device line in the configured layout
    pub fn next_line(&mut self) -> String {
        let layout = &self.config.layout;
        let mut fields = vec![String::from("0"); layout.required_fields()];

        if let Some(field) = layout.timestamp_field {
            // Device millisecond counter
            let millis = self.sample_index as f64 * 1000.0 / self.config.sample_rate_hz;
            fields[field] = format!("{}", millis.round() as u64);
        }

        let mapping = layout.fields.clone();
        for (channel, value) in self.next_values() {
            if let Some((_, field)) = mapping.iter().find(|(c, _)| *c == channel) {
                fields[*field] = format!("{:.2}", value);
            }
        }
        fields.join(",")
    }

    /// Generate a batch of lines
    pub fn generate_lines(&mut self, count: usize) -> Vec<String> {
        (0..count).map(|_| self.next_line()).collect()
    }
}

/// Simulator paced in real time by a clock
pub struct SimulatedSource {
    simulator: VitalsSimulator,
    clock: Arc<dyn Clock>,
    pacer: SamplePacer,
    limit: Option<u64>,
    closed: bool,
}

impl SimulatedSource {
    pub fn new(simulator: VitalsSimulator, clock: Arc<dyn Clock>) -> Self {
        let pacer = SamplePacer::new(simulator.config().sample_rate_hz);
        SimulatedSource {
            simulator,
            clock,
            pacer,
            limit: None,
            closed: false,
        }
    }

    /// Stop after `samples` lines
    pub fn with_limit(mut self, samples: u64) -> Self {
        self.limit = Some(samples);
        self
    }

    pub fn simulator(&self) -> &VitalsSimulator {
        &self.simulator
    }
}

impl SampleSource for SimulatedSource {
    fn poll_lines(&mut self, out: &mut Vec<String>) -> VspResult<usize> {
        if self.closed {
            return Ok(0);
        }

        let mut due = self.pacer.due(self.clock.now()) as u64;
        if let Some(limit) = self.limit {
            due = due.min(limit.saturating_sub(self.simulator.samples_generated()));
        }

        for _ in 0..due {
            out.push(self.simulator.next_line());
        }
        Ok(due as usize)
    }

    fn is_exhausted(&self) -> bool {
        self.closed
            || self
                .limit
                .map_or(false, |limit| self.simulator.samples_generated() >= limit)
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn name(&self) -> &str {
        "simulator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vsp_core::ManualClock;
    use vsp_processing::{AnalysisStatus, Monitor, MonitorConfig};

    fn clean_config() -> VitalsConfig {
        VitalsConfig {
            noise: NoiseConfig::none(),
            seed: Some(7),
            ..VitalsConfig::default()
        }
    }

    #[test]
    fn test_lines_follow_layout() {
        let mut simulator = VitalsSimulator::new(clean_config()).unwrap();
        let line = simulator.next_line();
        let record = ChannelMap::ecg_ir_red().parse(&line).unwrap();

        assert!(record.value(Channel::Ecg).unwrap() > 1000.0);
        assert!((record.value(Channel::Ir).unwrap() - 50_000.0).abs() < 2_000.0);
        assert!((record.value(Channel::Red).unwrap() - 40_000.0).abs() < 2_000.0);
        assert_eq!(simulator.samples_generated(), 1);
    }

    #[test]
    fn test_timestamped_ppg_layout() {
        let config = VitalsConfig {
            layout: ChannelMap::new(vec![(Channel::Ir, 1), (Channel::Red, 2)]).with_timestamp(0),
            ..clean_config()
        };
        let mut simulator = VitalsSimulator::new(config.clone()).unwrap();
        let lines = simulator.generate_lines(3);

        let record = config.layout.parse(&lines[2]).unwrap();
        assert_eq!(record.timestamp, Some(20.0));
        assert_eq!(record.value(Channel::Ecg), None);
        assert_eq!(lines[0].split(',').count(), 3);
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let config = VitalsConfig {
            seed: Some(42),
            ..VitalsConfig::default()
        };
        let a = VitalsSimulator::new(config.clone()).unwrap().generate_lines(50);
        let b = VitalsSimulator::new(config).unwrap().generate_lines(50);
        assert_eq!(a, b);
    }

    #[test]
    fn test_red_amplitude_matches_ratio() {
        let config = VitalsConfig::default();
        assert!((config.target_ratio() - 0.52).abs() < 1e-12);
        // R = (red_ac / red_dc) / (ir_ac / ir_dc)
        let r = (config.red_ac() / config.red_dc) / (config.ir_ac / config.ir_dc);
        assert!((r - 0.52).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = VitalsConfig::default();
        config.heart_rate_bpm = 0.0;
        assert!(VitalsSimulator::new(config).is_err());

        let mut config = VitalsConfig::default();
        config.spo2_percent = 120.0;
        assert!(VitalsSimulator::new(config).is_err());

        let mut config = VitalsConfig::default();
        config.sample_rate_hz = -1.0;
        assert!(VitalsSimulator::new(config).is_err());

        let mut config = VitalsConfig::default();
        config.noise.gaussian_std = -0.1;
        assert!(VitalsSimulator::new(config).is_err());
    }

    #[test]
    fn test_source_is_paced_by_clock() {
        let clock = Arc::new(ManualClock::new());
        let simulator = VitalsSimulator::new(clean_config()).unwrap();
        let mut source = SimulatedSource::new(simulator, clock.clone()).with_limit(30);
        let mut out = Vec::new();

        assert_eq!(source.poll_lines(&mut out).unwrap(), 0);
        clock.advance(Duration::from_millis(100));
        assert_eq!(source.poll_lines(&mut out).unwrap(), 10);
        clock.advance(Duration::from_secs(1));
        assert_eq!(source.poll_lines(&mut out).unwrap(), 20);
        assert!(source.is_exhausted());
        assert_eq!(out.len(), 30);

        source.close();
        clock.advance(Duration::from_secs(1));
        assert_eq!(source.poll_lines(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_monitor_recovers_vitals() {
        for (bpm, spo2) in [(75.0, 97.0), (60.0, 92.0), (96.0, 99.0)] {
            let config = VitalsConfig {
                heart_rate_bpm: bpm,
                spo2_percent: spo2,
                ..clean_config()
            };
            let mut simulator = VitalsSimulator::new(config).unwrap();
            let mut monitor = Monitor::new(MonitorConfig::default()).unwrap();

            monitor.ingest_lines(simulator.generate_lines(800));
            let result = monitor.analyze().unwrap();

            assert_eq!(result.status, AnalysisStatus::Success, "bpm {}", bpm);
            let measured_bpm = result.bpm.unwrap();
            let measured_spo2 = result.spo2.unwrap();
            assert!((measured_bpm - bpm).abs() <= bpm * 0.02, "bpm {} vs {}", measured_bpm, bpm);
            assert!((measured_spo2 - spo2).abs() < 0.5, "spo2 {} vs {}", measured_spo2, spo2);
        }
    }

    #[test]
    fn test_ppg_only_monitor_with_baseline_wander() {
        let config = VitalsConfig {
            layout: ChannelMap::ir_red(),
            noise: NoiseConfig {
                baseline_wander: 0.05,
                ..NoiseConfig::none()
            },
            ..clean_config()
        };
        let mut simulator = VitalsSimulator::new(config).unwrap();
        let mut monitor = Monitor::new(MonitorConfig::ppg_only()).unwrap();
        monitor.ingest_lines(simulator.generate_lines(1000));

        let snapshot = monitor.snapshot();
        assert!(snapshot.warm);
        assert!(snapshot.channel(Channel::Ecg).is_none());

        let result = monitor.analyze().unwrap();
        assert_eq!(result.status, AnalysisStatus::Success);
        assert!((result.bpm.unwrap() - 72.0).abs() <= 72.0 * 0.02);
    }
}
