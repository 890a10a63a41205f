//! Command line interface

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use vsp_core::{Clock, SampleSource};
use vsp_processing::MonitorConfig;
use vsp_simulation::{NoiseConfig, SimulatedSource, VitalsConfig, VitalsSimulator};

use crate::source::{ReaderSource, ReplaySource};

/// Headless ECG/PPG vital-sign monitor
#[derive(Debug, Parser)]
#[command(name = "vitals-monitor", version)]
pub struct Cli {
    /// JSON configuration file (defaults to the built-in ECG + PPG preset)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Use the PPG-only preset (`ir,red` records)
    #[arg(long, global = true, conflicts_with = "config")]
    pub ppg_only: bool,

    /// Stop after this many seconds
    #[arg(long, global = true)]
    pub duration_secs: Option<f64>,

    /// Print the effective configuration as JSON and exit
    #[arg(long, global = true)]
    pub print_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Play back a recorded CSV capture in real time
    Replay {
        /// Capture file, one record per line
        path: PathBuf,
        /// Restart from the beginning when the capture ends
        #[arg(long)]
        loop_playback: bool,
    },
    /// Read device lines from standard input
    Stdin,
    /// Run the built-in signal simulator
    Simulate {
        #[arg(long, default_value_t = 72.0)]
        bpm: f64,
        #[arg(long, default_value_t = 97.0)]
        spo2: f64,
        /// Gaussian noise as a fraction of the pulse amplitude
        #[arg(long, default_value_t = 0.0)]
        noise: f64,
        #[arg(long)]
        seed: Option<u64>,
    },
}

impl Cli {
    /// Configuration selected by the flags, validated
    pub fn resolve_config(&self) -> anyhow::Result<MonitorConfig> {
        let config = match &self.config {
            Some(path) => MonitorConfig::from_file(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None if self.ppg_only => MonitorConfig::ppg_only(),
            None => MonitorConfig::ecg_ppg(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Open the sample source for the chosen subcommand
    pub fn open_source(
        &self,
        config: &MonitorConfig,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Box<dyn SampleSource>> {
        let default_command = Command::Simulate {
            bpm: 72.0,
            spo2: 97.0,
            noise: 0.0,
            seed: None,
        };

        let source: Box<dyn SampleSource> = match self.command.as_ref().unwrap_or(&default_command) {
            Command::Replay {
                path,
                loop_playback,
            } => {
                let replay = ReplaySource::open(path, &config.channel_map(), config.sample_rate_hz, clock)
                    .with_context(|| format!("opening capture {}", path.display()))?;
                Box::new(replay.with_loop(*loop_playback))
            }
            Command::Stdin => Box::new(ReaderSource::stdin()),
            Command::Simulate {
                bpm,
                spo2,
                noise,
                seed,
            } => {
                let vitals = VitalsConfig {
                    sample_rate_hz: config.sample_rate_hz,
                    heart_rate_bpm: *bpm,
                    spo2_percent: *spo2,
                    spo2_calibration: (config.analyzer.calibration.a, config.analyzer.calibration.b),
                    layout: config.channel_map(),
                    noise: NoiseConfig {
                        gaussian_std: *noise,
                        ..NoiseConfig::default()
                    },
                    seed: *seed,
                    ..VitalsConfig::default()
                };
                let simulator = VitalsSimulator::new(vitals).context("configuring simulator")?;
                Box::new(SimulatedSource::new(simulator, clock))
            }
        };
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsp_core::{Channel, ManualClock};

    #[test]
    fn test_parse_replay() {
        let cli = Cli::parse_from(["vitals-monitor", "replay", "capture.csv", "--loop-playback"]);
        match cli.command {
            Some(Command::Replay { path, loop_playback }) => {
                assert_eq!(path, PathBuf::from("capture.csv"));
                assert!(loop_playback);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["vitals-monitor", "simulate", "--bpm", "90", "--ppg-only", "--duration-secs", "5"]);
        assert!(cli.ppg_only);
        assert_eq!(cli.duration_secs, Some(5.0));
        assert!(matches!(cli.command, Some(Command::Simulate { bpm, .. }) if bpm == 90.0));

        let config = cli.resolve_config().unwrap();
        assert!(config.channel(Channel::Ecg).is_none());
    }

    #[test]
    fn test_config_and_ppg_only_conflict() {
        let result = Cli::try_parse_from(["vitals-monitor", "--config", "a.json", "--ppg-only"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.json");
        let mut config = MonitorConfig::default();
        config.window_size_samples = 300;
        std::fs::write(&path, config.to_json().unwrap()).unwrap();

        let cli = Cli::parse_from(["vitals-monitor", "--config", path.to_str().unwrap(), "--print-config"]);
        assert!(cli.print_config);
        assert!(cli.command.is_none());
        assert_eq!(cli.resolve_config().unwrap().window_size_samples, 300);

        let cli = Cli::parse_from(["vitals-monitor", "--config", "/nonexistent.json"]);
        assert!(cli.resolve_config().is_err());
    }

    #[test]
    fn test_simulator_follows_config_layout() {
        let cli = Cli::parse_from(["vitals-monitor", "--ppg-only", "simulate", "--seed", "3"]);
        let config = cli.resolve_config().unwrap();
        let clock = Arc::new(ManualClock::new());
        let mut source = cli.open_source(&config, clock.clone()).unwrap();

        let mut lines = Vec::new();
        source.poll_lines(&mut lines).unwrap();
        clock.advance(std::time::Duration::from_millis(50));
        source.poll_lines(&mut lines).unwrap();

        assert_eq!(lines.len(), 5);
        assert!(config.channel_map().parse(&lines[0]).is_ok());
        assert_eq!(source.name(), "simulator");
    }

    #[test]
    fn test_missing_capture_is_an_error() {
        let cli = Cli::parse_from(["vitals-monitor", "replay", "/nonexistent/capture.csv"]);
        let config = cli.resolve_config().unwrap();
        assert!(cli.open_source(&config, Arc::new(ManualClock::new())).is_err());
    }
}
