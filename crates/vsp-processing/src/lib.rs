//! VSP-Processing: Signal conditioning and vital-sign estimation
//!
//! Stateful IIR filters, display smoothing, BPM/SpO2 analysis and the
//! per-channel [`Monitor`] pipeline that ties them together.

pub mod analyzer;
pub mod config;
pub mod filters;
mod linalg;
pub mod pipeline;
pub mod smoother;

pub use analyzer::{
    analyze, find_peaks, ratio_of_ratios, AnalysisResult, AnalysisStatus, Analyzer, AnalyzerConfig,
    Calibration,
};
pub use config::{ChannelConfig, MonitorConfig, ScheduleConfig};
pub use filters::{design, FilterChain, FilterKind, FilterSpec, FilterState};
pub use pipeline::{ChannelWindow, Monitor, MonitorStats, WindowSnapshot};
pub use smoother::{BoundaryMode, Smoother, SmootherConfig};
