//! Heart-rate and SpO2 estimation from PPG windows
//!
//! BPM comes from peak spacing on the infrared channel, SpO2 from the
//! ratio of the red and infrared perfusion indices through a linear
//! calibration. Analysis is a pure function of its inputs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Linear calibration `SpO2 = a - b·R`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub a: f64,
    pub b: f64,
}

impl Calibration {
    pub fn new(a: f64, b: f64) -> Self {
        Calibration { a, b }
    }

    /// SpO2 percentage for a ratio of ratios, clamped to `[0, 100]`
    pub fn spo2(&self, r: f64) -> f64 {
        (self.a - self.b * r).clamp(0.0, 100.0)
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration { a: 110.0, b: 25.0 }
    }
}

/// Analyzer parameters as they appear in configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub calibration: Calibration,
    /// Minimum peak distance is `sample_rate / factor` samples
    pub min_peak_distance_factor: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            calibration: Calibration::default(),
            min_peak_distance_factor: 2.5,
        }
    }
}

/// Outcome of one analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStatus {
    Success,
    InsufficientData,
    LengthMismatch,
    NoPeaksDetected,
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AnalysisStatus::Success => "success",
            AnalysisStatus::InsufficientData => "not enough data",
            AnalysisStatus::LengthMismatch => "signal lengths mismatch",
            AnalysisStatus::NoPeaksDetected => "cannot detect peaks",
        };
        f.write_str(text)
    }
}

/// Vital signs for one window; both values present exactly on success
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub bpm: Option<f64>,
    pub spo2: Option<f64>,
    pub status: AnalysisStatus,
}

impl AnalysisResult {
    fn success(bpm: f64, spo2: f64) -> Self {
        AnalysisResult {
            bpm: Some(round2(bpm)),
            spo2: Some(round2(spo2)),
            status: AnalysisStatus::Success,
        }
    }

    fn failure(status: AnalysisStatus) -> Self {
        AnalysisResult {
            bpm: None,
            spo2: None,
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AnalysisStatus::Success
    }

    /// SpO2 above 94 %
    pub fn is_normal_spo2(&self) -> bool {
        self.spo2.map_or(false, |s| s > 94.0)
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// BPM/SpO2 estimator bound to a sample rate and calibration
#[derive(Debug, Clone)]
pub struct Analyzer {
    sample_rate_hz: f64,
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(sample_rate_hz: f64, config: AnalyzerConfig) -> Self {
        Analyzer {
            sample_rate_hz,
            config,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate_hz
    }

    pub fn calibration(&self) -> Calibration {
        self.config.calibration
    }

    /// Change the sample rate used for new analyses
    pub fn update_sample_rate(&mut self, sample_rate_hz: f64) {
        self.sample_rate_hz = sample_rate_hz;
    }

    /// Minimum distance between accepted peaks, in samples
    pub fn min_peak_distance(&self) -> usize {
        let factor = self.config.min_peak_distance_factor;
        let distance = (self.sample_rate_hz / factor).ceil();
        if distance.is_finite() && distance >= 1.0 {
            distance as usize
        } else {
            1
        }
    }

    /// Estimate BPM and SpO2 from raw red and infrared windows
    pub fn analyze(&self, red: &[f64], ir: &[f64]) -> AnalysisResult {
        if red.len() != ir.len() {
            return AnalysisResult::failure(AnalysisStatus::LengthMismatch);
        }
        // At least one second of data; a non-finite rate never qualifies
        if !((ir.len() as f64) >= self.sample_rate_hz) {
            return AnalysisResult::failure(AnalysisStatus::InsufficientData);
        }

        let peaks = find_peaks(ir, self.min_peak_distance());
        if peaks.len() < 2 {
            return AnalysisResult::failure(AnalysisStatus::NoPeaksDetected);
        }

        // Mean of consecutive differences is the overall span over the count
        let mean_interval = (peaks[peaks.len() - 1] - peaks[0]) as f64 / (peaks.len() - 1) as f64;
        let bpm = 60.0 / (mean_interval / self.sample_rate_hz);

        let (ac_red, dc_red) = ac_dc(red);
        let (ac_ir, dc_ir) = ac_dc(ir);
        let r = ratio_of_ratios(ac_red, dc_red, ac_ir, dc_ir);
        let spo2 = self.config.calibration.spo2(r);

        if !(bpm.is_finite() && spo2.is_finite()) {
            return AnalysisResult::failure(AnalysisStatus::InsufficientData);
        }
        AnalysisResult::success(bpm, spo2)
    }
}

/// Stateless analysis with an explicit calibration
pub fn analyze(red: &[f64], ir: &[f64], calibration: Calibration, sample_rate_hz: f64) -> AnalysisResult {
    let config = AnalyzerConfig {
        calibration,
        ..AnalyzerConfig::default()
    };
    Analyzer::new(sample_rate_hz, config).analyze(red, ir)
}

/// Peak-to-peak amplitude and mean of a non-empty window
fn ac_dc(xs: &[f64]) -> (f64, f64) {
    let (min, max) = xs
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    (max - min, mean)
}

/// `(AC_red/DC_red) / (AC_ir/DC_ir)`, zero when any divisor is zero or the
/// ratio overflows
pub fn ratio_of_ratios(ac_red: f64, dc_red: f64, ac_ir: f64, dc_ir: f64) -> f64 {
    if dc_red == 0.0 || dc_ir == 0.0 || ac_ir == 0.0 {
        return 0.0;
    }
    let r = (ac_red / dc_red) / (ac_ir / dc_ir);
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

/// Indices of local maxima at least `distance` samples apart.
///
/// Flat peaks resolve to their middle sample (rounded down) and the first
/// and last samples never count. When two peaks are too close the higher
/// one wins; equal heights keep the later index.
pub fn find_peaks(xs: &[f64], distance: usize) -> Vec<usize> {
    let peaks = local_maxima(xs);
    if distance <= 1 || peaks.len() < 2 {
        return peaks;
    }

    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| xs[peaks[a]].total_cmp(&xs[peaks[b]]));

    let mut keep = vec![true; peaks.len()];
    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        for k in (0..j).rev() {
            if peaks[j] - peaks[k] >= distance {
                break;
            }
            keep[k] = false;
        }
        for k in j + 1..peaks.len() {
            if peaks[k] - peaks[j] >= distance {
                break;
            }
            keep[k] = false;
        }
    }

    peaks
        .into_iter()
        .zip(keep)
        .filter_map(|(p, kept)| kept.then_some(p))
        .collect()
}

fn local_maxima(xs: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if xs.len() < 3 {
        return peaks;
    }

    let last = xs.len() - 1;
    let mut i = 1;
    while i < last {
        if xs[i - 1] < xs[i] {
            let mut ahead = i + 1;
            while ahead < last && xs[ahead] == xs[i] {
                ahead += 1;
            }
            if xs[ahead] < xs[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}
