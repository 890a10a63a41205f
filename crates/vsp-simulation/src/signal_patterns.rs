//! Pre-defined cardiac waveform shapes
//!
//! Every pattern is a function of the cardiac phase in `[0, 1)` and is
//! periodic, so consecutive beats join without a step.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Gaussian bump on the phase circle
fn wave(phase: f64, center: f64, width: f64) -> f64 {
    let d = (phase - center).rem_euclid(1.0);
    let d = d.min(1.0 - d);
    (-(d / width).powi(2)).exp()
}

/// Beat-synchronous waveform shapes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SignalPattern {
    /// Pure sinusoid between 0 and 1
    Sinusoidal,
    /// Photoplethysmogram: systolic upstroke, slow diastolic run-off and a
    /// dicrotic wave of relative height `dicrotic_amplitude`
    Ppg { dicrotic_amplitude: f64 },
    /// PQRST complex with unit R wave
    Ecg,
}

impl SignalPattern {
    /// Waveform value at a cardiac phase
    pub fn value_at_phase(&self, phase: f64) -> f64 {
        let phase = phase.rem_euclid(1.0);
        match self {
            SignalPattern::Sinusoidal => 0.5 + 0.5 * (2.0 * PI * phase).sin(),

            SignalPattern::Ppg { dicrotic_amplitude } => {
                let systolic = wave(phase, 0.25, 0.08);
                let runoff = 0.35 * wave(phase, 0.42, 0.22);
                let dicrotic = dicrotic_amplitude * wave(phase, 0.55, 0.06);
                systolic + runoff + dicrotic
            }

            SignalPattern::Ecg => {
                0.12 * wave(phase, 0.20, 0.025) - 0.10 * wave(phase, 0.37, 0.010)
                    + wave(phase, 0.40, 0.012)
                    - 0.20 * wave(phase, 0.43, 0.010)
                    + 0.30 * wave(phase, 0.65, 0.045)
            }
        }
    }

    /// Mean value over one beat
    pub fn cycle_mean(&self) -> f64 {
        const POINTS: usize = 1000;
        (0..POINTS)
            .map(|i| self.value_at_phase(i as f64 / POINTS as f64))
            .sum::<f64>()
            / POINTS as f64
    }

    /// Get pattern description
    pub fn description(&self) -> &'static str {
        match self {
            SignalPattern::Sinusoidal => "Sinusoidal pulse",
            SignalPattern::Ppg { .. } => "Photoplethysmogram",
            SignalPattern::Ecg => "Electrocardiogram",
        }
    }

    /// Default PPG shape
    pub fn ppg() -> Self {
        SignalPattern::Ppg {
            dicrotic_amplitude: 0.25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argmax(pattern: SignalPattern) -> f64 {
        (0..1000)
            .map(|i| i as f64 / 1000.0)
            .max_by(|a, b| pattern.value_at_phase(*a).total_cmp(&pattern.value_at_phase(*b)))
            .unwrap()
    }

    #[test]
    fn test_patterns_are_periodic() {
        for pattern in [SignalPattern::Sinusoidal, SignalPattern::ppg(), SignalPattern::Ecg] {
            let start = pattern.value_at_phase(0.0);
            let end = pattern.value_at_phase(0.999_999);
            assert!((start - end).abs() < 1e-3, "{}", pattern.description());
            assert!((pattern.value_at_phase(0.3) - pattern.value_at_phase(1.3)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_ppg_peak_is_systolic() {
        let peak = argmax(SignalPattern::ppg());
        assert!((peak - 0.25).abs() < 0.03, "peak at {}", peak);
        let mean = SignalPattern::ppg().cycle_mean();
        assert!(mean > 0.0 && mean < 0.5);
    }

    #[test]
    fn test_ecg_r_wave_dominates() {
        let peak = argmax(SignalPattern::Ecg);
        assert!((peak - 0.40).abs() < 0.01);
        assert!(SignalPattern::Ecg.value_at_phase(0.43) < 0.0);
        assert!((SignalPattern::Sinusoidal.cycle_mean() - 0.5).abs() < 1e-9);
    }
}
