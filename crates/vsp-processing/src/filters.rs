//! Causal IIR filters for biosignal conditioning
//!
//! Coefficients are designed once from a [`FilterSpec`]; the running memory
//! lives in an explicit [`FilterState`] owned by a single channel. Feeding a
//! stream through [`FilterState::process_sample`] one value at a time gives
//! the same output as filtering the whole stream with
//! [`FilterState::filter_block`].

use num_complex::Complex64;
use sci_rs::signal::filter::design::{butter_dyn, DigitalFilter, FilterBandType, FilterOutputType};
use sci_rs::signal::filter::lfilter_zi_dyn;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use vsp_core::{VspError, VspResult};

/// Filter kinds supported by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterKind {
    /// Second-order notch for powerline interference
    Notch {
        /// Frequency to remove (Hz)
        center_hz: f64,
        /// Quality factor, center / bandwidth
        quality: f64,
    },
    /// Butterworth band-pass
    Bandpass {
        /// Lower cutoff (Hz)
        low_hz: f64,
        /// Upper cutoff (Hz)
        high_hz: f64,
        /// Prototype order; the digital filter has order 2N
        order: usize,
    },
}

impl FilterKind {
    /// Short label for logs
    pub fn label(&self) -> String {
        match self {
            FilterKind::Notch { center_hz, quality } => {
                format!("notch {:.1}Hz Q={:.1}", center_hz, quality)
            }
            FilterKind::Bandpass { low_hz, high_hz, order } => {
                format!("bandpass {:.2}-{:.1}Hz N={}", low_hz, high_hz, order)
            }
        }
    }
}

/// Immutable description of one filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Sampling rate of the stream (Hz)
    pub sample_rate_hz: f64,
    /// Kind and kind-specific parameters
    pub kind: FilterKind,
}

impl FilterSpec {
    pub fn new(sample_rate_hz: f64, kind: FilterKind) -> Self {
        FilterSpec { sample_rate_hz, kind }
    }

    /// Notch filter specification
    pub fn notch(sample_rate_hz: f64, center_hz: f64, quality: f64) -> Self {
        Self::new(sample_rate_hz, FilterKind::Notch { center_hz, quality })
    }

    /// Band-pass filter specification
    pub fn bandpass(sample_rate_hz: f64, low_hz: f64, high_hz: f64, order: usize) -> Self {
        Self::new(sample_rate_hz, FilterKind::Bandpass { low_hz, high_hz, order })
    }

    /// Nyquist frequency of the stream
    pub fn nyquist(&self) -> f64 {
        self.sample_rate_hz / 2.0
    }

    /// Check parameters without designing
    pub fn validate(&self) -> VspResult<()> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(VspError::invalid_spec(format!(
                "sample rate must be positive, got {}",
                self.sample_rate_hz
            )));
        }
        let nyquist = self.nyquist();

        match self.kind {
            FilterKind::Notch { center_hz, quality } => {
                // A notch exactly at Nyquist is allowed (50 Hz at 100 Hz sampling)
                if !(center_hz > 0.0 && center_hz <= nyquist) {
                    return Err(VspError::invalid_spec(format!(
                        "notch center {} Hz must be in (0, {}] Hz",
                        center_hz, nyquist
                    )));
                }
                if !(quality.is_finite() && quality > 0.0) {
                    return Err(VspError::invalid_spec(format!(
                        "notch quality factor must be positive, got {}",
                        quality
                    )));
                }
            }
            FilterKind::Bandpass { low_hz, high_hz, order } => {
                if order < 1 {
                    return Err(VspError::invalid_spec("bandpass order must be at least 1"));
                }
                if !(low_hz > 0.0) {
                    return Err(VspError::invalid_spec(format!(
                        "low cutoff must be positive, got {} Hz",
                        low_hz
                    )));
                }
                if low_hz >= high_hz {
                    return Err(VspError::invalid_spec(format!(
                        "low cutoff {} Hz must be below high cutoff {} Hz",
                        low_hz, high_hz
                    )));
                }
                if high_hz >= nyquist {
                    return Err(VspError::invalid_spec(format!(
                        "high cutoff {} Hz must be below Nyquist {} Hz",
                        high_hz, nyquist
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Design coefficients for a spec and initialize the memory to the unit-step
/// steady state
pub fn design(spec: &FilterSpec) -> VspResult<FilterState> {
    spec.validate()?;

    let (b, a) = match spec.kind {
        FilterKind::Notch { center_hz, quality } => {
            notch_coefficients(center_hz, quality, spec.sample_rate_hz)
        }
        FilterKind::Bandpass { low_hz, high_hz, order } => {
            butterworth_bandpass_coefficients(low_hz, high_hz, order, spec.sample_rate_hz)?
        }
    };

    FilterState::from_coefficients(*spec, b, a)
}

/// Coefficients plus running memory for one channel
#[derive(Debug, Clone)]
pub struct FilterState {
    spec: FilterSpec,
    b: Vec<f64>,
    a: Vec<f64>,
    zi: Vec<f64>,
    zi_step: Vec<f64>,
}

impl FilterState {
    fn from_coefficients(spec: FilterSpec, mut b: Vec<f64>, mut a: Vec<f64>) -> VspResult<Self> {
        let a0 = a[0];
        if a0 == 0.0 || !a0.is_finite() {
            return Err(VspError::invalid_spec("leading denominator coefficient is zero"));
        }
        let len = b.len().max(a.len());
        b.resize(len, 0.0);
        a.resize(len, 0.0);
        b.iter_mut().for_each(|c| *c /= a0);
        a.iter_mut().for_each(|c| *c /= a0);

        if b.iter().chain(&a).any(|c| !c.is_finite()) {
            return Err(VspError::invalid_spec(format!(
                "{} produced non-finite coefficients",
                spec.kind.label()
            )));
        }

        // Unit-step steady state: (I - Aᵀ)·zi = b[1:] - a[1:]·b[0]
        let zi_step = lfilter_zi_dyn(&b, &a);
        if zi_step.len() != len - 1 || zi_step.iter().any(|z| !z.is_finite()) {
            return Err(VspError::invalid_spec(format!(
                "{} has no step steady state",
                spec.kind.label()
            )));
        }

        Ok(FilterState {
            spec,
            zi: zi_step.clone(),
            zi_step,
            b,
            a,
        })
    }

    /// Spec this state was designed from
    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    /// Numerator coefficients, normalized so `a[0] == 1`
    pub fn numerator(&self) -> &[f64] {
        &self.b
    }

    /// Denominator coefficients, `a[0] == 1`
    pub fn denominator(&self) -> &[f64] {
        &self.a
    }

    /// Order of the digital filter
    pub fn order(&self) -> usize {
        self.a.len() - 1
    }

    /// Current memory, one element shorter than the coefficient vectors
    pub fn memory(&self) -> &[f64] {
        &self.zi
    }

    /// Filter one sample and advance the memory
    #[inline]
    pub fn process_sample(&mut self, x: f64) -> f64 {
        let n = self.zi.len();
        if n == 0 {
            return self.b[0] * x;
        }

        // Transposed direct form II
        let y = self.b[0] * x + self.zi[0];
        for i in 0..n - 1 {
            self.zi[i] = self.b[i + 1] * x + self.zi[i + 1] - self.a[i + 1] * y;
        }
        self.zi[n - 1] = self.b[n] * x - self.a[n] * y;
        y
    }

    /// Filter a contiguous block starting from the current memory
    pub fn filter_block(&mut self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.process_sample(x)).collect()
    }

    /// Restore the unit-step steady state, discarding history
    pub fn reset(&mut self) {
        self.zi.copy_from_slice(&self.zi_step);
    }

    /// Set the memory to the steady state of a constant input `x0`
    pub fn prime(&mut self, x0: f64) {
        for (z, step) in self.zi.iter_mut().zip(&self.zi_step) {
            *z = step * x0;
        }
    }

    /// Magnitude response at a frequency in Hz
    pub fn gain_at(&self, freq_hz: f64) -> f64 {
        let w = 2.0 * PI * freq_hz / self.spec.sample_rate_hz;
        let z_inv = Complex64::from_polar(1.0, -w);

        let eval = |coeffs: &[f64]| {
            coeffs
                .iter()
                .rev()
                .fold(Complex64::new(0.0, 0.0), |acc, &c| acc * z_inv + c)
        };
        (eval(&self.b) / eval(&self.a)).norm()
    }
}

/// Second-order notch (bilinear design with -3 dB bandwidth `center / quality`)
fn notch_coefficients(center_hz: f64, quality: f64, fs: f64) -> (Vec<f64>, Vec<f64>) {
    let w0 = 2.0 * PI * center_hz / fs;
    let bw = w0 / quality;

    let beta = (bw / 2.0).tan();
    let gain = 1.0 / (1.0 + beta);
    let cos_w0 = w0.cos();

    let b = vec![gain, -2.0 * gain * cos_w0, gain];
    let a = vec![1.0, -2.0 * gain * cos_w0, 2.0 * gain - 1.0];
    (b, a)
}

/// Butterworth band-pass in transfer-function form, cutoffs normalized to Nyquist
fn butterworth_bandpass_coefficients(
    low_hz: f64,
    high_hz: f64,
    order: usize,
    fs: f64,
) -> VspResult<(Vec<f64>, Vec<f64>)> {
    let nyquist = fs / 2.0;
    let filter = butter_dyn(
        order,
        vec![low_hz / nyquist, high_hz / nyquist],
        Some(FilterBandType::Bandpass),
        Some(false),
        Some(FilterOutputType::Ba),
        None,
    );

    match filter {
        DigitalFilter::Ba(ba) => Ok((ba.b, ba.a)),
        _ => Err(VspError::invalid_spec(
            "Butterworth design did not return transfer-function coefficients",
        )),
    }
}

/// Ordered filter states for one channel
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    stages: Vec<FilterState>,
}

impl FilterChain {
    /// Design every stage of a chain; the first invalid spec aborts
    pub fn design(specs: &[FilterSpec]) -> VspResult<Self> {
        let stages = specs.iter().map(design).collect::<VspResult<Vec<_>>>()?;
        Ok(FilterChain { stages })
    }

    /// Chain with no stages (passes samples through)
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Run one sample through every stage in order
    #[inline]
    pub fn process_sample(&mut self, x: f64) -> f64 {
        self.stages
            .iter_mut()
            .fold(x, |sample, stage| stage.process_sample(sample))
    }

    /// Reset every stage to its unit-step steady state
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }

    /// Prime each stage with the steady state it would reach for a constant
    /// input `x0` fed through the stages before it
    pub fn prime(&mut self, x0: f64) {
        let mut level = x0;
        for stage in &mut self.stages {
            stage.prime(level);
            level *= stage.gain_at(0.0);
        }
    }

    pub fn stages(&self) -> &[FilterState] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
