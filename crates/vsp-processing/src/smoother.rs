//! Savitzky–Golay smoothing of a finished window
//!
//! Non-causal and display only: the whole window is re-smoothed on each
//! draw tick, filter state is never touched.

use crate::linalg;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How the window is extended past its edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    /// Reflect about the edge sample without repeating it: `d c b | a b c d | c b a`
    #[default]
    Mirror,
    /// Repeat the edge sample
    Nearest,
    /// Fit a polynomial to the first and last window and evaluate it at the edges
    Interp,
}

/// Smoother parameters as they appear in configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmootherConfig {
    pub window_length: usize,
    pub poly_order: usize,
    pub mode: BoundaryMode,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        SmootherConfig {
            window_length: 9,
            poly_order: 2,
            mode: BoundaryMode::Mirror,
        }
    }
}

/// Local polynomial least-squares smoother
#[derive(Debug, Clone)]
pub struct Smoother {
    window_length: usize,
    poly_order: usize,
    mode: BoundaryMode,
    coefficients: Option<Vec<f64>>,
}

impl Smoother {
    /// Build a smoother; an even `window_length` is bumped to the next odd
    /// number. A `poly_order` that does not fit the window leaves the
    /// smoother unconfigured and [`Smoother::apply`] returns its input.
    pub fn new(window_length: usize, poly_order: usize, mode: BoundaryMode) -> Self {
        let window_length = if window_length % 2 == 0 {
            window_length + 1
        } else {
            window_length
        };

        let coefficients = if poly_order >= window_length {
            warn!(
                window_length,
                poly_order, "Smoother polynomial order must be below the window length, smoothing disabled"
            );
            None
        } else {
            let coefficients = savgol_coefficients(window_length, poly_order);
            if coefficients.is_none() {
                warn!(window_length, poly_order, "Smoother design failed, smoothing disabled");
            }
            coefficients
        };

        Smoother {
            window_length,
            poly_order,
            mode,
            coefficients,
        }
    }

    pub fn from_config(config: &SmootherConfig) -> Self {
        Self::new(config.window_length, config.poly_order, config.mode)
    }

    /// Effective (odd) window length
    pub fn window_length(&self) -> usize {
        self.window_length
    }

    pub fn poly_order(&self) -> usize {
        self.poly_order
    }

    pub fn mode(&self) -> BoundaryMode {
        self.mode
    }

    /// Whether [`Smoother::apply`] will actually smooth
    pub fn is_configured(&self) -> bool {
        self.coefficients.is_some()
    }

    /// Convolution kernel, oldest sample first
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coefficients.as_deref()
    }

    /// Smooth a sequence of the same length
    pub fn apply(&self, xs: &[f64]) -> Vec<f64> {
        let coefficients = match &self.coefficients {
            Some(c) if xs.len() > self.window_length => c,
            _ => return xs.to_vec(),
        };

        let len = xs.len();
        let half = self.window_length / 2;
        let last = len - 1;

        let at = |idx: isize| -> f64 {
            let i = match self.mode {
                BoundaryMode::Mirror => {
                    if idx < 0 {
                        (-idx) as usize
                    } else if idx as usize > last {
                        2 * last - idx as usize
                    } else {
                        idx as usize
                    }
                }
                // Interp edges are overwritten below
                BoundaryMode::Nearest | BoundaryMode::Interp => idx.clamp(0, last as isize) as usize,
            };
            xs[i]
        };

        let mut out: Vec<f64> = (0..len)
            .map(|k| {
                coefficients
                    .iter()
                    .enumerate()
                    .map(|(j, c)| c * at(k as isize + j as isize - half as isize))
                    .sum()
            })
            .collect();

        if self.mode == BoundaryMode::Interp {
            self.fit_edge(xs, 0, &mut out[..half], 0);
            let start = len - self.window_length;
            self.fit_edge(xs, start, &mut out[len - half..], self.window_length - half);
        }
        out
    }

    /// Overwrite `edge` with a polynomial fitted to the window at `start`,
    /// evaluated from position `offset` within that window
    fn fit_edge(&self, xs: &[f64], start: usize, edge: &mut [f64], offset: usize) {
        let positions: Vec<f64> = (0..self.window_length).map(|i| i as f64).collect();
        let window = &xs[start..start + self.window_length];

        if let Some(poly) = linalg::polyfit(&positions, window, self.poly_order) {
            for (i, y) in edge.iter_mut().enumerate() {
                *y = linalg::polyval(&poly, (offset + i) as f64);
            }
        }
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::from_config(&SmootherConfig::default())
    }
}

/// Weights of the centered least-squares fit evaluated at the window center
fn savgol_coefficients(window_length: usize, poly_order: usize) -> Option<Vec<f64>> {
    let half = (window_length / 2) as f64;
    let terms = poly_order + 1;
    let positions: Vec<f64> = (0..window_length).map(|i| i as f64 - half).collect();

    // Gram matrix AᵀA of the Vandermonde design matrix
    let mut gram = vec![vec![0.0; terms]; terms];
    for &x in &positions {
        for (i, row) in gram.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell += x.powi((i + j) as i32);
            }
        }
    }

    let mut unit = vec![0.0; terms];
    unit[0] = 1.0;
    let v = linalg::solve(gram, unit)?;

    Some(
        positions
            .iter()
            .map(|&x| v.iter().enumerate().map(|(j, vj)| vj * x.powi(j as i32)).sum())
            .collect(),
    )
}
