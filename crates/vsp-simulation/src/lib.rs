//! VSP-Simulation: Synthetic ECG/PPG generation
//!
//! A software stand-in for the sensor board, used for demos and for
//! end-to-end tests of the monitor pipeline.

pub mod signal_patterns;
pub mod vitals_simulator;

pub use signal_patterns::SignalPattern;
pub use vitals_simulator::{NoiseConfig, SimulatedSource, VitalsConfig, VitalsSimulator};
