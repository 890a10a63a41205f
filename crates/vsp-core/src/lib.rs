//! VSP-Core: Foundation types for the vital-sign pipeline
//!
//! Channel model, record parsing, sliding windows, clocks and the sample
//! source abstraction shared by the processing, simulation and monitor crates.

pub mod channel;
pub mod clock;
pub mod error;
pub mod source;
pub mod window;

pub use channel::*;
pub use clock::*;
pub use error::{VspError, VspResult};
pub use source::{SampleSource, VecSource};
pub use window::SlidingWindow;
