//! Launch context correlation: pending launch registry and window matching.
//!
//! This module is responsible ONLY for deciding which pending launch (if any)
//! produced a newly observed window. It does not place windows, retry
//! launches or talk to the compositor.

pub mod clock;
pub mod registry;
pub mod scorer;
pub mod stats;

pub use clock::SystemClock;
#[cfg(test)]
pub use clock::ManualClock;
pub use registry::{CorrelationMatch, LaunchRegistry};
