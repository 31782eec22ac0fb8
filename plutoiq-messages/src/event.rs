use num_complex::Complex;

use crate::SourceState;

/// Events sent from the engine to the caller.
#[derive(Debug)]
pub enum Event {
    /// Hardware settings read back after (re)configuration.
    StateSnapshot(SourceState),
    /// One block of normalized I/Q samples.
    Samples(Vec<Complex<f32>>),
    /// The device could not be opened or configured.
    Error(String),
}
