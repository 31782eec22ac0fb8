mod command;
mod event;
mod state;
mod units;

pub use command::Command;
pub use event::Event;
pub use state::{DEFAULT_BLOCK_LENGTH, DEFAULT_ENDPOINT, SourceConfig, SourceState, TunerGain};
pub use units::{Decibels, Hertz};
