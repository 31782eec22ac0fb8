use crate::SourceConfig;

/// Commands sent from the caller to the engine.
#[derive(Debug)]
pub enum Command {
    /// Stop streaming and release the device.
    Stop,
    /// Tear the stream down and reopen the device with a new configuration.
    Reconfigure(SourceConfig),
}
