use std::fmt;
use std::io;

use thiserror::Error;

/// Errno-style code reported by the vendor layer.
///
/// libiio returns negative errno values; the sign is dropped here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Errno(pub i32);

impl Errno {
    pub const ENOENT: Errno = Errno(2);
    pub const EIO: Errno = Errno(5);
    pub const EBADF: Errno = Errno(9);
    pub const EBUSY: Errno = Errno(16);
    pub const ENODEV: Errno = Errno(19);
    pub const EINVAL: Errno = Errno(22);

    /// Build from a libiio return code (`-errno`) or a plain errno.
    pub fn from_ret(ret: i64) -> Self {
        Errno(i32::try_from(ret.unsigned_abs()).unwrap_or(i32::MAX))
    }

    /// Errno left behind by the last failed call on this thread.
    pub fn last_os_error() -> Self {
        Errno(io::Error::last_os_error().raw_os_error().unwrap_or(Self::EIO.0))
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.0))
    }
}

impl std::error::Error for Errno {}

/// Errors reported by [`IqSource`](crate::IqSource) and the context layer.
///
/// The messages for the configuration and streaming steps are stable: callers
/// that surface `error()` to users match on them.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("invalid endpoint '{endpoint}': {reason}")]
    Endpoint {
        endpoint: String,
        reason: &'static str,
    },

    #[error("failed to open NH7020 device at {endpoint}: {source}")]
    ContextUnavailable {
        endpoint: String,
        #[source]
        source: Errno,
    },

    #[error("libiio support not compiled in, cannot open {endpoint}")]
    LibiioDisabled { endpoint: String },

    #[error("no device context")]
    NoContext,

    #[error("set frequency failed")]
    SetFrequency(#[source] Errno),

    #[error("hardwaregain could not set automatic gain")]
    AutoGain(#[source] Errno),

    #[error("gain_control_mode could not set manual gain")]
    ManualGainMode(#[source] Errno),

    #[error("set hardwaregain failed")]
    SetGain(#[source] Errno),

    #[error("could not enable channel {channel}")]
    ChannelEnable {
        channel: &'static str,
        #[source]
        source: Errno,
    },

    #[error("could not create streaming buffer")]
    BufferCreate(#[source] Errno),

    #[error("source is not configured")]
    NotConfigured,

    #[error("iio_buffer_refill failed")]
    Refill(#[source] Errno),

    #[error("short read, samples lost (expected {expected} bytes, got {got})")]
    ShortRead { expected: usize, got: usize },
}
