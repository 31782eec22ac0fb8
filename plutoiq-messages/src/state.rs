use crate::{Decibels, Hertz};

/// Address of the NH7020 board on its default USB-ethernet gadget.
pub const DEFAULT_ENDPOINT: &str = "ip:192.168.2.1";

/// Samples per block when the caller has no preference.
pub const DEFAULT_BLOCK_LENGTH: usize = 65536;

/// Tuner gain request.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum TunerGain {
    /// Hardware AGC in slow-attack mode.
    #[default]
    Auto,
    /// Manual gain, written to `hardwaregain`.
    Manual(Decibels),
}

impl TunerGain {
    /// Integer sentinel callers with an `int` gain API use to ask for AGC.
    pub const AUTO_SENTINEL: i32 = i32::MIN;
}

impl From<i32> for TunerGain {
    fn from(raw: i32) -> Self {
        if raw == Self::AUTO_SENTINEL {
            TunerGain::Auto
        } else {
            TunerGain::Manual(Decibels(raw as f32))
        }
    }
}

impl std::fmt::Display for TunerGain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TunerGain::Auto => write!(f, "auto"),
            TunerGain::Manual(db) => write!(f, "{db}"),
        }
    }
}

/// Configuration for the I/Q source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    /// libiio-style URI: `ip:HOST`, `usb:`, `local:` or `sim:`.
    pub endpoint: String,
    /// Sample rate, also used as the RF bandwidth.
    pub sample_rate: Hertz,
    /// LO (center) frequency.
    pub frequency: Hertz,
    pub gain: TunerGain,
    /// Requested samples per block, clamped and rounded by the source.
    pub block_length: usize,
    /// Accepted for API compatibility; the gain mode follows `gain`.
    pub agc_mode: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            sample_rate: Hertz::mhz(2),
            frequency: Hertz::mhz(100),
            gain: TunerGain::Auto,
            block_length: DEFAULT_BLOCK_LENGTH,
            agc_mode: false,
        }
    }
}

/// Source settings as read back from the hardware.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceState {
    pub endpoint: String,
    pub sample_rate: Hertz,
    pub frequency: Hertz,
    pub tuner_gain: Decibels,
    /// Value of `gain_control_mode`, empty if it could not be read.
    pub gain_control_mode: String,
    /// Effective block length after clamping.
    pub block_length: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuner_gain_from_sentinel() {
        assert_eq!(TunerGain::from(TunerGain::AUTO_SENTINEL), TunerGain::Auto);
        assert_eq!(TunerGain::from(30), TunerGain::Manual(Decibels(30.0)));
        assert_eq!(TunerGain::from(0), TunerGain::Manual(Decibels(0.0)));
    }

    #[test]
    fn test_default_config() {
        let config = SourceConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.block_length, DEFAULT_BLOCK_LENGTH);
        assert_eq!(config.gain, TunerGain::Auto);
        assert!(!config.agc_mode);
    }
}
