use log::{debug, info, warn};
use num_complex::Complex;
use plutoiq_messages::{Decibels, Hertz, SourceConfig, SourceState, TunerGain};

use crate::Error;
use crate::context::{
    AttrValue, IioContext, PHY_RX, PHY_RX_LO, RX_DEVICE, RX_I, RX_Q, open_context,
};
use crate::convert::{BYTES_PER_SAMPLE, MIN_BLOCK_LENGTH, clamp_block_length, normalize_into};
use crate::endpoint::Endpoint;

/// Name reported for the single supported unit.
pub const DEVICE_NAME: &str = "NH7020";

/// Entries in the tuner gain table (0 dB upwards, 1 dB apart).
const TUNER_GAIN_STEPS: i32 = 80;

/// I/Q sample source for an AD9361 front end.
///
/// Owns the device context for its whole life. Open with [`IqSource::open`],
/// check [`IqSource::is_valid`], call [`IqSource::configure`] once, then poll
/// [`IqSource::get_samples`]. Dropping the source disables the RX channels
/// and releases the context.
///
/// Every failure is returned and also kept as the last error, so callers
/// written against the boolean-plus-`error()` style keep working.
pub struct IqSource {
    endpoint: String,
    ctx: Option<Box<dyn IioContext>>,
    block_length: usize,
    configured: bool,
    rx_enabled: bool,
    last_error: Option<Error>,
}

impl IqSource {
    /// Open the device at `endpoint` (see [`Endpoint`] for the accepted forms).
    ///
    /// Never fails outright: a missing device leaves the source invalid with
    /// the reason in [`IqSource::last_error`].
    pub fn open(endpoint: &str) -> Self {
        let mut source = Self::empty(endpoint.trim().to_string(), None);
        let ctx = endpoint
            .parse::<Endpoint>()
            .and_then(|endpoint| open_context(&endpoint));
        match ctx {
            Ok(ctx) => {
                debug!("Opened device context at {}", source.endpoint);
                source.ctx = Some(ctx);
            }
            Err(e) => {
                warn!("Could not open {}: {}", source.endpoint, e);
                source.last_error = Some(e);
            }
        }
        source
    }

    /// Wrap an already-open context, typically a [`SimContext`](crate::SimContext).
    pub fn with_context(ctx: Box<dyn IioContext>) -> Self {
        Self::empty("custom".to_string(), Some(ctx))
    }

    /// Open `config.endpoint` and configure it, failing on the first error.
    pub fn connect(config: &SourceConfig) -> Result<Self, Error> {
        let mut source = Self::open(&config.endpoint);
        if let Some(e) = source.last_error.take() {
            return Err(e);
        }
        source.configure(config)?;
        Ok(source)
    }

    fn empty(endpoint: String, ctx: Option<Box<dyn IioContext>>) -> Self {
        Self {
            endpoint,
            ctx,
            block_length: MIN_BLOCK_LENGTH,
            configured: false,
            rx_enabled: false,
            last_error: None,
        }
    }

    /// Configure the RF front end and allocate the streaming buffer.
    ///
    /// Steps run in hardware order: port, bandwidth and rate, LO, gain, then
    /// the RX channels and buffer. A failed step aborts the rest; settings
    /// already written stay on the device. `agc_mode` has no effect, the gain
    /// mode follows `config.gain`.
    pub fn configure(&mut self, config: &SourceConfig) -> Result<(), Error> {
        let result = self.apply(config);
        self.record(result)
    }

    fn apply(&mut self, config: &SourceConfig) -> Result<(), Error> {
        let ctx = self.ctx.as_mut().ok_or(Error::NoContext)?;
        self.configured = false;

        if config.agc_mode {
            debug!("agc_mode is ignored, gain mode follows the tuner gain setting");
        }

        let rate = config.sample_rate.as_i64();
        for (attr, value) in [
            ("rf_port_select", AttrValue::Str("A_BALANCED")),
            ("rf_bandwidth", AttrValue::Int(rate)),
            ("sampling_frequency", AttrValue::Int(rate)),
        ] {
            if let Err(e) = ctx.write_attr(PHY_RX, attr, value) {
                warn!("Writing {} failed: {}", attr, e);
            }
        }

        ctx.write_attr(PHY_RX_LO, "frequency", AttrValue::Int(config.frequency.as_i64()))
            .map_err(Error::SetFrequency)?;

        match config.gain {
            TunerGain::Auto => {
                ctx.write_attr(PHY_RX, "gain_control_mode", AttrValue::Str("slow_attack"))
                    .map_err(Error::AutoGain)?;
            }
            TunerGain::Manual(gain) => {
                ctx.write_attr(PHY_RX, "gain_control_mode", AttrValue::Str("manual"))
                    .map_err(Error::ManualGainMode)?;
                ctx.write_attr(
                    PHY_RX,
                    "hardwaregain",
                    AttrValue::Float(f64::from(gain.as_db())),
                )
                .map_err(Error::SetGain)?;
            }
        }

        self.block_length = clamp_block_length(config.block_length);

        ctx.destroy_buffer();
        for chan in [RX_I, RX_Q] {
            ctx.enable_channel(chan).map_err(|source| Error::ChannelEnable {
                channel: chan.channel,
                source,
            })?;
            self.rx_enabled = true;
        }
        ctx.create_buffer(RX_DEVICE, self.block_length)
            .map_err(Error::BufferCreate)?;
        self.configured = true;

        info!(
            "Streaming from {} ({}, {}, gain {}, {} samples/block)",
            self.endpoint, config.frequency, config.sample_rate, config.gain, self.block_length
        );
        Ok(())
    }

    /// Refill the buffer and convert one block into `samples`.
    ///
    /// Blocks until the hardware delivers. On success `samples` holds exactly
    /// [`IqSource::block_length`] values; on failure it is left as it was.
    pub fn get_samples(&mut self, samples: &mut Vec<Complex<f32>>) -> Result<(), Error> {
        let result = self.fetch(samples);
        self.record(result)
    }

    fn fetch(&mut self, samples: &mut Vec<Complex<f32>>) -> Result<(), Error> {
        let block_length = self.block_length;
        let ctx = self.ctx.as_mut().ok_or(Error::NoContext)?;
        if !self.configured {
            return Err(Error::NotConfigured);
        }

        let refill = ctx.refill().map_err(Error::Refill)?;
        let expected = block_length * BYTES_PER_SAMPLE;
        if refill.bytes < expected || refill.samples.len() < block_length * 2 {
            return Err(Error::ShortRead {
                expected,
                got: refill.bytes,
            });
        }

        normalize_into(&refill.samples[..block_length * 2], samples);
        Ok(())
    }

    /// Sample rate as reported by the hardware, zero if unavailable.
    pub fn sample_rate(&self) -> Hertz {
        self.ctx
            .as_ref()
            .and_then(|ctx| ctx.read_attr_i64(PHY_RX, "sampling_frequency").ok())
            .map(Hertz::from_reading)
            .unwrap_or_default()
    }

    /// LO frequency as reported by the hardware, zero if unavailable.
    pub fn frequency(&self) -> Hertz {
        self.ctx
            .as_ref()
            .and_then(|ctx| ctx.read_attr_i64(PHY_RX_LO, "frequency").ok())
            .map(Hertz::from_reading)
            .unwrap_or_default()
    }

    /// Current RX gain as reported by the hardware, zero if unavailable.
    pub fn tuner_gain(&self) -> Decibels {
        self.ctx
            .as_ref()
            .and_then(|ctx| ctx.read_attr_f64(PHY_RX, "hardwaregain").ok())
            .map(|db| Decibels(db as f32))
            .unwrap_or_default()
    }

    /// Current `gain_control_mode`, if the device can be read.
    pub fn gain_control_mode(&self) -> Option<String> {
        self.ctx
            .as_ref()
            .and_then(|ctx| ctx.read_attr_str(PHY_RX, "gain_control_mode").ok())
    }

    /// Supported gain settings.
    ///
    /// A declared table of whole-dB steps, not read from the hardware, so it
    /// is approximate: the AD9361's usable range depends on the LO frequency.
    pub fn tuner_gains(&self) -> Vec<Decibels> {
        (0..TUNER_GAIN_STEPS).map(|db| Decibels(db as f32)).collect()
    }

    /// Samples per block after clamping.
    pub fn block_length(&self) -> usize {
        self.block_length
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Settings read back from the hardware.
    pub fn state(&self) -> SourceState {
        SourceState {
            endpoint: self.endpoint.clone(),
            sample_rate: self.sample_rate(),
            frequency: self.frequency(),
            tuner_gain: self.tuner_gain(),
            gain_control_mode: self.gain_control_mode().unwrap_or_default(),
            block_length: self.block_length,
        }
    }

    /// Names of the devices this source can drive. Always a single entry.
    pub fn device_names() -> Vec<String> {
        vec![DEVICE_NAME.to_string()]
    }

    /// True when a context is open and no error is pending.
    pub fn is_valid(&self) -> bool {
        self.ctx.is_some() && self.last_error.is_none()
    }

    /// The pending error, without clearing it.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Return the pending error message and clear it; empty when none.
    ///
    /// Clearing does not undo the failure: after a failed `configure` the
    /// source reports valid again but still has no stream. Use
    /// [`IqSource::last_error`] to inspect without clearing.
    pub fn error(&mut self) -> String {
        self.last_error
            .take()
            .map(|e| e.to_string())
            .unwrap_or_default()
    }

    fn record<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(e) = &result {
            self.last_error = Some(e.clone());
        }
        result
    }
}

impl Drop for IqSource {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.destroy_buffer();
            if self.rx_enabled {
                ctx.disable_channel(RX_I);
                ctx.disable_channel(RX_Q);
            }
            debug!("Released device context at {}", self.endpoint);
        }
    }
}
