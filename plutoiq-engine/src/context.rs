use crate::endpoint::Endpoint;
use crate::sim::SimContext;
use crate::{Errno, Error};

/// AD9361 control device.
pub const PHY_DEVICE: &str = "ad9361-phy";
/// AD9361 RX streaming (DMA) device.
pub const RX_DEVICE: &str = "cf-ad9361-lpc";

/// Lookup key for a channel: device name, channel id, direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    pub device: &'static str,
    pub channel: &'static str,
    pub output: bool,
}

impl ChannelRef {
    pub const fn input(device: &'static str, channel: &'static str) -> Self {
        Self {
            device,
            channel,
            output: false,
        }
    }

    pub const fn output(device: &'static str, channel: &'static str) -> Self {
        Self {
            device,
            channel,
            output: true,
        }
    }
}

/// RX path settings: port, bandwidth, sample rate, gain.
pub const PHY_RX: ChannelRef = ChannelRef::input(PHY_DEVICE, "voltage0");
/// RX local oscillator.
pub const PHY_RX_LO: ChannelRef = ChannelRef::output(PHY_DEVICE, "altvoltage0");
/// In-phase stream channel.
pub const RX_I: ChannelRef = ChannelRef::input(RX_DEVICE, "voltage0");
/// Quadrature stream channel.
pub const RX_Q: ChannelRef = ChannelRef::input(RX_DEVICE, "voltage1");

/// Attribute value in one of the three forms libiio writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttrValue<'a> {
    Str(&'a str),
    Int(i64),
    Float(f64),
}

/// Result of a buffer refill.
#[derive(Debug)]
pub struct Refill<'a> {
    /// Bytes the transport delivered.
    pub bytes: usize,
    /// Interleaved I/Q words in the buffer, valid until the next refill.
    pub samples: &'a [i16],
}

/// The part of the libiio API the I/Q source drives.
///
/// One implementation talks to libiio, the other is the in-process simulator.
/// Channels are addressed by name on every call, as the attribute getters
/// re-query the hardware each time.
pub trait IioContext: Send {
    fn write_attr(
        &mut self,
        chan: ChannelRef,
        attr: &str,
        value: AttrValue<'_>,
    ) -> Result<(), Errno>;

    fn read_attr_i64(&self, chan: ChannelRef, attr: &str) -> Result<i64, Errno>;

    fn read_attr_f64(&self, chan: ChannelRef, attr: &str) -> Result<f64, Errno>;

    fn read_attr_str(&self, chan: ChannelRef, attr: &str) -> Result<String, Errno>;

    fn enable_channel(&mut self, chan: ChannelRef) -> Result<(), Errno>;

    fn disable_channel(&mut self, chan: ChannelRef);

    /// Allocate the streaming buffer of `device`, `samples` entries per channel.
    fn create_buffer(&mut self, device: &str, samples: usize) -> Result<(), Errno>;

    /// Release the streaming buffer, if any.
    fn destroy_buffer(&mut self);

    /// Block until the buffer holds fresh samples.
    fn refill(&mut self) -> Result<Refill<'_>, Errno>;
}

/// Open a device context for `endpoint`.
pub fn open_context(endpoint: &Endpoint) -> Result<Box<dyn IioContext>, Error> {
    match endpoint {
        Endpoint::Simulated => Ok(Box::new(SimContext::new())),
        #[cfg(feature = "libiio")]
        other => crate::iio::LibiioContext::open(other)
            .map(|ctx| Box::new(ctx) as Box<dyn IioContext>),
        #[cfg(not(feature = "libiio"))]
        other => Err(Error::LibiioDisabled {
            endpoint: other.to_string(),
        }),
    }
}

/// Parse a value the way `iio_channel_attr_read_*` does: leading number, unit ignored.
pub(crate) fn parse_leading<T: std::str::FromStr>(text: &str) -> Result<T, Errno> {
    text.split_whitespace()
        .next()
        .and_then(|token| token.parse().ok())
        .ok_or(Errno::EINVAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_leading_ignores_units() {
        assert_eq!(parse_leading::<f64>("30.000000 dB"), Ok(30.0));
        assert_eq!(parse_leading::<i64>("2000000"), Ok(2_000_000));
        assert_eq!(parse_leading::<i64>("slow_attack"), Err(Errno::EINVAL));
        assert_eq!(parse_leading::<i64>(""), Err(Errno::EINVAL));
    }

    #[test]
    fn test_open_simulated() {
        let ctx = open_context(&Endpoint::Simulated).unwrap();
        assert!(ctx.read_attr_i64(PHY_RX, "sampling_frequency").is_ok());
    }

    #[cfg(not(feature = "libiio"))]
    #[test]
    fn test_network_needs_libiio() {
        let err = open_context(&Endpoint::Network("192.0.2.1".into())).err();
        assert!(matches!(err, Some(Error::LibiioDisabled { .. })));
    }
}
