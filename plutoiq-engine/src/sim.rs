//! In-process stand-in for an NH7020 reached over libiio.
//!
//! Attributes live in a map seeded with the AD9361's power-on values and are
//! range-checked on write the way the driver does. The streaming side follows
//! libiio's rules: channels must be enabled before a buffer is created, only
//! one buffer may exist, and refills block for one block period at the
//! configured sample rate.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use log::trace;

use crate::Errno;
use crate::context::{
    AttrValue, ChannelRef, IioContext, PHY_RX, PHY_RX_LO, RX_DEVICE, RX_I, RX_Q, Refill,
    parse_leading,
};

const KNOWN_CHANNELS: [ChannelRef; 4] = [PHY_RX, PHY_RX_LO, RX_I, RX_Q];

const RF_PORTS: [&str; 12] = [
    "A_BALANCED",
    "B_BALANCED",
    "C_BALANCED",
    "A_N",
    "A_P",
    "B_N",
    "B_P",
    "C_N",
    "C_P",
    "TX_MONITOR1",
    "TX_MONITOR2",
    "TX_MONITOR1_2",
];

const GAIN_MODES: [&str; 4] = ["manual", "fast_attack", "slow_attack", "hybrid"];

/// Quarter-rate complex tone at full scale: 1, j, -1, -j.
const DEFAULT_PATTERN: [i16; 8] = [2047, 0, 0, 2047, -2047, 0, 0, -2047];

/// Lifecycle facts observable from outside the context.
#[derive(Debug, Default)]
struct Ledger {
    enabled: HashSet<ChannelRef>,
    buffer_samples: Option<usize>,
    refills: usize,
    released: bool,
}

/// Read-only view of a [`SimContext`]'s lifecycle that outlives the context.
#[derive(Debug, Clone)]
pub struct SimProbe(Arc<Mutex<Ledger>>);

impl SimProbe {
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_enabled(&self, chan: ChannelRef) -> bool {
        self.ledger().enabled.contains(&chan)
    }

    /// Samples per channel of the live buffer.
    pub fn buffer_samples(&self) -> Option<usize> {
        self.ledger().buffer_samples
    }

    pub fn refills(&self) -> usize {
        self.ledger().refills
    }

    /// True once the context has been dropped.
    pub fn is_released(&self) -> bool {
        self.ledger().released
    }
}

/// Simulated AD9361 context.
pub struct SimContext {
    attrs: HashMap<(ChannelRef, String), String>,
    pattern: Vec<i16>,
    cursor: usize,
    buffer: Vec<i16>,
    rejected: HashSet<String>,
    refill_limit: Option<usize>,
    short_reads: bool,
    paced: bool,
    next_refill: Option<Instant>,
    ledger: Arc<Mutex<Ledger>>,
}

impl Default for SimContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SimContext {
    pub fn new() -> Self {
        let mut attrs = HashMap::new();
        let mut seed = |chan: ChannelRef, attr: &str, value: &str| {
            attrs.insert((chan, attr.to_string()), value.to_string());
        };
        seed(PHY_RX, "rf_port_select", "A_BALANCED");
        seed(PHY_RX, "rf_bandwidth", "18000000");
        seed(PHY_RX, "sampling_frequency", "30720000");
        seed(PHY_RX, "gain_control_mode", "slow_attack");
        seed(PHY_RX, "hardwaregain", "71.000000 dB");
        seed(PHY_RX_LO, "frequency", "2400000000");

        Self {
            attrs,
            pattern: DEFAULT_PATTERN.to_vec(),
            cursor: 0,
            buffer: Vec::new(),
            rejected: HashSet::new(),
            refill_limit: None,
            short_reads: false,
            paced: true,
            next_refill: None,
            ledger: Arc::new(Mutex::new(Ledger::default())),
        }
    }

    /// Replace the streamed I/Q pattern (interleaved, repeated end to end).
    ///
    /// A trailing unpaired word is dropped; an empty pattern streams zeros.
    pub fn with_pattern(mut self, interleaved: Vec<i16>) -> Self {
        let mut pattern = interleaved;
        pattern.truncate(pattern.len() & !1);
        if pattern.is_empty() {
            pattern = vec![0, 0];
        }
        self.pattern = pattern;
        self
    }

    /// Fail every write to `attr` with `EIO`.
    pub fn reject_writes(mut self, attr: &str) -> Self {
        self.rejected.insert(attr.to_string());
        self
    }

    /// Let `blocks` refills succeed, then fail with `EIO`.
    pub fn fail_refill_after(mut self, blocks: usize) -> Self {
        self.refill_limit = Some(blocks);
        self
    }

    /// Report half the expected bytes on every refill.
    pub fn short_reads(mut self) -> Self {
        self.short_reads = true;
        self
    }

    /// Return refills immediately instead of at the sample rate.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    pub fn probe(&self) -> SimProbe {
        SimProbe(Arc::clone(&self.ledger))
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn attr(&self, chan: ChannelRef, attr: &str) -> Result<&str, Errno> {
        if !KNOWN_CHANNELS.contains(&chan) {
            return Err(Errno::ENODEV);
        }
        self.attrs
            .get(&(chan, attr.to_string()))
            .map(String::as_str)
            .ok_or(Errno::ENOENT)
    }

    /// Driver-side validation; returns the text the attribute reads back as.
    fn accept(
        &self,
        chan: ChannelRef,
        attr: &str,
        value: AttrValue<'_>,
    ) -> Result<String, Errno> {
        let int = |lo: i64, hi: i64| match value {
            AttrValue::Int(v) if (lo..=hi).contains(&v) => Ok(v.to_string()),
            AttrValue::Str(s) => match s.trim().parse::<i64>() {
                Ok(v) if (lo..=hi).contains(&v) => Ok(v.to_string()),
                _ => Err(Errno::EINVAL),
            },
            _ => Err(Errno::EINVAL),
        };
        let choice = |options: &[&str]| match value {
            AttrValue::Str(s) if options.contains(&s) => Ok(s.to_string()),
            _ => Err(Errno::EINVAL),
        };

        match (chan, attr) {
            (PHY_RX_LO, "frequency") => int(70_000_000, 6_000_000_000),
            (PHY_RX, "sampling_frequency") => int(520_833, 61_440_000),
            (PHY_RX, "rf_bandwidth") => int(200_000, 56_000_000),
            (PHY_RX, "rf_port_select") => choice(&RF_PORTS[..]),
            (PHY_RX, "gain_control_mode") => choice(&GAIN_MODES[..]),
            (PHY_RX, "hardwaregain") => {
                if self.attr(PHY_RX, "gain_control_mode")? != "manual" {
                    return Err(Errno::EINVAL);
                }
                let db = match value {
                    AttrValue::Float(v) => v,
                    AttrValue::Int(v) => v as f64,
                    AttrValue::Str(s) => parse_leading(s)?,
                };
                if (-3.0..=71.0).contains(&db) {
                    Ok(format!("{db:.6} dB"))
                } else {
                    Err(Errno::EINVAL)
                }
            }
            _ => {
                self.attr(chan, attr)?;
                Err(Errno::EINVAL)
            }
        }
    }

    fn wait_for_block(&mut self, samples: usize) {
        let now = Instant::now();
        if !self.paced {
            self.next_refill = Some(now);
            return;
        }

        let rate = self
            .read_attr_i64(PHY_RX, "sampling_frequency")
            .unwrap_or(1)
            .max(1) as f64;
        let period = Duration::from_secs_f64(samples as f64 / rate);
        let due = self.next_refill.unwrap_or(now);
        if due > now {
            thread::sleep(due - now);
        }
        self.next_refill = Some(due.max(now) + period);
    }
}

impl IioContext for SimContext {
    fn write_attr(
        &mut self,
        chan: ChannelRef,
        attr: &str,
        value: AttrValue<'_>,
    ) -> Result<(), Errno> {
        if self.rejected.contains(attr) {
            return Err(Errno::EIO);
        }
        let text = self.accept(chan, attr, value)?;
        trace!("sim: {}/{} {} <- {}", chan.device, chan.channel, attr, text);
        self.attrs.insert((chan, attr.to_string()), text);
        Ok(())
    }

    fn read_attr_i64(&self, chan: ChannelRef, attr: &str) -> Result<i64, Errno> {
        parse_leading(self.attr(chan, attr)?)
    }

    fn read_attr_f64(&self, chan: ChannelRef, attr: &str) -> Result<f64, Errno> {
        parse_leading(self.attr(chan, attr)?)
    }

    fn read_attr_str(&self, chan: ChannelRef, attr: &str) -> Result<String, Errno> {
        self.attr(chan, attr).map(str::to_string)
    }

    fn enable_channel(&mut self, chan: ChannelRef) -> Result<(), Errno> {
        if chan != RX_I && chan != RX_Q {
            return Err(Errno::ENODEV);
        }
        self.ledger().enabled.insert(chan);
        Ok(())
    }

    fn disable_channel(&mut self, chan: ChannelRef) {
        self.ledger().enabled.remove(&chan);
    }

    fn create_buffer(&mut self, device: &str, samples: usize) -> Result<(), Errno> {
        if device != RX_DEVICE {
            return Err(Errno::ENODEV);
        }
        let mut ledger = self.ledger();
        if ledger.buffer_samples.is_some() {
            return Err(Errno::EBUSY);
        }
        let channels = ledger.enabled.len();
        if samples == 0 || channels == 0 {
            return Err(Errno::EINVAL);
        }
        ledger.buffer_samples = Some(samples);
        drop(ledger);

        self.buffer = vec![0; samples * channels];
        self.next_refill = None;
        Ok(())
    }

    fn destroy_buffer(&mut self) {
        self.ledger().buffer_samples = None;
        self.buffer = Vec::new();
    }

    fn refill(&mut self) -> Result<Refill<'_>, Errno> {
        let (samples, refills) = {
            let ledger = self.ledger();
            (ledger.buffer_samples.ok_or(Errno::EBADF)?, ledger.refills)
        };
        if self.refill_limit.is_some_and(|limit| refills >= limit) {
            return Err(Errno::EIO);
        }

        self.wait_for_block(samples);

        for word in self.buffer.iter_mut() {
            *word = self.pattern[self.cursor];
            self.cursor = (self.cursor + 1) % self.pattern.len();
        }
        self.ledger().refills += 1;

        let full = self.buffer.len() * std::mem::size_of::<i16>();
        let bytes = if self.short_reads { full / 2 } else { full };
        Ok(Refill {
            bytes,
            samples: &self.buffer,
        })
    }
}

impl Drop for SimContext {
    fn drop(&mut self) {
        let mut ledger = self.ledger();
        ledger.buffer_samples = None;
        ledger.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming() -> SimContext {
        let mut ctx = SimContext::new().unpaced();
        ctx.enable_channel(RX_I).unwrap();
        ctx.enable_channel(RX_Q).unwrap();
        ctx
    }

    #[test]
    fn test_range_checked_writes() {
        let mut ctx = SimContext::new();
        assert!(ctx.write_attr(PHY_RX_LO, "frequency", AttrValue::Int(100_000_000)).is_ok());
        assert_eq!(
            ctx.write_attr(PHY_RX_LO, "frequency", AttrValue::Int(10)),
            Err(Errno::EINVAL)
        );
        assert_eq!(ctx.read_attr_i64(PHY_RX_LO, "frequency"), Ok(100_000_000));
        assert_eq!(
            ctx.write_attr(PHY_RX, "rf_port_select", AttrValue::Str("Z_BALANCED")),
            Err(Errno::EINVAL)
        );
    }

    #[test]
    fn test_hardwaregain_requires_manual_mode() {
        let mut ctx = SimContext::new();
        assert_eq!(
            ctx.write_attr(PHY_RX, "hardwaregain", AttrValue::Float(20.0)),
            Err(Errno::EINVAL)
        );

        ctx.write_attr(PHY_RX, "gain_control_mode", AttrValue::Str("manual"))
            .unwrap();
        ctx.write_attr(PHY_RX, "hardwaregain", AttrValue::Float(20.0))
            .unwrap();
        assert_eq!(
            ctx.read_attr_str(PHY_RX, "hardwaregain").unwrap(),
            "20.000000 dB"
        );
        assert_eq!(ctx.read_attr_f64(PHY_RX, "hardwaregain"), Ok(20.0));
    }

    #[test]
    fn test_unknown_channel_and_attr() {
        let ctx = SimContext::new();
        let bogus = ChannelRef::input("ad9361-phy", "voltage7");
        assert_eq!(ctx.read_attr_i64(bogus, "frequency"), Err(Errno::ENODEV));
        assert_eq!(ctx.read_attr_i64(PHY_RX, "nonexistent"), Err(Errno::ENOENT));
    }

    #[test]
    fn test_buffer_lifecycle() {
        let mut ctx = SimContext::new().unpaced();
        assert_eq!(ctx.create_buffer(RX_DEVICE, 16), Err(Errno::EINVAL));
        assert_eq!(ctx.refill().err(), Some(Errno::EBADF));

        ctx.enable_channel(RX_I).unwrap();
        ctx.enable_channel(RX_Q).unwrap();
        ctx.create_buffer(RX_DEVICE, 16).unwrap();
        assert_eq!(ctx.create_buffer(RX_DEVICE, 16), Err(Errno::EBUSY));

        let refill = ctx.refill().unwrap();
        assert_eq!(refill.samples.len(), 32);
        assert_eq!(refill.bytes, 64);
        assert_eq!(&refill.samples[..8], &DEFAULT_PATTERN);

        ctx.destroy_buffer();
        assert!(ctx.create_buffer(RX_DEVICE, 8).is_ok());
    }

    #[test]
    fn test_pattern_continues_across_refills() {
        let mut ctx = streaming().with_pattern(vec![1, 2, 3, 4, 5, 6]);
        ctx.create_buffer(RX_DEVICE, 2).unwrap();

        assert_eq!(ctx.refill().unwrap().samples, &[1, 2, 3, 4]);
        assert_eq!(ctx.refill().unwrap().samples, &[5, 6, 1, 2]);
    }

    #[test]
    fn test_fault_injection() {
        let mut ctx = streaming().fail_refill_after(1).short_reads();
        ctx.create_buffer(RX_DEVICE, 4).unwrap();

        assert_eq!(ctx.refill().unwrap().bytes, 8);
        assert_eq!(ctx.refill().err(), Some(Errno::EIO));

        let mut ctx = SimContext::new().reject_writes("frequency");
        assert_eq!(
            ctx.write_attr(PHY_RX_LO, "frequency", AttrValue::Int(100_000_000)),
            Err(Errno::EIO)
        );
    }

    #[test]
    fn test_paced_refill_takes_a_block_period() {
        let mut ctx = SimContext::new();
        ctx.write_attr(PHY_RX, "sampling_frequency", AttrValue::Int(1_000_000))
            .unwrap();
        ctx.enable_channel(RX_I).unwrap();
        ctx.enable_channel(RX_Q).unwrap();
        ctx.create_buffer(RX_DEVICE, 10_000).unwrap();

        let start = Instant::now();
        for _ in 0..3 {
            ctx.refill().unwrap();
        }
        // First refill is immediate, the next two wait 10 ms each.
        assert!(start.elapsed() >= Duration::from_millis(19));
    }

    #[test]
    fn test_probe_sees_release() {
        let ctx = streaming();
        let probe = ctx.probe();
        assert!(probe.is_enabled(RX_I));
        assert!(!probe.is_released());

        drop(ctx);
        assert!(probe.is_released());
    }
}
