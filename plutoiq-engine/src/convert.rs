use num_complex::Complex;

/// Full-scale magnitude of the AD9361's 12-bit samples.
pub const SAMPLE_SCALE: f32 = 2047.0;

pub const MIN_BLOCK_LENGTH: usize = 4096;
pub const MAX_BLOCK_LENGTH: usize = 1024 * 1024;

/// Bytes per complex sample on the wire: two `i16` words, I then Q.
pub const BYTES_PER_SAMPLE: usize = 2 * std::mem::size_of::<i16>();

/// Clamp a requested block length to `[4096, 1 MiB]` and round it down to a
/// multiple of 4096.
pub fn clamp_block_length(requested: usize) -> usize {
    let n = requested.clamp(MIN_BLOCK_LENGTH, MAX_BLOCK_LENGTH);
    n - n % MIN_BLOCK_LENGTH
}

/// Convert interleaved I/Q words into unit-scaled complex samples.
///
/// `out` is cleared and refilled; a trailing unpaired word is ignored.
pub fn normalize_into(raw: &[i16], out: &mut Vec<Complex<f32>>) {
    out.clear();
    out.extend(raw.chunks_exact(2).map(|iq| {
        Complex::new(
            f32::from(iq[0]) / SAMPLE_SCALE,
            f32::from(iq[1]) / SAMPLE_SCALE,
        )
    }));
}
