//! Host-side waveform packer.
//!
//! Converts an offline-synthesized instantaneous-frequency track into the
//! packed 4-bit offset-binary I/Q byte sequence that the transmitter
//! consumes. The track is integrated into a phase track, turned into a
//! unit-magnitude complex exponential, quantized to offset-binary nibbles
//! and packed one byte per (I, Q) sample pair. The waveform is produced in
//! bulk, transmitted once, and discarded; nothing is persisted.

use anyhow::Result;
use bytes::Bytes;
use num_complex::Complex64;
use std::f64::consts::PI;

// Offset-binary encoding: gain times the sample plus the mid-point offset
// lands a full-scale sample on the edges of the nibble range.
const GAIN: f64 = 8.0;
const OFFSET: f64 = 8.0;
const FULL_SCALE: i64 = 15;

/// Parses a raw little-endian `f32` sample stream.
pub fn parse_track(data: &[u8]) -> Result<Vec<f32>> {
    anyhow::ensure!(
        data.len() % 4 == 0,
        "track length {} is not a multiple of 4 bytes",
        data.len()
    );
    Ok(data
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// FM modulator turning a frequency track into packed I/Q nibbles.
#[derive(Debug)]
pub struct Modulator {
    samp_rate: f64,
    deviation: f64,
    clipped: u64,
}

impl Modulator {
    /// Creates a modulator for a track sampled at `samp_rate` Hz with the
    /// given FM deviation in Hz.
    pub fn new(samp_rate: f64, deviation: f64) -> Modulator {
        Modulator {
            samp_rate,
            deviation,
            clipped: 0,
        }
    }

    /// Integrates the frequency track into a phase track.
    ///
    /// `phase[n]` is the cumulative sum of the frequency samples scaled by
    /// the sample period and the deviation.
    pub fn integrate_phase(&self, track: &[f32]) -> Vec<f64> {
        let scale = 2.0 * PI * self.deviation / self.samp_rate;
        let mut acc = 0.0;
        track
            .iter()
            .map(|&f| {
                acc += f64::from(f) * scale;
                acc
            })
            .collect()
    }

    /// Quantizes one component to an offset-binary nibble.
    ///
    /// Out-of-range values are clipped to the ends of the nibble range and
    /// counted; wrapping would put a discontinuity artifact on the air,
    /// while clipping only distorts over-range peaks.
    pub fn quantize(&mut self, value: f64) -> u8 {
        let level = (GAIN * value + OFFSET) as i64;
        if (0..=FULL_SCALE).contains(&level) {
            level as u8
        } else {
            self.clipped += 1;
            level.clamp(0, FULL_SCALE) as u8
        }
    }

    /// Packs one (I, Q) nibble pair: I in the low nibble, Q in the high.
    pub fn pack_pair(i: u8, q: u8) -> u8 {
        (i & 0xf) | (q << 4)
    }

    /// Runs the full pipeline: frequency track to packed byte sequence.
    pub fn modulate(&mut self, track: &[f32]) -> Bytes {
        let mut out = Vec::with_capacity(track.len());
        for phase in self.integrate_phase(track) {
            let x = Complex64::from_polar(1.0, phase);
            let i = self.quantize(x.re);
            let q = self.quantize(x.im);
            out.push(Self::pack_pair(i, q));
        }
        Bytes::from(out)
    }

    /// Number of components clipped during quantization so far.
    pub fn clipped(&self) -> u64 {
        self.clipped
    }
}
