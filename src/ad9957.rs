//! AD9957 register model.
//!
//! This module encodes the chip configuration values (frequency tuning
//! words, profile fields, PLL settings) and drives the fixed initialization
//! sequence over the control bus. Register bit-field meanings beyond what
//! governs protocol correctness are not modeled; payloads are carried as the
//! byte sequences the chip expects.

use crate::bus::ControlBus;
use crate::gpio::{IoPin, OutputPin};
use anyhow::{Context, Result};

/// System clock of the chip when running directly from the 25 MHz reference.
pub const SYSCLK: f64 = 25e6;

/// CCI interpolation factor programmed into every profile.
pub const INTERPOLATION: u8 = 40;

/// Fixed divider between the system clock and the parallel port clock.
pub const PARALLEL_DIVIDER: u32 = 4;

/// Number of profile registers.
pub const NUM_PROFILES: usize = 8;

// Register addresses. Profiles occupy 0x0E..=0x15.
const CFR1: u8 = 0x00;
const CFR2: u8 = 0x01;
const CFR3: u8 = 0x02;
const AUX_DAC: u8 = 0x03;
const PROFILE0: u8 = 0x0e;

const PROFILE_WIDTH: usize = 8;

/// Baseband I/Q sample rate implied by the default configuration:
/// `sysclk / parallel divider / interpolation` (156.25 kHz at 25 MHz).
pub fn baseband_rate(sysclk: f64) -> f64 {
    sysclk / f64::from(PARALLEL_DIVIDER) / f64::from(INTERPOLATION)
}

/// Frequency tuning word.
///
/// Encodes an output frequency as a 32-bit fraction of the system clock.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Ftw(u32);

impl Ftw {
    /// Computes the tuning word for an output frequency.
    ///
    /// The word is `round(freq / (sysclk / 2^32))`. `freq` must lie in
    /// `[0, sysclk / 2)`; beyond the Nyquist bound of the output stage the
    /// word would alias silently, so out-of-range frequencies are rejected
    /// here rather than wrapped.
    pub fn from_frequency(freq: f64, sysclk: f64) -> Result<Ftw> {
        if !(0.0..sysclk / 2.0).contains(&freq) {
            anyhow::bail!("frequency {freq} Hz out of range for sysclk {sysclk} Hz");
        }
        let fstep = sysclk / 2.0f64.powi(32);
        Ok(Ftw((freq / fstep).round() as u32))
    }

    /// Returns the output frequency this word produces at a given system
    /// clock.
    pub fn frequency(self, sysclk: f64) -> f64 {
        f64::from(self.0) * sysclk / 2.0f64.powi(32)
    }

    /// Serializes the word MSB first, the order the chip expects.
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Raw 32-bit value.
    pub fn bits(self) -> u32 {
        self.0
    }
}

/// Contents of one profile register.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Profile {
    /// CCI interpolation factor, at most 63.
    pub interpolation: u8,
    /// Bypasses the inverse-CCI compensation filter when set.
    pub inverse_cci_disable: bool,
    /// Output amplitude scale factor. Above `0x80` the output distorts when
    /// the I/Q data is at full scale.
    pub output_scale: u8,
    /// Phase offset word, zero in the default configuration.
    pub phase_offset: u16,
    /// Frequency tuning word.
    pub ftw: Ftw,
}

impl Profile {
    /// Serializes the 8-byte register payload.
    pub fn to_bytes(&self) -> [u8; PROFILE_WIDTH] {
        debug_assert!(self.interpolation <= 63);
        let phase = self.phase_offset.to_be_bytes();
        let ftw = self.ftw.to_be_bytes();
        [
            (self.interpolation << 2) | u8::from(self.inverse_cci_disable),
            self.output_scale,
            phase[0],
            phase[1],
            ftw[0],
            ftw[1],
            ftw[2],
            ftw[3],
        ]
    }
}

/// Reference PLL configuration (register CFR3).
///
/// Multiplies the external reference up to the system clock. Not part of
/// [`Ad9957::init`]; the chip runs straight from the reference unless this
/// register is written explicitly.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PllConfig {
    /// VCO band select.
    pub vco: u8,
    /// Charge pump current setting, at most 7.
    pub charge_pump: u8,
    /// Reference multiplier.
    pub multiplier: u8,
}

impl PllConfig {
    /// Serializes the 4-byte register payload: VCO enable and band select,
    /// charge pump current, input divider disable plus PLL enable, and the
    /// multiplier.
    pub fn to_bytes(&self) -> [u8; 4] {
        debug_assert!(self.vco <= 7 && self.charge_pump <= 7);
        [
            0x08 | self.vco,
            self.charge_pump << 3,
            0b1100_0001,
            self.multiplier << 1,
        ]
    }
}

/// AD9957 chip driver.
///
/// Owns the control bus and produces the well-formed frames of the fixed
/// initialization and profile programming sequences.
#[derive(Debug)]
pub struct Ad9957<Clk, Io> {
    bus: ControlBus<Clk, Io>,
    sysclk: f64,
}

impl<Clk: OutputPin, Io: IoPin> Ad9957<Clk, Io> {
    /// Creates a driver over an already constructed control bus.
    pub fn new(bus: ControlBus<Clk, Io>, sysclk: f64) -> Ad9957<Clk, Io> {
        Ad9957 { bus, sysclk }
    }

    /// System clock the driver was created with.
    pub fn sysclk(&self) -> f64 {
        self.sysclk
    }

    /// Runs the fixed initialization sequence.
    ///
    /// CFR1 is written first and carries the clear-CCI bit; without it the
    /// interpolator retains stale state and register readbacks return
    /// garbage. CFR2 then selects parallel port DDR mode (PDCLK at half the
    /// baseband clock, rise/fall latching) with offset-binary data, and the
    /// auxiliary DAC register sets the full-scale output current to 30 mA,
    /// which is safe into a 10 ohm load. The order of these writes is a
    /// correctness requirement, not a preference.
    pub fn init(&mut self) -> Result<()> {
        self.bus
            .write_reg(CFR1, &[0x00, 0x20, 0x00, 0x00])
            .context("failed to write CFR1")?;
        self.bus
            .write_reg(CFR2, &[0x00, 0x40, 0x38, 0x00])
            .context("failed to write CFR2")?;
        self.bus
            .write_reg(AUX_DAC, &[0x00, 0x00, 0x00, 0xff])
            .context("failed to write full-scale current")?;
        tracing::info!("AD9957 initialized");
        Ok(())
    }

    /// Writes the reference PLL configuration.
    pub fn set_pll(&mut self, config: &PllConfig) -> Result<()> {
        self.bus
            .write_reg(CFR3, &config.to_bytes())
            .context("failed to write PLL configuration")
    }

    /// Programs a single profile register.
    pub fn set_profile(&mut self, num: usize, profile: &Profile) -> Result<()> {
        anyhow::ensure!(num < NUM_PROFILES, "profile {num} out of range");
        self.bus
            .write_reg(PROFILE0 + num as u8, &profile.to_bytes())
            .with_context(|| format!("failed to write profile {num}"))
    }

    /// Programs all profiles with identical contents.
    ///
    /// The chip selects among the profiles with its profile pins; writing
    /// them all makes the selection irrelevant in the default configuration,
    /// while per-profile divergence remains a matter of calling
    /// [`Ad9957::set_profile`] with different contents.
    pub fn set_profiles(&mut self, profile: &Profile) -> Result<()> {
        for num in 0..NUM_PROFILES {
            self.set_profile(num, profile)?;
        }
        Ok(())
    }

    /// Programs every profile for a carrier at `freq` with the default
    /// interpolation and output scale.
    pub fn set_carrier(&mut self, freq: f64) -> Result<()> {
        let ftw = Ftw::from_frequency(freq, self.sysclk)?;
        tracing::debug!(freq, ftw = ftw.bits(), "programming carrier");
        self.set_profiles(&Profile {
            interpolation: INTERPOLATION,
            inverse_cci_disable: true,
            output_scale: 0x80,
            phase_offset: 0,
            ftw,
        })
    }

    /// Reads back a profile register.
    pub fn read_profile(&mut self, num: usize) -> Result<Vec<u8>> {
        anyhow::ensure!(num < NUM_PROFILES, "profile {num} out of range");
        self.bus.read_reg(PROFILE0 + num as u8, PROFILE_WIDTH)
    }
}
