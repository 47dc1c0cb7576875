//! Shunt current diagnostics.
//!
//! Optional helper that measures the chip supply current through a shunt
//! resistor sampled by an ADC. Independent of the control bus and streaming
//! paths; useful for verifying PLL and full-scale-current settings (the
//! current draw differs by a factor of three between running straight from
//! the reference and from the multiplied VCO clock).

/// Source of raw 16-bit ADC readings, full scale at the reference voltage.
pub trait AdcReader {
    /// Takes one raw reading.
    fn read_u16(&mut self) -> u16;
}

/// ADC reference voltage in volts.
pub const VREF: f64 = 3.3;

/// Default number of readings averaged per measurement.
pub const DEFAULT_SAMPLES: usize = 32;

/// Current meter over a shunt resistor.
#[derive(Debug)]
pub struct CurrentMeter<A> {
    adc: A,
    shunt_ohms: f64,
}

impl<A: AdcReader> CurrentMeter<A> {
    /// Creates a meter reading the voltage across a `shunt_ohms` resistor.
    pub fn new(adc: A, shunt_ohms: f64) -> CurrentMeter<A> {
        CurrentMeter { adc, shunt_ohms }
    }

    /// Averages `samples` readings and converts to amps through the shunt.
    pub fn sample_amps(&mut self, samples: usize) -> f64 {
        let sum: u64 = (0..samples).map(|_| u64::from(self.adc.read_u16())).sum();
        let volts = sum as f64 / samples as f64 / f64::from(u16::MAX) * VREF;
        volts / self.shunt_ohms
    }
}
