//! Control-bus driver.
//!
//! The chip register interface is a half-duplex 2-wire bus: a clock line
//! driven by the host and a shared data line whose direction is switched at
//! runtime. A transaction is a command byte (`0x00 + reg` for a write,
//! `0x80 + reg` for a read) followed by the register payload. The bus is
//! single-master; a data line that is not verifiably idle before a write is
//! treated as a bug and surfaced immediately, never retried.

use crate::gpio::{IoPin, Level, OutputPin, Pull};
use anyhow::Result;

/// Bit-banged half-duplex control bus.
///
/// Owns the clock output pin and the bidirectional data pin for the lifetime
/// of the driving process.
#[derive(Debug)]
pub struct ControlBus<Clk, Io> {
    clk: Clk,
    io: Io,
}

impl<Clk: OutputPin, Io: IoPin> ControlBus<Clk, Io> {
    /// Takes ownership of the bus pins and parks them in their idle state
    /// (clock low, data released).
    pub fn new(mut clk: Clk, mut io: Io) -> ControlBus<Clk, Io> {
        clk.set(Level::Low);
        io.set_input(Pull::None);
        ControlBus { clk, io }
    }

    /// Checks that nothing else is driving the data line.
    ///
    /// The line is probed twice. First it is configured as an input with
    /// pull-up, which must read high. The host pull-down is too weak to be
    /// trusted on its own, so for the second probe the line is briefly driven
    /// low and then released into input-with-pull-down, after which it must
    /// still read low. A line forced either way by another driver fails one
    /// of the probes; a floating or stuck line fails the second.
    pub fn is_bus_idle(&mut self) -> bool {
        self.io.set_input(Pull::Up);
        if !self.io.read().is_high() {
            return false;
        }
        self.io.set_output(Level::Low);
        self.io.set_input(Pull::Down);
        if self.io.read().is_high() {
            return false;
        }
        true
    }

    /// Writes one byte, MSB first.
    ///
    /// Each bit is presented while the clock is low and latched by raising
    /// the clock; the clock is left low after the final bit. The idle check
    /// runs immediately before the byte: writing onto a contended bus
    /// corrupts chip state, so contention aborts the operation.
    pub fn serial_write(&mut self, byte: u8) -> Result<()> {
        if !self.is_bus_idle() {
            anyhow::bail!("bus not idle before write of {byte:#04x}");
        }
        self.io.set_output(Level::Low);
        for i in 0..8 {
            self.clk.set(Level::Low);
            self.io.set_output(Level::from_bit(byte & (0x80 >> i) != 0));
            self.clk.set(Level::High);
        }
        self.clk.set(Level::Low);
        Ok(())
    }

    /// Reads one byte, MSB first, sampling while the clock is high.
    pub fn serial_read(&mut self) -> u8 {
        self.io.set_input(Pull::None);
        let mut result = 0u8;
        for _ in 0..8 {
            self.clk.set(Level::High);
            result = (result << 1) | u8::from(self.io.read().is_high());
            self.clk.set(Level::Low);
        }
        result
    }

    /// Writes a register: the write command for `addr` followed by the full
    /// payload. The frame is atomic with respect to this driver; every byte
    /// re-verifies bus idleness.
    pub fn write_reg(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        anyhow::ensure!(addr < 0x80, "register address {addr:#04x} out of range");
        tracing::trace!(addr, len = data.len(), "register write");
        self.serial_write(addr)?;
        for &byte in data {
            self.serial_write(byte)?;
        }
        Ok(())
    }

    /// Reads `width` bytes from register `addr`.
    pub fn read_reg(&mut self, addr: u8, width: usize) -> Result<Vec<u8>> {
        anyhow::ensure!(addr < 0x80, "register address {addr:#04x} out of range");
        self.serial_write(0x80 | addr)?;
        Ok((0..width).map(|_| self.serial_read()).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gpio::sim;

    fn bus() -> (
        ControlBus<sim::ClkPin, sim::DataPin>,
        std::rc::Rc<std::cell::RefCell<sim::Wire>>,
    ) {
        let (clk, io, wire) = sim::harness();
        (ControlBus::new(clk, io), wire)
    }

    #[test]
    fn write_loopback_all_bytes() {
        let (mut bus, wire) = bus();
        for byte in 0..=255u8 {
            wire.borrow_mut().captured.clear();
            bus.serial_write(byte).unwrap();
            {
                let captured = &wire.borrow().captured;
                assert_eq!(captured.len(), 8);
                for (i, &bit) in captured.iter().enumerate() {
                    assert_eq!(bit, byte & (0x80 >> i) != 0, "bit {i} of {byte:#04x}");
                }
            }
            assert_eq!(wire.borrow().captured_bytes(), vec![byte]);
            // feed the captured bits back: a loopback read reproduces the byte
            let bits = wire.borrow().captured.clone();
            wire.borrow_mut().reply = bits;
            assert_eq!(bus.serial_read(), byte);
        }
    }

    #[test]
    fn read_all_bytes() {
        let (mut bus, wire) = bus();
        for byte in 0..=255u8 {
            wire.borrow_mut().load_reply(&[byte]);
            assert_eq!(bus.serial_read(), byte);
        }
    }

    #[test]
    fn bus_idle_only_when_floating() {
        let (mut bus, wire) = bus();
        assert!(bus.is_bus_idle());

        // another driver forcing the line high defeats the pull-down probe
        wire.borrow_mut().external = Some(true);
        assert!(!bus.is_bus_idle());

        // forcing it low defeats the pull-up probe
        wire.borrow_mut().external = Some(false);
        assert!(!bus.is_bus_idle());

        wire.borrow_mut().external = None;
        assert!(bus.is_bus_idle());
    }

    #[test]
    fn write_fails_on_contended_bus() {
        let (mut bus, wire) = bus();
        wire.borrow_mut().external = Some(true);
        assert!(bus.serial_write(0x55).is_err());
        // nothing was clocked out
        assert!(wire.borrow().captured.is_empty());
    }

    #[test]
    fn read_reg_frames_command_then_payload() {
        let (mut bus, wire) = bus();
        wire.borrow_mut().load_reply(&[0xde, 0xad, 0xbe, 0xef]);
        let payload = bus.read_reg(0x0e, 4).unwrap();
        assert_eq!(payload, vec![0xde, 0xad, 0xbe, 0xef]);
        // the command byte carries the read opcode
        assert_eq!(wire.borrow().captured_bytes(), vec![0x8e]);
    }

    #[test]
    fn write_reg_is_one_frame() {
        let (mut bus, wire) = bus();
        bus.write_reg(0x01, &[0x00, 0x40, 0x38, 0x00]).unwrap();
        assert_eq!(
            wire.borrow().captured_bytes(),
            vec![0x01, 0x00, 0x40, 0x38, 0x00]
        );
    }

    #[test]
    fn reg_addr_range_checked() {
        let (mut bus, _wire) = bus();
        assert!(bus.write_reg(0x80, &[0x00]).is_err());
        assert!(bus.read_reg(0xff, 1).is_err());
    }
}
