//! GPIO pin abstraction.
//!
//! The control bus and the streaming engine do not touch a GPIO peripheral
//! directly. They are generic over the small pin traits defined here, which a
//! target port implements on top of its own GPIO driver. The traits carry
//! exactly the capabilities the protocol needs: a push-pull output for the
//! bus clock, a direction-switched data line with selectable pulls, an input
//! for the externally driven parallel clock, and a 4-bit parallel output for
//! the I/Q nibbles. Tests implement them with in-memory pins.

/// Logic level of a pin.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Level {
    /// Line at ground.
    Low,
    /// Line at the logic supply.
    High,
}

impl Level {
    /// Returns `true` for [`Level::High`].
    pub fn is_high(self) -> bool {
        matches!(self, Level::High)
    }

    /// Builds a level from a bit, mapping `true` to high.
    pub fn from_bit(bit: bool) -> Level {
        if bit {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Pull resistor applied to an input pin.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Pull {
    /// Floating input.
    None,
    /// Pull-up to the logic supply.
    Up,
    /// Pull-down to ground.
    Down,
}

/// Push-pull output pin.
pub trait OutputPin {
    /// Drives the pin to `level`.
    fn set(&mut self, level: Level);
}

/// Input pin.
pub trait InputPin {
    /// Samples the current level of the pin.
    fn read(&self) -> Level;
}

/// Bidirectional pin whose direction and pull are switched at runtime.
///
/// Used for the shared half-duplex data line of the control bus.
pub trait IoPin: InputPin {
    /// Reconfigures the pin as an input with the given pull.
    fn set_input(&mut self, pull: Pull);

    /// Reconfigures the pin as a push-pull output driving `level`.
    fn set_output(&mut self, level: Level);
}

/// 4-bit parallel output, one pin per bit, all idle-low.
pub trait ParallelOut {
    /// Presents the low 4 bits of `nibble` on the output pins.
    fn write_nibble(&mut self, nibble: u8);
}
