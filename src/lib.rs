//! ddstx drives an AD9957 DDS transmitter. The chip-facing half programs
//! the device over a bit-banged half-duplex control bus and keeps its
//! parallel data port fed with 4-bit I/Q nibbles in lock-step with the
//! externally generated parallel clock. The host-facing half packs a
//! precomputed I/Q waveform into the same nibble format and streams it to
//! the transmitter over a USB bulk endpoint.

#![warn(missing_docs)]

pub mod ad9957;
pub mod app;
pub mod args;
pub mod bus;
pub mod engine;
pub mod gpio;
pub mod meter;
pub mod usb;
pub mod waveform;
