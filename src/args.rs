//! ddstx CLI arguments.
//!
//! This module contains the definition of the CLI arguments for the host
//! streaming role of ddstx.

use clap::Parser;
use std::path::PathBuf;

/// ddstx CLI arguments.
#[derive(Parser, Debug, Clone, PartialEq)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Waveform file: raw little-endian f32 instantaneous-frequency track
    pub waveform: PathBuf,

    /// Baseband sample rate in Hz (sysclk / parallel divider / interpolation)
    #[clap(long, default_value_t = 156_250.0)]
    pub samp_rate: f64,

    /// FM deviation in Hz
    #[clap(long, default_value_t = 2500.0)]
    pub deviation: f64,

    /// Transmit only the first SECONDS of the track
    #[clap(long)]
    pub seconds: Option<f64>,

    /// USB vendor ID of the transmitter (decimal or 0x-prefixed hex)
    #[clap(long, default_value_t = crate::usb::VENDOR_ID, value_parser = parse_u16)]
    pub vendor_id: u16,

    /// USB product ID of the transmitter (decimal or 0x-prefixed hex)
    #[clap(long, default_value_t = crate::usb::PRODUCT_ID, value_parser = parse_u16)]
    pub product_id: u16,
}

fn parse_u16(s: &str) -> Result<u16, std::num::ParseIntError> {
    match s.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hex_and_decimal_ids() {
        assert_eq!(parse_u16("0xcafe"), Ok(0xcafe));
        assert_eq!(parse_u16("4011"), Ok(4011));
        assert!(parse_u16("cafe").is_err());
    }

    #[test]
    fn defaults() {
        let args = Args::parse_from(["ddstx", "test.f32"]);
        assert_eq!(args.samp_rate, 156_250.0);
        assert_eq!(args.deviation, 2500.0);
        assert_eq!(args.vendor_id, 0xcafe);
        assert_eq!(args.product_id, 0x4011);
        assert_eq!(args.seconds, None);
    }
}
