//! USB bulk transport to the transmitter.
//!
//! The transmitter enumerates as a vendor-class device with a bulk OUT
//! endpoint that feeds the parallel-port streaming FIFO. The transport is
//! single-shot: the whole packed sequence goes out in one bulk write bounded
//! by a generous timeout, and a timed-out or short write is reported to the
//! caller, not retried. There is no handshake beyond the completion status
//! of the transfer itself.

use anyhow::{Context, Result};
use bytes::Bytes;
use std::time::{Duration, Instant};

/// USB vendor ID of the transmitter.
pub const VENDOR_ID: u16 = 0xcafe;

/// USB product ID of the transmitter.
pub const PRODUCT_ID: u16 = 0x4011;

/// Interface number exposing the streaming endpoint.
pub const INTERFACE: u8 = 2;

/// Bulk OUT endpoint address.
pub const ENDPOINT: u8 = 0x03;

/// Transfer timeout. Sized for minutes of airtime in a single write.
pub const TIMEOUT: Duration = Duration::from_secs(60);

/// Open transmitter device.
pub struct Transport {
    interface: nusb::Interface,
}

impl Transport {
    /// Finds and opens the transmitter using the default vendor/product
    /// identifiers.
    pub fn open() -> Result<Transport> {
        Transport::open_device(VENDOR_ID, PRODUCT_ID)
    }

    /// Finds and opens the first device matching `vendor_id:product_id` and
    /// claims the streaming interface.
    ///
    /// Device-not-found is fatal and surfaced before any transfer attempt.
    pub fn open_device(vendor_id: u16, product_id: u16) -> Result<Transport> {
        let mut devices = nusb::list_devices().context("failed to list USB devices")?;
        let info = devices
            .find(|dev| {
                tracing::debug!("{:04x} {:04x}", dev.vendor_id(), dev.product_id());
                dev.vendor_id() == vendor_id && dev.product_id() == product_id
            })
            .with_context(|| format!("device {vendor_id:04x}:{product_id:04x} not found"))?;
        tracing::info!(
            "found transmitter {vendor_id:04x}:{product_id:04x} on bus {} device {}",
            info.bus_number(),
            info.device_address()
        );
        let device = info.open().context("failed to open device")?;
        let interface = device
            .claim_interface(INTERFACE)
            .context("failed to claim streaming interface")?;
        Ok(Transport { interface })
    }

    /// Streams the packed sequence in one bulk write.
    ///
    /// Returns the achieved [`Throughput`] on success.
    #[tracing::instrument(name = "Transport::send", skip_all, fields(bytes = sequence.len()))]
    pub async fn send(&self, sequence: Bytes) -> Result<Throughput> {
        let count = sequence.len();
        let start = Instant::now();
        let completion = tokio::time::timeout(
            TIMEOUT,
            self.interface.bulk_out(ENDPOINT, sequence.to_vec()),
        )
        .await
        .context("bulk transfer timed out")?;
        completion.status.context("bulk transfer failed")?;
        let elapsed = start.elapsed();
        let bytes = completion.data.actual_length();
        if bytes < count {
            anyhow::bail!("short bulk write: {bytes} of {count} bytes");
        }
        Ok(Throughput { bytes, elapsed })
    }
}

/// Achieved throughput of a transfer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Throughput {
    /// Bytes transferred.
    pub bytes: usize,
    /// Wall time the transfer took.
    pub elapsed: Duration,
}

impl Throughput {
    /// Rate in bytes per second.
    pub fn bytes_per_sec(&self) -> f64 {
        self.bytes as f64 / self.elapsed.as_secs_f64()
    }

    /// Rate in KiB per second.
    pub fn kibi_per_sec(&self) -> f64 {
        self.bytes_per_sec() / 1024.0
    }
}

impl std::fmt::Display for Throughput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} bytes in {:.2} s ({:.1} kB/s)",
            self.bytes,
            self.elapsed.as_secs_f64(),
            self.kibi_per_sec()
        )
    }
}
