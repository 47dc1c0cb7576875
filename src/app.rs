//! ddstx application.
//!
//! This module contains the top-level structure [`App`] that represents the
//! host streaming role: load the frequency track, FM-modulate and pack it
//! into the on-wire nibble format, open the transmitter over USB and push
//! the sequence through the bulk endpoint.

use crate::{
    args::Args,
    usb::Transport,
    waveform::{self, Modulator},
};
use anyhow::{Context, Result};
use tokio::fs;

/// ddstx application.
#[derive(Debug)]
pub struct App {
    args: Args,
}

impl App {
    /// Creates a new application.
    pub fn new(args: &Args) -> App {
        App { args: args.clone() }
    }

    /// Runs the application: one load-modulate-transmit pass.
    #[tracing::instrument(name = "App::run", skip_all)]
    pub async fn run(self) -> Result<()> {
        let data = fs::read(&self.args.waveform)
            .await
            .with_context(|| format!("failed to read {}", self.args.waveform.display()))?;
        let mut track = waveform::parse_track(&data)?;
        if let Some(seconds) = self.args.seconds {
            track.truncate((seconds * self.args.samp_rate) as usize);
        }
        tracing::info!(
            "loaded {} samples ({:.1} s of airtime)",
            track.len(),
            track.len() as f64 / self.args.samp_rate
        );

        let mut modulator = Modulator::new(self.args.samp_rate, self.args.deviation);
        let sequence = modulator.modulate(&track);
        if modulator.clipped() > 0 {
            tracing::debug!("{} components clipped during quantization", modulator.clipped());
        }

        let transport = Transport::open_device(self.args.vendor_id, self.args.product_id)?;
        let throughput = transport.send(sequence).await?;
        tracing::info!("{throughput}");
        Ok(())
    }
}
