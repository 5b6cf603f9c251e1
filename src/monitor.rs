// a simulated radio feeding snapshots into the relay's inbound queue

use std::thread;
use std::time::Duration;

use log::{debug, error, info};

use crate::app_config::SimulatorConfig;
use crate::control::StopSignal;
use crate::error::Result;
use crate::messages::QueueItem;
use crate::psd::SyntheticPsd;
use crate::queue::{Pushed, QueueProducer};

pub struct Monitor {
    psd: SyntheticPsd,
    producer: QueueProducer,
    stop: StopSignal,
    frame_interval: Duration,
}

impl Monitor {
    pub fn new(cfg: &SimulatorConfig, producer: QueueProducer, stop: StopSignal) -> Result<Monitor> {
        let psd = SyntheticPsd::new(cfg)?;
        debug!(
            "Simulating {} bins from {:.3} MHz, {} Hz per bin",
            cfg.fft_size,
            psd.calibration().start_freq / 1e6,
            psd.calibration().bin_size
        );
        Ok(Monitor {
            psd,
            producer,
            stop,
            frame_interval: Duration::from_millis(cfg.frame_interval_ms),
        })
    }

    /// Runs until stopped or until the relay closes the queue. Returns the
    /// number of snapshots queued.
    pub fn start(&mut self) -> u64 {
        info!("Starting simulated acquisition...");
        let mut queued = 0u64;

        // the relay learns the band before any data shows up
        if self.producer.push(QueueItem::Calibration(self.psd.calibration())) == Pushed::Closed {
            return queued;
        }

        while !self.stop.is_stopped() {
            let frame = match self.psd.snapshot() {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to build snapshot: {e}");
                    break;
                }
            };
            match self.producer.push(QueueItem::Data(frame)) {
                Pushed::Queued => queued += 1,
                Pushed::Dropped => {}
                Pushed::Closed => {
                    info!("Relay closed the queue");
                    break;
                }
            }
            thread::sleep(self.frame_interval);
        }

        info!(
            "Acquisition stopped ({} snapshots queued, {} dropped)",
            queued,
            self.producer.dropped()
        );
        queued
    }
}
