use std::time::Duration;

use config::{Config, Environment};
use serde::Deserialize;

use crate::error::Result;

// environment variables look like SPECTRA_RELAY_RELAY__PORT=6000
pub const ENV_PREFIX: &str = "SPECTRA_RELAY";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub log_level: String,
    pub relay: RelayConfig,
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub bind_ip: String,
    pub port: u16,
    /// an aggregate goes out once more than this many snapshots are summed
    pub average_threshold: usize,
    pub accept_poll_ms: u64,
    pub send_timeout_ms: u64,
    pub idle_ms: u64,
    pub stats_interval_ms: u64,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    pub fft_size: usize,
    pub sample_rate: f64, // in Hz
    pub center_freq: f64, // in Hz
    /// tone offsets from the center frequency, in Hz
    pub tones: Vec<f64>,
    pub noise_amplitude: f64,
    pub frame_interval_ms: u64,
    pub seed: u64,
}

impl AppConfig {
    /// Compiled-in defaults overridden by the environment. No files are read.
    pub fn load() -> Result<AppConfig> {
        let settings = Config::builder()
            .set_default("log_level", "info")?
            .set_default("relay.bind_ip", "0.0.0.0")?
            .set_default("relay.port", 50007)?
            .set_default("relay.average_threshold", 10)?
            .set_default("relay.accept_poll_ms", 10)?
            .set_default("relay.send_timeout_ms", 5000)?
            .set_default("relay.idle_ms", 1)?
            .set_default("relay.stats_interval_ms", 5000)?
            .set_default("relay.queue_capacity", 256)?
            .set_default("simulator.fft_size", 1024)?
            .set_default("simulator.sample_rate", 2_560_000.0)?
            .set_default("simulator.center_freq", 915_000_000.0)?
            .set_default("simulator.tones", vec![-400_000.0, 125_000.0, 600_000.0])?
            .set_default("simulator.noise_amplitude", 0.05)?
            .set_default("simulator.frame_interval_ms", 5)?
            .set_default("simulator.seed", 1)?
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

impl RelayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_ip, self.port)
    }

    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> RelayConfig {
        RelayConfig {
            bind_ip: "0.0.0.0".to_string(),
            port: 50007,
            average_threshold: 10,
            accept_poll_ms: 10,
            send_timeout_ms: 5000,
            idle_ms: 1,
            stats_interval_ms: 5000,
            queue_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_environment() {
        let cfg = AppConfig::load().expect("defaults should deserialize");
        assert_eq!(cfg.relay.port, 50007);
        assert_eq!(cfg.relay.average_threshold, 10);
        assert_eq!(cfg.relay.send_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.simulator.tones.len(), 3);
        assert_eq!(cfg.log_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn bind_addr_joins_ip_and_port() {
        let relay = RelayConfig { port: 6000, ..RelayConfig::default() };
        assert_eq!(relay.bind_addr(), "0.0.0.0:6000");
    }
}
