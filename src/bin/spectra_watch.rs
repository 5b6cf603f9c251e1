// connects to a running relay and logs the peaks found in every frame it receives

use log::{error, info};

use spectra_relay::app_config::AppConfig;
use spectra_relay::client::{AnnotatedFrame, TelemetryClient};
use spectra_relay::peaks::DEFAULT_SENSITIVITY;

fn main() {
    let cfg = AppConfig::load().expect("should be able to load configuration");

    let mut logger = colog::default_builder();
    logger.filter_level(cfg.log_filter());
    logger.init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("127.0.0.1:{}", cfg.relay.port));

    let mut client = match TelemetryClient::connect(&addr[..], None) {
        Ok(client) => client,
        Err(e) => {
            error!("Could not connect to {addr}: {e}");
            std::process::exit(1);
        }
    };

    loop {
        let frame = match client.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                error!("Lost connection to {}: {e}", client.peer());
                std::process::exit(1);
            }
        };

        let cal = frame.calibration();
        let annotated = AnnotatedFrame::new(frame, DEFAULT_SENSITIVITY);
        info!(
            "{} bins, {:0.3} - {:0.3} MHz, {} peaks",
            cal.num_bins,
            cal.start_freq / 1_000_000.0,
            cal.stop_freq() / 1_000_000.0,
            annotated.peaks.maxima.len()
        );
        for label in annotated.labels() {
            info!("  peak:{label}");
        }
    }
}
