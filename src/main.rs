use std::thread;
use std::time::Duration;

use log::{error, info};
use signalbool::{Flag, Signal, SignalBool};

use spectra_relay::app_config::AppConfig;
use spectra_relay::control::stop_signal;
use spectra_relay::monitor::Monitor;
use spectra_relay::queue::inbound_queue;
use spectra_relay::relay::TelemetryRelayServer;

fn main() {
    let cfg = AppConfig::load().expect("should be able to load configuration");

    let mut logger = colog::default_builder();
    logger.filter_level(cfg.log_filter());
    logger.init();

    let sigint = SignalBool::new(&[Signal::SIGINT, Signal::SIGTERM], Flag::Restart)
        .expect("should be able to install signal handler");

    let (trigger, stop) = stop_signal();
    let (producer, inbound) = inbound_queue(cfg.relay.queue_capacity).expect("invalid queue capacity");

    // start the relay first so the queue has a consumer
    let relay = TelemetryRelayServer::bind(cfg.relay.clone(), inbound, stop.clone())
        .expect("should be able to bind the relay port");
    let relay = relay.spawn().expect("should be able to start the relay thread");

    let mut monitor = Monitor::new(&cfg.simulator, producer, stop).expect("invalid simulator settings");
    let acquisition = thread::Builder::new()
        .name("acquisition".to_string())
        .spawn(move || monitor.start())
        .expect("should be able to start the acquisition thread");

    info!("Relay up on {}, press ctrl-c to stop", relay.local_addr());
    while !sigint.caught() && relay.is_running() {
        thread::sleep(Duration::from_millis(100));
    }

    trigger.stop();
    match relay.join() {
        Some(stats) => info!("Relay finished: {stats:?}"),
        None => error!("Relay thread panicked"),
    }
    if acquisition.join().is_err() {
        error!("Acquisition thread panicked");
    }
}
