// the telemetry relay loop, one thread serving at most one client

use std::io::{ErrorKind, Write};
use std::mem;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, error, info, trace, warn};

use crate::app_config::RelayConfig;
use crate::averager::RunningAverager;
use crate::codec;
use crate::control::{RelayStatus, StopSignal};
use crate::error::{Error, Result};
use crate::messages::{AggregateFrame, Calibration, QueueItem};

pub enum RelayState {
    Listening,
    Connected { stream: TcpStream, peer: SocketAddr },
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub items_processed: u64,
    pub aggregates_sent: u64,
    pub transmit_failures: u64,
    pub clients_accepted: u64,
    pub clients_dropped: u64,
}

pub struct TelemetryRelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    inbound: Receiver<QueueItem>,
    stop: StopSignal,
    cfg: RelayConfig,
    state: RelayState,
    averager: RunningAverager,
    calibration: Option<Calibration>,
    stats: RelayStats,
    throughput: Throughput,
    status: Arc<RelayStatus>,
}

impl TelemetryRelayServer {
    pub fn bind(cfg: RelayConfig, inbound: Receiver<QueueItem>, stop: StopSignal) -> Result<TelemetryRelayServer> {
        if cfg.send_timeout_ms == 0 {
            return Err(Error::InvalidArgument("send_timeout_ms must be non-zero".to_string()));
        }

        let listener = TcpListener::bind(cfg.bind_addr())?;
        // accept is polled so the loop can keep draining the queue
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        info!("Telemetry relay listening on {local_addr}");

        Ok(TelemetryRelayServer {
            listener,
            local_addr,
            inbound,
            stop,
            throughput: Throughput::new(cfg.stats_interval()),
            cfg,
            state: RelayState::Listening,
            averager: RunningAverager::new(),
            calibration: None,
            stats: RelayStats::default(),
            status: RelayStatus::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn spawn(self) -> Result<RelayHandle> {
        let status = Arc::clone(&self.status);
        let local_addr = self.local_addr;
        status.set_running(true);
        let thread = thread::Builder::new()
            .name("telemetry-relay".to_string())
            .spawn(move || self.run())?;
        Ok(RelayHandle { status, local_addr, thread })
    }

    /// Main loop. Returns once the stop signal fires; the inbound queue is
    /// closed on the way out.
    pub fn run(mut self) -> RelayStats {
        let _running = RunningGuard::new(Arc::clone(&self.status));

        loop {
            match self.state {
                RelayState::Listening => self.listen(),
                RelayState::Connected { .. } => self.serve(),
                RelayState::Stopped => break,
            }

            self.throughput.tick();

            if self.stop.is_stopped() {
                info!("Stopping telemetry relay");
                self.state = RelayState::Stopped;
                self.status.set_client_connected(false);
            }
        }

        info!(
            "Telemetry relay exiting ({} items, {} aggregates sent, {} failed sends)",
            self.stats.items_processed, self.stats.aggregates_sent, self.stats.transmit_failures
        );
        self.stats
    }

    fn listen(&mut self) {
        match self.listener.accept() {
            Ok((stream, peer)) => match self.configure_client(&stream) {
                Ok(()) => {
                    info!("Have connection from {peer}");
                    self.state = RelayState::Connected { stream, peer };
                    self.stats.clients_accepted += 1;
                    self.status.set_client_connected(true);
                }
                Err(e) => warn!("Could not set up client {peer}: {e}"),
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                trace!("No client yet");
                thread::sleep(self.cfg.accept_poll());
                self.drain_calibration();
            }
            Err(e) => {
                error!("Error accepting client connection: {e}");
                thread::sleep(self.cfg.accept_poll());
            }
        }
    }

    fn configure_client(&self, stream: &TcpStream) -> Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(Some(self.cfg.send_timeout()))?;
        stream.set_nodelay(true)?;
        Ok(())
    }

    // keep calibration fresh while nobody is listening
    fn drain_calibration(&mut self) {
        let pending = self.inbound.len();
        for item in self.inbound.try_iter().take(pending) {
            self.calibration = Some(item.calibration());
            self.stats.items_processed += 1;
            self.throughput.items += 1;
        }
    }

    fn serve(&mut self) {
        let item = match self.inbound.try_recv() {
            Ok(item) => item,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                thread::sleep(self.cfg.idle());
                return;
            }
        };
        self.process(item);

        if self.averager.count() > self.cfg.average_threshold {
            self.publish();
        }
    }

    fn process(&mut self, item: QueueItem) {
        match item {
            QueueItem::Calibration(calibration) => {
                debug!("Calibration update: {calibration:?}");
                self.calibration = Some(calibration);
            }
            QueueItem::Data(frame) => {
                let (calibration, samples) = frame.into_parts();
                self.calibration = Some(calibration);
                self.averager.ingest(&samples);
            }
        }
        self.stats.items_processed += 1;
        self.throughput.items += 1;
    }

    /// Emit the aggregate and try to send it. A failed aggregate is gone for
    /// good; the averager has already reset.
    fn publish(&mut self) {
        let Some(mean) = self.averager.emit() else {
            return;
        };
        match self.send_aggregate(mean) {
            Ok(bytes) => {
                trace!("Sent {bytes} byte envelope");
                self.stats.aggregates_sent += 1;
                self.throughput.sent += 1;
            }
            Err(e) => {
                self.stats.transmit_failures += 1;
                error!("Transmission failed: {e}");
                if e.drops_client() {
                    self.drop_client();
                }
            }
        }
    }

    fn send_aggregate(&mut self, mean: Vec<f64>) -> Result<usize> {
        let calibration = self.calibration.ok_or(Error::MissingCalibration)?;
        let envelope = codec::encode(&AggregateFrame::new(calibration, mean))?;
        let RelayState::Connected { stream, .. } = &mut self.state else {
            return Err(Error::NotConnected);
        };
        transmit(stream, &envelope)?;
        Ok(envelope.len())
    }

    fn drop_client(&mut self) {
        if let RelayState::Connected { peer, .. } = mem::replace(&mut self.state, RelayState::Listening) {
            warn!("Dropping client {peer}, waiting for a new connection");
            self.stats.clients_dropped += 1;
            self.status.set_client_connected(false);
        }
    }
}

// one write, and it has to take the whole envelope
fn transmit(stream: &mut TcpStream, envelope: &[u8]) -> Result<()> {
    match stream.write(envelope) {
        Ok(written) if written == envelope.len() => Ok(()),
        Ok(written) => Err(Error::ShortWrite { written, expected: envelope.len() }),
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Err(Error::Timeout),
        Err(e) if e.kind() == ErrorKind::Interrupted => Err(Error::ShortWrite { written: 0, expected: envelope.len() }),
        Err(e) => Err(Error::Io(e)),
    }
}

struct Throughput {
    interval: Duration,
    last_tick: Instant,
    items: u64,
    sent: u64,
}

impl Throughput {
    fn new(interval: Duration) -> Throughput {
        Throughput { interval, last_tick: Instant::now(), items: 0, sent: 0 }
    }

    fn tick(&mut self) {
        let delta = self.last_tick.elapsed();
        if delta < self.interval {
            return;
        }
        let secs = delta.as_secs_f64();
        if self.items > 0 || self.sent > 0 {
            info!(
                "Elapsed Time = {:.5}, item rate = {:.1}/s, aggregate rate = {:.2}/s",
                secs,
                self.items as f64 / secs,
                self.sent as f64 / secs
            );
        } else {
            debug!("Elapsed Time = {secs:.5}, no items processed");
        }
        self.last_tick = Instant::now();
        self.items = 0;
        self.sent = 0;
    }
}

// clears the running flag however the loop ends
struct RunningGuard(Arc<RelayStatus>);

impl RunningGuard {
    fn new(status: Arc<RelayStatus>) -> RunningGuard {
        status.set_running(true);
        RunningGuard(status)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.set_client_connected(false);
        self.0.set_running(false);
    }
}

pub struct RelayHandle {
    status: Arc<RelayStatus>,
    local_addr: SocketAddr,
    thread: JoinHandle<RelayStats>,
}

impl RelayHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    pub fn is_client_connected(&self) -> bool {
        self.status.is_client_connected()
    }

    /// `None` if the relay thread panicked.
    pub fn join(self) -> Option<RelayStats> {
        self.thread.join().ok()
    }
}
