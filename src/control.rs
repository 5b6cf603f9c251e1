// cooperative shutdown: a done-channel that every worker polls once per loop

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn stop_signal() -> (StopTrigger, StopSignal) {
    let (sender, receiver) = crossbeam_channel::bounded(0);
    (StopTrigger { _sender: sender }, StopSignal { receiver })
}

/// Held by the controller. Calling `stop` (or dropping it) stops every
/// `StopSignal` cloned from the same pair.
pub struct StopTrigger {
    _sender: Sender<()>,
}

impl StopTrigger {
    pub fn stop(self) {
        // disconnecting the channel is the signal
        drop(self);
    }
}

#[derive(Clone)]
pub struct StopSignal {
    receiver: Receiver<()>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }
}

/// What the controller can observe about the relay thread from outside.
#[derive(Debug, Default)]
pub struct RelayStatus {
    running: AtomicBool,
    client_connected: AtomicBool,
}

impl RelayStatus {
    pub fn new() -> Arc<RelayStatus> {
        Arc::new(RelayStatus::default())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_client_connected(&self) -> bool {
        self.client_connected.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn set_client_connected(&self, connected: bool) {
        self.client_connected.store(connected, Ordering::Release);
    }
}
