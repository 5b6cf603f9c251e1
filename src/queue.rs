// the inbound queue between acquisition (sole producer) and the relay (sole consumer)

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{error, warn};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::messages::QueueItem;

/// A zero capacity would make a rendezvous channel, and since neither side
/// ever blocks nothing would get through.
pub fn inbound_queue(capacity: usize) -> Result<(QueueProducer, Receiver<QueueItem>)> {
    if capacity == 0 {
        return Err(Error::InvalidArgument("queue_capacity must be non-zero".to_string()));
    }
    let (sender, receiver) = crossbeam_channel::bounded(capacity);
    Ok((QueueProducer { sender, dropped: 0, rejected: 0 }, receiver))
}

#[derive(Debug, PartialEq, Eq)]
pub enum Pushed {
    Queued,
    /// queue full, the item was dropped
    Dropped,
    /// the relay has gone away
    Closed,
}

/// Producer half. Pushing never blocks: when the relay falls behind,
/// snapshots are dropped instead of stalling acquisition.
pub struct QueueProducer {
    sender: Sender<QueueItem>,
    dropped: u64,
    rejected: u64,
}

impl QueueProducer {
    pub fn push(&mut self, item: QueueItem) -> Pushed {
        match self.sender.try_send(item) {
            Ok(()) => Pushed::Queued,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped % 100 == 1 {
                    warn!("Inbound queue full, {} snapshots dropped so far", self.dropped);
                }
                Pushed::Dropped
            }
            Err(TrySendError::Disconnected(_)) => Pushed::Closed,
        }
    }

    /// Push a dict-shaped message from the acquisition process. Anything that
    /// is not a calibration update or a data frame is logged and discarded.
    pub fn push_json(&mut self, value: Value) -> Pushed {
        match QueueItem::from_json(value) {
            Ok(item) => self.push(item),
            Err(e) => {
                self.rejected += 1;
                error!("Discarding queue item: {e}");
                Pushed::Dropped
            }
        }
    }

    /// True once the relay has taken everything pushed so far
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}
