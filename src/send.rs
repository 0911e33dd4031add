//! Where translated packets go

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::{packet::Packet, Step};

/// Hands translated packets to the outside world (or back into the translator, for hairpins)
pub trait PacketSender: Send + Sync {
    /// Send `out`, the translation of `original`
    fn send(&self, original: &Packet, out: Packet) -> Step<()>;
}

/// Collects translated packets until somebody drains them
#[derive(Debug, Default)]
pub struct QueueSender {
    queue: Mutex<VecDeque<Packet>>,
}

impl QueueSender {
    /// Take every queued packet, oldest first
    pub fn drain(&self) -> Vec<Packet> {
        self.queue.lock().drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl PacketSender for QueueSender {
    fn send(&self, original: &Packet, out: Packet) -> Step<()> {
        log::trace!("Queueing {} (translated from {})", out.tuple(), original.tuple());
        self.queue.lock().push_back(out);
        Ok(())
    }
}
