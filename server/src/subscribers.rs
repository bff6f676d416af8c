//! Subscriber registry and fan-out for the push surface.
//!
//! Each connected viewer owns a bounded outgoing queue drained by its own
//! writer task, so a slow or unresponsive viewer never blocks delivery to
//! the others. Overflowing the queue disconnects that viewer; it will
//! re-bootstrap on reconnect rather than receive missed events.

use log::{info, warn};
use shared::Packet;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Outgoing packets buffered per subscriber before overflow disconnects it.
pub const SUBSCRIBER_QUEUE_CAP: usize = 64;

/// A viewer is dropped after this long without a heartbeat or request.
pub const SUBSCRIBER_TIMEOUT: Duration = Duration::from_secs(10);

/// One connected viewer on the push surface.
#[derive(Debug)]
pub struct Subscriber {
    pub id: u32,
    pub addr: SocketAddr,
    /// Last time any packet arrived from this viewer.
    pub last_seen: Instant,
    tx: mpsc::Sender<Packet>,
}

impl Subscriber {
    fn new(id: u32, addr: SocketAddr, tx: mpsc::Sender<Packet>) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            tx,
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Registry of live subscribers, owned by the server loop.
///
/// Adding a subscriber hands over the sending half of its queue; dropping
/// the registry entry drops the sender and ends the writer task.
pub struct SubscriberManager {
    subscribers: HashMap<u32, Subscriber>,
    next_subscriber_id: u32,
    max_subscribers: usize,
}

impl SubscriberManager {
    pub fn new(max_subscribers: usize) -> Self {
        Self {
            subscribers: HashMap::new(),
            next_subscriber_id: 1,
            max_subscribers,
        }
    }

    /// Registers a viewer, returning its id, or `None` at capacity.
    pub fn add_subscriber(&mut self, addr: SocketAddr, tx: mpsc::Sender<Packet>) -> Option<u32> {
        if self.subscribers.len() >= self.max_subscribers {
            return None;
        }

        let id = self.next_subscriber_id;
        self.next_subscriber_id += 1;

        info!("Subscriber {} connected from {}", id, addr);
        self.subscribers.insert(id, Subscriber::new(id, addr, tx));
        Some(id)
    }

    /// Drops a viewer. Returns its address if it was still registered.
    pub fn remove_subscriber(&mut self, id: u32) -> Option<SocketAddr> {
        self.subscribers.remove(&id).map(|sub| {
            info!("Subscriber {} disconnected", sub.id);
            sub.addr
        })
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.subscribers
            .iter()
            .find(|(_, sub)| sub.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Refreshes the liveness stamp for the viewer at `addr`.
    pub fn touch(&mut self, addr: SocketAddr) {
        if let Some(id) = self.find_by_addr(addr) {
            if let Some(sub) = self.subscribers.get_mut(&id) {
                sub.last_seen = Instant::now();
            }
        }
    }

    /// Queues a packet for one viewer. `false` means the queue overflowed or
    /// the writer is gone; the caller should disconnect the viewer.
    pub fn enqueue(&self, id: u32, packet: Packet) -> bool {
        match self.subscribers.get(&id) {
            Some(sub) => match sub.tx.try_send(packet) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!("Subscriber {} queue overflow", id);
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            },
            None => false,
        }
    }

    /// Fans a packet out to every live viewer, fire-and-forget. Returns the
    /// ids whose queues overflowed or closed so the caller can drop them.
    pub fn broadcast(&self, packet: &Packet) -> Vec<u32> {
        let mut dead = Vec::new();
        for (id, sub) in &self.subscribers {
            match sub.tx.try_send(packet.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Subscriber {} queue overflow during broadcast", id);
                    dead.push(*id);
                }
                Err(TrySendError::Closed(_)) => dead.push(*id),
            }
        }
        dead
    }

    /// Finds viewers that have gone silent past [`SUBSCRIBER_TIMEOUT`].
    pub fn check_timeouts(&self) -> Vec<u32> {
        self.subscribers
            .iter()
            .filter(|(_, sub)| sub.is_timed_out(SUBSCRIBER_TIMEOUT))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
