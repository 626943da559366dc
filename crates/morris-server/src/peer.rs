//! Connected peers: identifiers, outbound handles, and deferred delivery.
//!
//! A [`PeerHandle`] only enqueues on the peer's outbound channel; the
//! connection's writer task does the socket I/O. The lobby returns an
//! [`Outbox`] from every mutation so callers deliver after releasing its
//! lock. A match enqueues under its own lock so game messages stay ordered.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use morris_net::Message;
use tokio::sync::{RwLock, mpsc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

/// Atomic generator for monotonically increasing ids, starting at 1.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_raw(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_peer(&self) -> PeerId {
        PeerId(self.next_raw())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap, cloneable sending side of a peer's outbound queue.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: PeerId,
    tx: mpsc::UnboundedSender<Message>,
}

impl PeerHandle {
    pub fn new(id: PeerId, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Queue `msg`. Returns false if the connection is already gone.
    pub fn send(&self, msg: Message) -> bool {
        self.tx.send(msg).is_ok()
    }
}

/// Messages collected under a lock and enqueued together.
#[derive(Debug, Default)]
#[must_use = "an outbox does nothing until delivered"]
pub struct Outbox {
    items: Vec<(PeerHandle, Message)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, peer: &PeerHandle, msg: Message) {
        self.items.push((peer.clone(), msg));
    }

    pub fn append(&mut self, mut other: Outbox) {
        self.items.append(&mut other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Messages queued for `peer`, in order.
    pub fn messages_for(&self, peer: PeerId) -> impl Iterator<Item = &Message> {
        self.items
            .iter()
            .filter(move |(handle, _)| handle.id == peer)
            .map(|(_, msg)| msg)
    }

    /// Enqueue everything on the recipients' channels.
    pub fn deliver(self) {
        for (peer, msg) in self.items {
            let tag = msg.tag();
            if !peer.send(msg) {
                tracing::debug!("dropping {tag:?} for closed peer {:?}", peer.id);
            }
        }
    }
}

/// Error returned when the connection map is at capacity.
#[derive(Debug, thiserror::Error)]
#[error("connection limit of {0} reached")]
pub struct ConnectionLimitReached(pub usize);

/// Live connections and their remote addresses.
pub struct ConnectionMap {
    inner: RwLock<HashMap<PeerId, SocketAddr>>,
    max_connections: usize,
}

impl ConnectionMap {
    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    pub async fn insert(&self, id: PeerId, addr: SocketAddr) -> Result<(), ConnectionLimitReached> {
        let mut map = self.inner.write().await;
        if map.len() >= self.max_connections {
            return Err(ConnectionLimitReached(self.max_connections));
        }
        map.insert(id, addr);
        Ok(())
    }

    pub async fn remove(&self, id: &PeerId) -> Option<SocketAddr> {
        self.inner.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// Test helper: a handle whose queue can be inspected.
#[cfg(test)]
pub(crate) fn test_peer(id: u64) -> (PeerHandle, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PeerHandle::new(PeerId(id), tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use morris_net::Payload;

    #[test]
    fn test_ids_are_sequential() {
        let ids = IdGenerator::new();
        let a = ids.next_peer();
        let b = ids.next_peer();
        assert_eq!(a, PeerId(1));
        assert_eq!(b.0, a.0 + 1);
    }

    #[test]
    fn test_outbox_delivers_in_order() {
        let (alice, mut rx) = test_peer(1);
        let (bob, mut bob_rx) = test_peer(2);
        let mut outbox = Outbox::new();
        outbox.push(&alice, Message::new(1, Payload::Logout));
        outbox.push(&bob, Message::new(2, Payload::Logout));
        outbox.push(&alice, Message::new(3, Payload::Logout));
        assert_eq!(outbox.messages_for(PeerId(1)).count(), 2);

        outbox.deliver();
        assert_eq!(rx.try_recv().unwrap().reference, 1);
        assert_eq!(rx.try_recv().unwrap().reference, 3);
        assert_eq!(bob_rx.try_recv().unwrap().reference, 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_to_closed_peer_reports_false() {
        let (alice, rx) = test_peer(1);
        drop(rx);
        assert!(!alice.send(Message::new(1, Payload::Logout)));
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let map = ConnectionMap::new(1);
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        map.insert(PeerId(1), addr).await.unwrap();
        assert!(map.insert(PeerId(2), addr).await.is_err());
        map.remove(&PeerId(1)).await;
        assert!(map.is_empty().await);
        map.insert(PeerId(2), addr).await.unwrap();
        assert_eq!(map.len().await, 1);
    }
}
