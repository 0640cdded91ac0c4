//! Per-member outbound mailboxes with backpressure.
//!
//! Every connected member gets a bounded mpsc mailbox. Sends use
//! `try_send`, so a room worker is never blocked by a slow listener: a full
//! or closed mailbox drops the event and counts it.
//!
//! Fan-out shares one `Arc<ServerEvent>` across all recipients, so a mixed
//! block is allocated once no matter how many listeners a room has.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::protocol::ServerEvent;

/// Outbound event as delivered to a connection.
pub type Outbound = Arc<ServerEvent>;

/// Statistics for monitoring delivery health.
#[derive(Debug, Clone, Default)]
pub struct OutboxStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub connected_members: usize,
}

struct AtomicOutboxStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

/// Registry of member mailboxes.
pub struct Outbox {
    mailboxes: RwLock<HashMap<Uuid, mpsc::Sender<Outbound>>>,
    capacity: usize,
    stats: AtomicOutboxStats,
}

impl Outbox {
    /// `capacity` is the number of events buffered per member before drops.
    pub fn new(capacity: usize) -> Self {
        Self {
            mailboxes: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            stats: AtomicOutboxStats {
                messages_sent: AtomicU64::new(0),
                messages_dropped: AtomicU64::new(0),
            },
        }
    }

    /// Register a mailbox for a member, replacing any previous one.
    pub async fn register(&self, member_id: Uuid) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.mailboxes.write().await.insert(member_id, tx);
        rx
    }

    pub async fn unregister(&self, member_id: &Uuid) -> bool {
        self.mailboxes.write().await.remove(member_id).is_some()
    }

    /// Deliver one event to one member. Returns whether it was queued.
    pub async fn send(&self, member_id: Uuid, event: ServerEvent) -> bool {
        let mailboxes = self.mailboxes.read().await;
        self.deliver(&mailboxes, &member_id, &Arc::new(event))
    }

    /// Deliver one shared event to many members. Returns the delivered count.
    pub async fn send_many(&self, member_ids: &[Uuid], event: ServerEvent) -> usize {
        if member_ids.is_empty() {
            return 0;
        }
        let event = Arc::new(event);
        let mailboxes = self.mailboxes.read().await;
        member_ids
            .iter()
            .filter(|id| self.deliver(&mailboxes, id, &event))
            .count()
    }

    /// Deliver to every connected member.
    pub async fn send_all(&self, event: ServerEvent) -> usize {
        let event = Arc::new(event);
        let mailboxes = self.mailboxes.read().await;
        mailboxes
            .keys()
            .filter(|id| self.deliver(&mailboxes, id, &event))
            .count()
    }

    fn deliver(
        &self,
        mailboxes: &HashMap<Uuid, mpsc::Sender<Outbound>>,
        member_id: &Uuid,
        event: &Outbound,
    ) -> bool {
        let Some(tx) = mailboxes.get(member_id) else {
            return false;
        };
        match tx.try_send(event.clone()) {
            Ok(()) => {
                self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("Mailbox for {member_id} is full, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("Mailbox for {member_id} is closed");
                false
            }
        }
    }

    pub async fn is_connected(&self, member_id: &Uuid) -> bool {
        self.mailboxes.read().await.contains_key(member_id)
    }

    pub async fn connected(&self) -> usize {
        self.mailboxes.read().await.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Delivery statistics snapshot.
    pub async fn stats(&self) -> OutboxStats {
        OutboxStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            connected_members: self.connected().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_unregister() {
        let outbox = Outbox::new(8);
        let id = Uuid::new_v4();

        let _rx = outbox.register(id).await;
        assert!(outbox.is_connected(&id).await);
        assert_eq!(outbox.connected().await, 1);

        assert!(outbox.unregister(&id).await);
        assert!(!outbox.unregister(&id).await);
        assert_eq!(outbox.connected().await, 0);
    }

    #[tokio::test]
    async fn test_send_many_shares_event() {
        let outbox = Outbox::new(8);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let mut rx_a = outbox.register(a).await;
        let mut rx_b = outbox.register(b).await;
        let mut rx_c = outbox.register(c).await;

        let sent = outbox
            .send_many(&[a, b], ServerEvent::PlayAudio(vec![0.5; 4]))
            .await;
        assert_eq!(sent, 2);

        let got_a = rx_a.recv().await.unwrap();
        let got_b = rx_b.recv().await.unwrap();
        assert!(Arc::ptr_eq(&got_a, &got_b));
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_mailbox_drops() {
        let outbox = Outbox::new(1);
        assert_eq!(outbox.capacity(), 1);
        let id = Uuid::new_v4();
        let _rx = outbox.register(id).await;

        assert!(outbox.send(id, ServerEvent::AudioStart).await);
        assert!(!outbox.send(id, ServerEvent::AudioStart).await);

        let stats = outbox.stats().await;
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.messages_dropped, 1);
        assert_eq!(stats.connected_members, 1);
    }

    #[tokio::test]
    async fn test_zero_capacity_rounds_up() {
        let outbox = Outbox::new(0);
        assert_eq!(outbox.capacity(), 1);
        let id = Uuid::new_v4();
        let _rx = outbox.register(id).await;
        assert!(outbox.send(id, ServerEvent::AudioStart).await);
    }

    #[tokio::test]
    async fn test_send_to_unknown_member() {
        let outbox = Outbox::new(4);
        assert!(!outbox.send(Uuid::new_v4(), ServerEvent::AudioStart).await);
        assert_eq!(outbox.stats().await.messages_dropped, 0);
    }

    #[tokio::test]
    async fn test_send_all() {
        let outbox = Outbox::new(4);
        let mut rx1 = outbox.register(Uuid::new_v4()).await;
        let mut rx2 = outbox.register(Uuid::new_v4()).await;

        assert_eq!(outbox.send_all(ServerEvent::UpdateRooms(Vec::new())).await, 2);
        assert_eq!(*rx1.recv().await.unwrap(), ServerEvent::UpdateRooms(Vec::new()));
        assert_eq!(*rx2.recv().await.unwrap(), ServerEvent::UpdateRooms(Vec::new()));
    }

    #[tokio::test]
    async fn test_closed_receiver_counts_drop() {
        let outbox = Outbox::new(4);
        let id = Uuid::new_v4();
        let rx = outbox.register(id).await;
        drop(rx);

        assert!(!outbox.send(id, ServerEvent::AudioStart).await);
        assert_eq!(outbox.stats().await.messages_dropped, 1);
    }
}
