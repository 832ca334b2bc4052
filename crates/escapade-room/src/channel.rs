//! Per-room publish/subscribe group.

use std::collections::HashMap;

use escapade_protocol::{ClientId, Recipient, ServerEvent};
use tokio::sync::mpsc;
use tracing::trace;

/// Channel sender for delivering events to one client connection.
pub type ClientSender = mpsc::UnboundedSender<ServerEvent>;

/// The clients joined to one room.
///
/// Owned by the room actor. Publishing never blocks: each subscriber has
/// an unbounded queue drained by its connection task, so events reach a
/// given client in the order they were published.
#[derive(Debug, Default)]
pub struct BroadcastChannel {
    subscribers: HashMap<ClientId, ClientSender>,
}

impl BroadcastChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client. Re-joining replaces the previous queue.
    pub fn join(&mut self, client_id: ClientId, sender: ClientSender) {
        self.subscribers.insert(client_id, sender);
    }

    /// Removes a client. Returns `false` if it wasn't joined.
    pub fn leave(&mut self, client_id: ClientId) -> bool {
        self.subscribers.remove(&client_id).is_some()
    }

    pub fn contains(&self, client_id: ClientId) -> bool {
        self.subscribers.contains_key(&client_id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Delivers an event to every subscriber.
    pub fn publish(&mut self, event: ServerEvent) {
        self.deliver(Recipient::All, event);
    }

    /// Delivers an event to one client, or to all. Subscribers whose
    /// queue is closed are dropped.
    pub fn deliver(&mut self, recipient: Recipient, event: ServerEvent) {
        let name = event.name();
        match recipient {
            Recipient::All => {
                let before = self.subscribers.len();
                self.subscribers
                    .retain(|_, sender| sender.send(event.clone()).is_ok());
                let pruned = before - self.subscribers.len();
                trace!(event = name, receivers = self.subscribers.len(), pruned, "published");
            }
            Recipient::Client(client_id) => {
                let closed = self
                    .subscribers
                    .get(&client_id)
                    .is_some_and(|sender| sender.send(event).is_err());
                if closed {
                    self.subscribers.remove(&client_id);
                    trace!(event = name, %client_id, "subscriber gone, pruned");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> (ClientSender, mpsc::UnboundedReceiver<ServerEvent>) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn test_publish_reaches_every_subscriber_in_order() {
        let mut ch = BroadcastChannel::new();
        let (a_tx, mut a_rx) = client();
        let (b_tx, mut b_rx) = client();
        ch.join(ClientId(1), a_tx);
        ch.join(ClientId(2), b_tx);

        ch.publish(ServerEvent::TimerComplete);
        ch.publish(ServerEvent::SecondaryTimerComplete);

        for rx in [&mut a_rx, &mut b_rx] {
            assert_eq!(rx.try_recv().unwrap(), ServerEvent::TimerComplete);
            assert_eq!(rx.try_recv().unwrap(), ServerEvent::SecondaryTimerComplete);
        }
    }

    #[test]
    fn test_closed_subscribers_are_pruned_on_publish() {
        let mut ch = BroadcastChannel::new();
        let (a_tx, a_rx) = client();
        let (b_tx, _b_rx) = client();
        ch.join(ClientId(1), a_tx);
        ch.join(ClientId(2), b_tx);
        drop(a_rx);

        ch.publish(ServerEvent::TimerComplete);
        assert_eq!(ch.len(), 1);
        assert!(!ch.contains(ClientId(1)));
    }

    #[test]
    fn test_deliver_to_one_client() {
        let mut ch = BroadcastChannel::new();
        let (a_tx, mut a_rx) = client();
        let (b_tx, mut b_rx) = client();
        ch.join(ClientId(1), a_tx);
        ch.join(ClientId(2), b_tx);

        ch.deliver(Recipient::Client(ClientId(2)), ServerEvent::TimerComplete);
        assert!(a_rx.try_recv().is_err());
        assert_eq!(b_rx.try_recv().unwrap(), ServerEvent::TimerComplete);
    }

    #[test]
    fn test_leave() {
        let mut ch = BroadcastChannel::new();
        let (tx, _rx) = client();
        ch.join(ClientId(1), tx);
        assert!(ch.leave(ClientId(1)));
        assert!(!ch.leave(ClientId(1)));
        assert!(ch.is_empty());
    }
}
