//! Subscriber registry and event fan-out

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use helpdesk_shared::UserRole;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::ServerEvent;
use super::subscriber::{Subscriber, SubscriberStream};

/// Outcome of one [`BroadcastHub::publish`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Subscribers whose stream had closed; they are no longer registered
    pub dropped: usize,
}

/// Registry of open event streams.
///
/// The lock is a std mutex and is never held across an await point, so
/// unregistering from `Drop` is safe.
#[derive(Default)]
pub struct BroadcastHub {
    subscribers: Mutex<HashMap<Uuid, Subscriber>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<Uuid, Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a stream for a user. The stream starts with a `connected` event
    /// and unregisters itself when dropped.
    pub fn subscribe(self: &Arc<Self>, user_id: Uuid, role: UserRole) -> SubscriberStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = Subscriber::new(user_id, role, tx);
        let id = subscriber.id;

        // Queued before registration so it always comes first
        let _ = subscriber.send(ServerEvent::Connected { subscriber_id: id });
        self.register(subscriber);

        SubscriberStream::new(id, rx, Arc::clone(self))
    }

    pub fn register(&self, subscriber: Subscriber) {
        let mut subscribers = self.subscribers();
        let (id, user_id) = (subscriber.id, subscriber.user_id);
        subscribers.insert(id, subscriber);

        tracing::info!(
            subscriber_id = %id,
            user_id = %user_id,
            total_subscribers = subscribers.len(),
            "Event subscriber registered"
        );
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unregister(&self, subscriber_id: &Uuid) -> bool {
        let mut subscribers = self.subscribers();
        match subscribers.remove(subscriber_id) {
            Some(subscriber) => {
                tracing::info!(
                    subscriber_id = %subscriber_id,
                    user_id = %subscriber.user_id,
                    remaining_subscribers = subscribers.len(),
                    "Event subscriber removed"
                );
                true
            }
            None => false,
        }
    }

    /// Deliver an event to every subscriber. Subscribers whose stream has
    /// closed are removed in the same pass; the rest are unaffected.
    pub fn publish(&self, event: &ServerEvent) -> DeliveryReport {
        let mut subscribers = self.subscribers();
        let mut report = DeliveryReport::default();

        subscribers.retain(|id, subscriber| match subscriber.send(event.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(_) => {
                report.dropped += 1;
                tracing::warn!(
                    subscriber_id = %id,
                    "Failed to deliver event to subscriber (stream closed), dropping"
                );
                false
            }
        });

        tracing::debug!(
            event = event.event_name(),
            ticket_id = ?event.ticket_id(),
            recipients = report.delivered,
            dropped = report.dropped,
            "Published event"
        );

        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    pub fn stats(&self) -> HubStats {
        let subscribers = self.subscribers();
        let mut by_role: BTreeMap<&'static str, usize> = BTreeMap::new();
        for subscriber in subscribers.values() {
            *by_role.entry(subscriber.role.as_str()).or_default() += 1;
        }
        HubStats {
            active_subscribers: subscribers.len(),
            by_role,
        }
    }

    /// Drop every subscriber. Their streams end once drained.
    pub fn close_all(&self) -> usize {
        let mut subscribers = self.subscribers();
        let closed = subscribers.len();
        subscribers.clear();
        tracing::info!(closed, "Closed all event subscribers");
        closed
    }
}

/// Statistics about open event streams
#[derive(Debug, Clone, serde::Serialize)]
pub struct HubStats {
    pub active_subscribers: usize,
    pub by_role: BTreeMap<&'static str, usize>,
}
