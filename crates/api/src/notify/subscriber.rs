//! A single open event stream

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use helpdesk_shared::UserRole;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use super::events::ServerEvent;
use super::hub::BroadcastHub;

/// Hub-side half of a subscription
#[derive(Debug)]
pub struct Subscriber {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: UserRole,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl Subscriber {
    pub fn new(user_id: Uuid, role: UserRole, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            role,
            sender,
        }
    }

    /// Non-blocking. Fails only once the receiving stream is gone.
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }
}

/// Client-side half of a subscription.
///
/// Yields events until the hub drops the subscriber. Dropping the stream
/// unregisters it from the hub.
pub struct SubscriberStream {
    id: Uuid,
    events: UnboundedReceiverStream<ServerEvent>,
    hub: Arc<BroadcastHub>,
}

impl SubscriberStream {
    pub(super) fn new(
        id: Uuid,
        receiver: mpsc::UnboundedReceiver<ServerEvent>,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            id,
            events: UnboundedReceiverStream::new(receiver),
            hub,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Stream for SubscriberStream {
    type Item = ServerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for SubscriberStream {
    fn drop(&mut self) {
        self.hub.unregister(&self.id);
    }
}
