//! Change emitter
//!
//! Called by mutation handlers once the store has committed. Emitting never
//! fails from the caller's point of view.

use std::sync::Arc;

use helpdesk_shared::{Comment, Ticket, TicketPatch};
use uuid::Uuid;

use super::events::ServerEvent;
use super::hub::BroadcastHub;

pub trait ChangeEmitter: Send + Sync {
    fn ticket_created(&self, ticket: &Ticket);
    fn ticket_updated(&self, ticket_id: Uuid, patch: &TicketPatch);
    fn ticket_deleted(&self, ticket_id: Uuid);
    fn comment_created(&self, comment: &Comment);
}

/// Publishes every change to all hub subscribers
pub struct HubEmitter {
    hub: Arc<BroadcastHub>,
}

impl HubEmitter {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self { hub }
    }

    fn emit(&self, event: ServerEvent) {
        let report = self.hub.publish(&event);
        if report.dropped > 0 {
            tracing::debug!(
                event = event.event_name(),
                dropped = report.dropped,
                "Dropped closed subscribers while emitting"
            );
        }
    }
}

impl ChangeEmitter for HubEmitter {
    fn ticket_created(&self, ticket: &Ticket) {
        self.emit(ServerEvent::TicketCreated {
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number,
        });
    }

    fn ticket_updated(&self, ticket_id: Uuid, patch: &TicketPatch) {
        self.emit(ServerEvent::ticket_updated(ticket_id, patch));
    }

    fn ticket_deleted(&self, ticket_id: Uuid) {
        self.emit(ServerEvent::TicketDeleted { ticket_id });
    }

    fn comment_created(&self, comment: &Comment) {
        self.emit(ServerEvent::CommentCreated {
            ticket_id: comment.ticket_id,
            comment_id: comment.id,
        });
    }
}
