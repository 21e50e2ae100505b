//! Notification event types and SSE framing

use axum::response::sse::Event;
use helpdesk_shared::{AssigneeChange, TicketPatch, TicketStatus, TicketUrgency};
use serde::Serialize;
use uuid::Uuid;

/// Events pushed to subscribers
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Stream opened; always the first event a subscriber sees
    Connected { subscriber_id: Uuid },

    TicketCreated { ticket_id: Uuid, ticket_number: i64 },

    /// Only the fields that changed are present. `assigned_to: null`
    /// means the assignee was cleared.
    TicketUpdated {
        ticket_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<TicketStatus>,
        #[serde(skip_serializing_if = "Option::is_none")]
        urgency: Option<TicketUrgency>,
        #[serde(skip_serializing_if = "Option::is_none")]
        assigned_to: Option<Option<Uuid>>,
    },

    TicketDeleted { ticket_id: Uuid },

    CommentCreated { ticket_id: Uuid, comment_id: Uuid },
}

impl ServerEvent {
    pub fn ticket_updated(ticket_id: Uuid, patch: &TicketPatch) -> Self {
        Self::TicketUpdated {
            ticket_id,
            status: patch.status,
            urgency: patch.urgency,
            assigned_to: patch.assignee.as_ref().map(AssigneeChange::technician_id),
        }
    }

    /// SSE `event:` name
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::TicketCreated { .. } => "ticket_created",
            Self::TicketUpdated { .. } => "ticket_updated",
            Self::TicketDeleted { .. } => "ticket_deleted",
            Self::CommentCreated { .. } => "comment_created",
        }
    }

    pub fn ticket_id(&self) -> Option<Uuid> {
        match self {
            Self::Connected { .. } => None,
            Self::TicketCreated { ticket_id, .. }
            | Self::TicketUpdated { ticket_id, .. }
            | Self::TicketDeleted { ticket_id }
            | Self::CommentCreated { ticket_id, .. } => Some(*ticket_id),
        }
    }

    pub fn to_sse_event(&self) -> Event {
        Event::default()
            .event(self.event_name())
            .data(serde_json::to_string(self).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ticket_updated_only_carries_changed_fields() {
        let ticket_id = Uuid::new_v4();
        let patch = TicketPatch {
            status: Some(TicketStatus::Resolved),
            ..Default::default()
        };
        let value = serde_json::to_value(ServerEvent::ticket_updated(ticket_id, &patch)).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "ticket_updated",
                "ticket_id": ticket_id,
                "status": "resolved",
            })
        );
    }

    #[test]
    fn test_cleared_assignee_serializes_as_null() {
        let ticket_id = Uuid::new_v4();
        let patch = TicketPatch {
            assignee: Some(AssigneeChange::Clear),
            ..Default::default()
        };
        let value = serde_json::to_value(ServerEvent::ticket_updated(ticket_id, &patch)).unwrap();
        assert_eq!(value["assigned_to"], serde_json::Value::Null);
        assert!(value.as_object().unwrap().contains_key("assigned_to"));
        assert!(!value.as_object().unwrap().contains_key("urgency"));
    }

    #[test]
    fn test_event_names() {
        let id = Uuid::new_v4();
        assert_eq!(ServerEvent::Connected { subscriber_id: id }.event_name(), "connected");
        assert_eq!(ServerEvent::TicketDeleted { ticket_id: id }.event_name(), "ticket_deleted");
        assert_eq!(
            ServerEvent::CommentCreated { ticket_id: id, comment_id: id }.ticket_id(),
            Some(id)
        );
        assert_eq!(ServerEvent::Connected { subscriber_id: id }.ticket_id(), None);
    }
}
