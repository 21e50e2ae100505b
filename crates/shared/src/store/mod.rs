//! Data access for the helpdesk
//!
//! Handlers talk to a `dyn HelpdeskStore`; the backend is picked at start-up.
//! Every mutating method commits before it returns, so callers may treat an
//! `Ok` as durable.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::{
    Attachment, Comment, NewAttachment, NewComment, NewTechnician, NewTicket, NewUser,
    ReportSummary, Technician, TechnicianPatch, Ticket, TicketFilter, TicketPatch, User,
    UserPatch,
};

/// Days covered by the report's daily series
pub const REPORT_DAYS: u32 = 7;
/// Rows in the report's recent ticket list
pub const REPORT_RECENT_LIMIT: usize = 50;

#[async_trait]
pub trait HelpdeskStore: Send + Sync {
    /// Cheap round trip used by the readiness probe
    async fn ping(&self) -> StoreResult<()>;

    // Users
    async fn count_users(&self) -> StoreResult<i64>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn get_user(&self, id: Uuid) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Fails with `Conflict` when the email is taken
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<User>;
    async fn delete_user(&self, id: Uuid) -> StoreResult<()>;

    // Technicians
    /// Active technicians first, then by name
    async fn list_technicians(&self) -> StoreResult<Vec<Technician>>;
    async fn get_technician(&self, id: Uuid) -> StoreResult<Technician>;
    /// The technician record linked to a user account, if any
    async fn technician_for_user(&self, user_id: Uuid) -> StoreResult<Option<Technician>>;
    async fn create_technician(&self, tech: NewTechnician) -> StoreResult<Technician>;
    async fn update_technician(&self, id: Uuid, patch: TechnicianPatch)
        -> StoreResult<Technician>;
    /// Tickets assigned to the technician become unassigned
    async fn delete_technician(&self, id: Uuid) -> StoreResult<()>;

    // Tickets
    /// Newest first, with `assigned_name` resolved from the technician record
    async fn list_tickets(&self, filter: &TicketFilter) -> StoreResult<Vec<Ticket>>;
    async fn get_ticket(&self, id: Uuid) -> StoreResult<Ticket>;
    /// Draws the next ticket number and inserts the ticket with its
    /// attachments in one transaction
    async fn create_ticket(
        &self,
        ticket: NewTicket,
        attachments: Vec<NewAttachment>,
    ) -> StoreResult<(Ticket, Vec<Attachment>)>;
    async fn update_ticket(&self, id: Uuid, patch: &TicketPatch) -> StoreResult<Ticket>;
    /// Removes the ticket with its comments and attachments. Returns the
    /// removed attachments so their files can be cleaned up.
    async fn delete_ticket(&self, id: Uuid) -> StoreResult<Vec<Attachment>>;
    async fn attachments_for(&self, ticket_ids: &[Uuid]) -> StoreResult<Vec<Attachment>>;
    /// Newest first
    async fn comments_for(&self, ticket_id: Uuid) -> StoreResult<Vec<Comment>>;
    /// Fails with `NotFound` when the ticket does not exist
    async fn add_comment(&self, comment: NewComment) -> StoreResult<Comment>;

    // Settings
    async fn settings(&self) -> StoreResult<BTreeMap<String, String>>;
    /// Upserts each entry; keys not present are left alone
    async fn put_settings(&self, updates: BTreeMap<String, String>) -> StoreResult<()>;

    // Reports
    async fn report_summary(&self, now: OffsetDateTime) -> StoreResult<ReportSummary>;
}
