//! Process-local store for development and tests

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{HelpdeskStore, REPORT_DAYS, REPORT_RECENT_LIMIT};
use crate::error::{StoreError, StoreResult};
use crate::types::{
    day_key, fill_daily_series, AssigneeChange, Attachment, Comment, NewAttachment, NewComment,
    NewTechnician, NewTicket, NewUser, RecentTicket, ReportSummary, Technician, TechnicianLoad,
    TechnicianPatch, Ticket, TicketFilter, TicketKpis, TicketPatch, TicketStatus, User,
    UserPatch,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    technicians: HashMap<Uuid, Technician>,
    tickets: HashMap<Uuid, Ticket>,
    comments: Vec<Comment>,
    attachments: Vec<Attachment>,
    settings: BTreeMap<String, String>,
    ticket_counter: i64,
}

impl Tables {
    /// One technician record per user account
    fn check_user_unlinked(&self, user_id: Option<Uuid>, except: Option<Uuid>) -> StoreResult<()> {
        let Some(user_id) = user_id else {
            return Ok(());
        };
        let taken = self
            .technicians
            .values()
            .any(|t| t.user_id == Some(user_id) && Some(t.id) != except);
        if taken {
            return Err(StoreError::Conflict(format!(
                "user {user_id} already has a technician record"
            )));
        }
        Ok(())
    }

    fn resolve_assignee(&self, mut ticket: Ticket) -> Ticket {
        if let Some(tech) = ticket.assigned_to.and_then(|id| self.technicians.get(&id)) {
            ticket.assigned_name = Some(tech.display_name.clone());
        }
        ticket
    }
}

/// In-memory [`HelpdeskStore`]. All tables sit behind one lock so each
/// method is atomic, matching the transactional backend.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HelpdeskStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn count_users(&self) -> StoreResult<i64> {
        Ok(self.tables.read().await.users.len() as i64)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<User> {
        self.tables
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user"))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!(
                "email {} already registered",
                user.email
            )));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("user"))?;
        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&id).is_none() {
            return Err(StoreError::not_found("user"));
        }
        for tech in tables.technicians.values_mut() {
            if tech.user_id == Some(id) {
                tech.user_id = None;
            }
        }
        for ticket in tables.tickets.values_mut() {
            if ticket.requester_id == Some(id) {
                ticket.requester_id = None;
            }
        }
        for comment in tables.comments.iter_mut() {
            if comment.user_id == Some(id) {
                comment.user_id = None;
            }
        }
        Ok(())
    }

    async fn list_technicians(&self) -> StoreResult<Vec<Technician>> {
        let tables = self.tables.read().await;
        let mut techs: Vec<Technician> = tables.technicians.values().cloned().collect();
        techs.sort_by(|a, b| {
            b.active
                .cmp(&a.active)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        Ok(techs)
    }

    async fn get_technician(&self, id: Uuid) -> StoreResult<Technician> {
        self.tables
            .read()
            .await
            .technicians
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("technician"))
    }

    async fn technician_for_user(&self, user_id: Uuid) -> StoreResult<Option<Technician>> {
        let tables = self.tables.read().await;
        Ok(tables
            .technicians
            .values()
            .find(|t| t.user_id == Some(user_id))
            .cloned())
    }

    async fn create_technician(&self, tech: NewTechnician) -> StoreResult<Technician> {
        let mut tables = self.tables.write().await;
        tables.check_user_unlinked(tech.user_id, None)?;
        let tech = Technician {
            id: Uuid::new_v4(),
            display_name: tech.display_name,
            email: tech.email,
            user_id: tech.user_id,
            active: tech.active,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.technicians.insert(tech.id, tech.clone());
        Ok(tech)
    }

    async fn update_technician(
        &self,
        id: Uuid,
        patch: TechnicianPatch,
    ) -> StoreResult<Technician> {
        let mut tables = self.tables.write().await;
        if !tables.technicians.contains_key(&id) {
            return Err(StoreError::not_found("technician"));
        }
        tables.check_user_unlinked(patch.user_id, Some(id))?;
        let tech = tables
            .technicians
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("technician"))?;
        if let Some(display_name) = patch.display_name {
            tech.display_name = display_name;
        }
        if let Some(email) = patch.email {
            tech.email = Some(email);
        }
        if let Some(user_id) = patch.user_id {
            tech.user_id = Some(user_id);
        }
        if let Some(active) = patch.active {
            tech.active = active;
        }
        Ok(tech.clone())
    }

    async fn delete_technician(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.technicians.remove(&id).is_none() {
            return Err(StoreError::not_found("technician"));
        }
        for ticket in tables.tickets.values_mut() {
            if ticket.assigned_to == Some(id) {
                ticket.assigned_to = None;
                ticket.assigned_name = None;
            }
        }
        Ok(())
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> StoreResult<Vec<Ticket>> {
        let tables = self.tables.read().await;
        let mut tickets: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .map(|t| tables.resolve_assignee(t))
            .collect();
        tickets.sort_by(|a, b| b.ticket_number.cmp(&a.ticket_number));
        Ok(tickets)
    }

    async fn get_ticket(&self, id: Uuid) -> StoreResult<Ticket> {
        let tables = self.tables.read().await;
        let ticket = tables
            .tickets
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("ticket"))?;
        Ok(tables.resolve_assignee(ticket))
    }

    async fn create_ticket(
        &self,
        ticket: NewTicket,
        attachments: Vec<NewAttachment>,
    ) -> StoreResult<(Ticket, Vec<Attachment>)> {
        let mut tables = self.tables.write().await;
        tables.ticket_counter += 1;
        let now = OffsetDateTime::now_utc();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            ticket_number: tables.ticket_counter,
            title: ticket.title,
            description: ticket.description,
            requester_name: ticket.requester_name,
            requester_email: ticket.requester_email,
            requester_id: ticket.requester_id,
            ticket_token: ticket.ticket_token,
            status: TicketStatus::New,
            urgency: ticket.urgency,
            category: ticket.category,
            sla_hours: ticket.sla_hours,
            assigned_to: None,
            assigned_name: None,
            created_at: now,
            updated_at: now,
        };
        let attachments: Vec<Attachment> = attachments
            .into_iter()
            .map(|a| Attachment {
                id: Uuid::new_v4(),
                ticket_id: ticket.id,
                filename: a.filename,
                url: a.url,
                created_at: now,
            })
            .collect();
        tables.tickets.insert(ticket.id, ticket.clone());
        tables.attachments.extend(attachments.iter().cloned());
        Ok((ticket, attachments))
    }

    async fn update_ticket(&self, id: Uuid, patch: &TicketPatch) -> StoreResult<Ticket> {
        let mut tables = self.tables.write().await;
        let ticket = tables
            .tickets
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("ticket"))?;
        if let Some(status) = patch.status {
            ticket.status = status;
        }
        if let Some(urgency) = patch.urgency {
            ticket.urgency = urgency;
        }
        match &patch.assignee {
            Some(AssigneeChange::Clear) => {
                ticket.assigned_to = None;
                ticket.assigned_name = None;
            }
            Some(AssigneeChange::Assign {
                technician_id,
                display_name,
            }) => {
                ticket.assigned_to = Some(*technician_id);
                ticket.assigned_name = Some(display_name.clone());
            }
            None => {}
        }
        ticket.updated_at = OffsetDateTime::now_utc();
        Ok(ticket.clone())
    }

    async fn delete_ticket(&self, id: Uuid) -> StoreResult<Vec<Attachment>> {
        let mut tables = self.tables.write().await;
        if tables.tickets.remove(&id).is_none() {
            return Err(StoreError::not_found("ticket"));
        }
        tables.comments.retain(|c| c.ticket_id != id);
        let (removed, kept): (Vec<Attachment>, Vec<Attachment>) = tables
            .attachments
            .drain(..)
            .partition(|a| a.ticket_id == id);
        tables.attachments = kept;
        Ok(removed)
    }

    async fn attachments_for(&self, ticket_ids: &[Uuid]) -> StoreResult<Vec<Attachment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .attachments
            .iter()
            .filter(|a| ticket_ids.contains(&a.ticket_id))
            .cloned()
            .collect())
    }

    async fn comments_for(&self, ticket_id: Uuid) -> StoreResult<Vec<Comment>> {
        let tables = self.tables.read().await;
        // Appended in creation order, so reversing gives newest first
        Ok(tables
            .comments
            .iter()
            .rev()
            .filter(|c| c.ticket_id == ticket_id)
            .cloned()
            .collect())
    }

    async fn add_comment(&self, comment: NewComment) -> StoreResult<Comment> {
        let mut tables = self.tables.write().await;
        if !tables.tickets.contains_key(&comment.ticket_id) {
            return Err(StoreError::not_found("ticket"));
        }
        let comment = Comment {
            id: Uuid::new_v4(),
            ticket_id: comment.ticket_id,
            user_id: comment.user_id,
            user_name: comment.user_name,
            text: comment.text,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.comments.push(comment.clone());
        Ok(comment)
    }

    async fn settings(&self) -> StoreResult<BTreeMap<String, String>> {
        Ok(self.tables.read().await.settings.clone())
    }

    async fn put_settings(&self, updates: BTreeMap<String, String>) -> StoreResult<()> {
        self.tables.write().await.settings.extend(updates);
        Ok(())
    }

    async fn report_summary(&self, now: OffsetDateTime) -> StoreResult<ReportSummary> {
        let tables = self.tables.read().await;

        let kpis = TicketKpis {
            total: tables.tickets.len() as i64,
            open: tables.tickets.values().filter(|t| t.status.is_open()).count() as i64,
            closed: tables
                .tickets
                .values()
                .filter(|t| t.status == TicketStatus::Closed)
                .count() as i64,
            techs: tables.technicians.len() as i64,
        };

        let mut per_day: HashMap<String, i64> = HashMap::new();
        for ticket in tables.tickets.values() {
            let day = day_key(ticket.created_at.to_offset(UtcOffset::UTC).date());
            *per_day.entry(day).or_default() += 1;
        }
        let today = now.to_offset(UtcOffset::UTC).date();
        let daily_created = fill_daily_series(today, REPORT_DAYS, &per_day);

        let mut newest: Vec<&Ticket> = tables.tickets.values().collect();
        newest.sort_by(|a, b| b.ticket_number.cmp(&a.ticket_number));
        let recent = newest
            .into_iter()
            .take(REPORT_RECENT_LIMIT)
            .map(|t| RecentTicket {
                id: t.id,
                ticket_number: t.ticket_number,
                title: t.title.clone(),
                status: t.status,
                tech: tables.resolve_assignee(t.clone()).assigned_name,
                date: t.created_at,
            })
            .collect();

        let mut technicians: Vec<TechnicianLoad> = tables
            .technicians
            .values()
            .map(|tech| TechnicianLoad {
                technician_id: tech.id,
                name: tech.display_name.clone(),
                count: tables
                    .tickets
                    .values()
                    .filter(|t| t.assigned_to == Some(tech.id))
                    .count() as i64,
            })
            .collect();
        technicians.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

        Ok(ReportSummary {
            kpis,
            daily_created,
            recent,
            technicians,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RequesterScope, TicketUrgency, UserRole};

    fn new_ticket(title: &str, email: Option<&str>) -> NewTicket {
        NewTicket {
            title: title.to_string(),
            description: "printer on fire".to_string(),
            requester_name: "Ana".to_string(),
            requester_email: email.map(str::to_string),
            requester_id: None,
            ticket_token: "0".repeat(32),
            urgency: TicketUrgency::High,
            category: None,
            sla_hours: None,
        }
    }

    fn new_tech(name: &str, active: bool) -> NewTechnician {
        NewTechnician {
            display_name: name.to_string(),
            email: None,
            user_id: None,
            active,
        }
    }

    #[tokio::test]
    async fn test_ticket_numbers_increase_and_are_not_reused() {
        let store = MemoryStore::new();
        let (first, _) = store.create_ticket(new_ticket("a", None), vec![]).await.unwrap();
        let (second, _) = store.create_ticket(new_ticket("b", None), vec![]).await.unwrap();
        assert!(second.ticket_number > first.ticket_number);

        store.delete_ticket(second.id).await.unwrap();
        let (third, _) = store.create_ticket(new_ticket("c", None), vec![]).await.unwrap();
        assert!(third.ticket_number > second.ticket_number);
    }

    #[tokio::test]
    async fn test_delete_ticket_cascades() {
        let store = MemoryStore::new();
        let attachment = NewAttachment {
            filename: "log.txt".to_string(),
            url: "/uploads/abc-log.txt".to_string(),
        };
        let (ticket, stored) = store
            .create_ticket(new_ticket("a", None), vec![attachment])
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        store
            .add_comment(NewComment {
                ticket_id: ticket.id,
                user_id: None,
                user_name: "Ana".to_string(),
                text: "any news?".to_string(),
            })
            .await
            .unwrap();

        let removed = store.delete_ticket(ticket.id).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert!(store.comments_for(ticket.id).await.unwrap().is_empty());
        assert!(store.attachments_for(&[ticket.id]).await.unwrap().is_empty());
        assert!(matches!(
            store.get_ticket(ticket.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_comment_on_missing_ticket_is_not_found() {
        let store = MemoryStore::new();
        let result = store
            .add_comment(NewComment {
                ticket_id: Uuid::new_v4(),
                user_id: None,
                user_name: "Ana".to_string(),
                text: "hello".to_string(),
            })
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        let user = NewUser {
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            password_hash: "x".to_string(),
            role: UserRole::Operator,
        };
        store.create_user(user.clone()).await.unwrap();
        assert!(matches!(
            store.create_user(user).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_requester_scope_filters_by_email() {
        let store = MemoryStore::new();
        store
            .create_ticket(new_ticket("mine", Some("ana@example.com")), vec![])
            .await
            .unwrap();
        store
            .create_ticket(new_ticket("theirs", Some("bo@example.com")), vec![])
            .await
            .unwrap();

        let filter = TicketFilter {
            requester: RequesterScope::Matching {
                user_id: None,
                email: Some("ana@example.com".to_string()),
            },
            ..Default::default()
        };
        let tickets = store.list_tickets(&filter).await.unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].title, "mine");
    }

    #[tokio::test]
    async fn test_technicians_listed_active_first() {
        let store = MemoryStore::new();
        store.create_technician(new_tech("Alice", false)).await.unwrap();
        store.create_technician(new_tech("Bruno", true)).await.unwrap();

        let names: Vec<String> = store
            .list_technicians()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.display_name)
            .collect();
        assert_eq!(names, vec!["Bruno", "Alice"]);
    }

    #[tokio::test]
    async fn test_user_links_to_one_technician() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let linked = NewTechnician {
            user_id: Some(user_id),
            ..new_tech("Bruno", false)
        };
        let first = store.create_technician(linked.clone()).await.unwrap();

        let second = store.create_technician(NewTechnician {
            active: true,
            ..linked
        });
        assert!(matches!(second.await, Err(StoreError::Conflict(_))));

        let other = store.create_technician(new_tech("Dana", true)).await.unwrap();
        let relink = TechnicianPatch {
            user_id: Some(user_id),
            ..Default::default()
        };
        assert!(matches!(
            store.update_technician(other.id, relink.clone()).await,
            Err(StoreError::Conflict(_))
        ));
        // Re-saving the same link on its own record is fine
        store.update_technician(first.id, relink).await.unwrap();

        for _ in 0..20 {
            let own = store.technician_for_user(user_id).await.unwrap().unwrap();
            assert_eq!(own.id, first.id);
        }
    }

    #[tokio::test]
    async fn test_deleting_technician_unassigns_tickets() {
        let store = MemoryStore::new();
        let tech = store.create_technician(new_tech("Bruno", true)).await.unwrap();
        let (ticket, _) = store.create_ticket(new_ticket("a", None), vec![]).await.unwrap();
        let patch = TicketPatch {
            assignee: Some(AssigneeChange::Assign {
                technician_id: tech.id,
                display_name: tech.display_name.clone(),
            }),
            ..Default::default()
        };
        store.update_ticket(ticket.id, &patch).await.unwrap();

        store.delete_technician(tech.id).await.unwrap();
        let ticket = store.get_ticket(ticket.id).await.unwrap();
        assert_eq!(ticket.assigned_to, None);
        assert_eq!(ticket.assigned_name, None);
    }

    #[tokio::test]
    async fn test_report_summary_counts() {
        let store = MemoryStore::new();
        let tech = store.create_technician(new_tech("Bruno", true)).await.unwrap();
        let (a, _) = store.create_ticket(new_ticket("a", None), vec![]).await.unwrap();
        let (b, _) = store.create_ticket(new_ticket("b", None), vec![]).await.unwrap();
        store
            .update_ticket(
                a.id,
                &TicketPatch {
                    status: Some(TicketStatus::Closed),
                    assignee: Some(AssigneeChange::Assign {
                        technician_id: tech.id,
                        display_name: tech.display_name.clone(),
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let report = store.report_summary(OffsetDateTime::now_utc()).await.unwrap();
        assert_eq!(report.kpis.total, 2);
        assert_eq!(report.kpis.open, 1);
        assert_eq!(report.kpis.closed, 1);
        assert_eq!(report.kpis.techs, 1);
        assert_eq!(report.daily_created.len(), REPORT_DAYS as usize);
        assert_eq!(report.daily_created.last().map(|d| d.count), Some(2));
        assert_eq!(report.recent[0].id, b.id);
        assert_eq!(report.technicians[0].count, 1);
    }
}
