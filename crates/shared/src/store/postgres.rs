//! PostgreSQL store

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use super::{HelpdeskStore, REPORT_DAYS, REPORT_RECENT_LIMIT};
use crate::error::{StoreError, StoreResult};
use crate::types::{
    fill_daily_series, AssigneeChange, Attachment, Comment, NewAttachment, NewComment,
    NewTechnician, NewTicket, NewUser, RecentTicket, ReportSummary, RequesterScope, Technician,
    TechnicianLoad, TechnicianPatch, Ticket, TicketFilter, TicketKpis, TicketPatch, User,
    UserPatch,
};

/// Ticket columns with the assignee name taken from the live technician row
const TICKET_SELECT: &str = r#"
    SELECT t.id, t.ticket_number, t.title, t.description, t.requester_name,
           t.requester_email, t.requester_id, t.ticket_token, t.status, t.urgency,
           t.category, t.sla_hours, t.assigned_to,
           COALESCE(tech.display_name, t.assigned_name) AS assigned_name,
           t.created_at, t.updated_at
    FROM tickets t
    LEFT JOIN technicians tech ON tech.id = t.assigned_to
"#;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl HelpdeskStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn count_users(&self) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("user"))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                role = COALESCE($3, role)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.name)
        .bind(patch.role)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("user"))
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user"));
        }
        Ok(())
    }

    async fn list_technicians(&self) -> StoreResult<Vec<Technician>> {
        let techs = sqlx::query_as::<_, Technician>(
            "SELECT * FROM technicians ORDER BY active DESC, display_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(techs)
    }

    async fn get_technician(&self, id: Uuid) -> StoreResult<Technician> {
        sqlx::query_as::<_, Technician>("SELECT * FROM technicians WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("technician"))
    }

    async fn technician_for_user(&self, user_id: Uuid) -> StoreResult<Option<Technician>> {
        let tech = sqlx::query_as::<_, Technician>(
            "SELECT * FROM technicians WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tech)
    }

    async fn create_technician(&self, tech: NewTechnician) -> StoreResult<Technician> {
        let tech = sqlx::query_as::<_, Technician>(
            r#"
            INSERT INTO technicians (id, display_name, email, user_id, active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&tech.display_name)
        .bind(&tech.email)
        .bind(tech.user_id)
        .bind(tech.active)
        .fetch_one(&self.pool)
        .await?;
        Ok(tech)
    }

    async fn update_technician(
        &self,
        id: Uuid,
        patch: TechnicianPatch,
    ) -> StoreResult<Technician> {
        sqlx::query_as::<_, Technician>(
            r#"
            UPDATE technicians
            SET display_name = COALESCE($2, display_name),
                email = COALESCE($3, email),
                user_id = COALESCE($4, user_id),
                active = COALESCE($5, active)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.display_name)
        .bind(patch.email)
        .bind(patch.user_id)
        .bind(patch.active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("technician"))
    }

    async fn delete_technician(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE tickets SET assigned_to = NULL, assigned_name = NULL WHERE assigned_to = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM technicians WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("technician"));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> StoreResult<Vec<Ticket>> {
        let (any_requester, requester_id, requester_email) = match &filter.requester {
            RequesterScope::Any => (true, None, None),
            RequesterScope::Matching { user_id, email } => (false, *user_id, email.clone()),
        };

        let sql = format!(
            r#"{TICKET_SELECT}
            WHERE ($1::varchar IS NULL OR t.status = $1)
              AND ($2::varchar IS NULL OR t.urgency = $2)
              AND ($3 OR t.requester_id = $4 OR t.requester_email = $5)
            ORDER BY t.ticket_number DESC
            "#
        );
        let tickets = sqlx::query_as::<_, Ticket>(&sql)
            .bind(filter.status)
            .bind(filter.urgency)
            .bind(any_requester)
            .bind(requester_id)
            .bind(requester_email)
            .fetch_all(&self.pool)
            .await?;
        Ok(tickets)
    }

    async fn get_ticket(&self, id: Uuid) -> StoreResult<Ticket> {
        let sql = format!("{TICKET_SELECT} WHERE t.id = $1");
        sqlx::query_as::<_, Ticket>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("ticket"))
    }

    async fn create_ticket(
        &self,
        ticket: NewTicket,
        attachments: Vec<NewAttachment>,
    ) -> StoreResult<(Ticket, Vec<Attachment>)> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the counter serializes concurrent submissions
        let (ticket_number,): (i64,) = sqlx::query_as(
            "UPDATE counters SET value = value + 1 WHERE name = 'ticket_number' RETURNING value",
        )
        .fetch_one(&mut *tx)
        .await?;

        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            INSERT INTO tickets (id, ticket_number, title, description, requester_name,
                                 requester_email, requester_id, ticket_token, urgency,
                                 category, sla_hours)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(ticket_number)
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(&ticket.requester_name)
        .bind(&ticket.requester_email)
        .bind(ticket.requester_id)
        .bind(&ticket.ticket_token)
        .bind(ticket.urgency)
        .bind(&ticket.category)
        .bind(ticket.sla_hours)
        .fetch_one(&mut *tx)
        .await?;

        let mut stored = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let row = sqlx::query_as::<_, Attachment>(
                r#"
                INSERT INTO attachments (id, ticket_id, filename, url)
                VALUES ($1, $2, $3, $4)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(ticket.id)
            .bind(&attachment.filename)
            .bind(&attachment.url)
            .fetch_one(&mut *tx)
            .await?;
            stored.push(row);
        }

        tx.commit().await?;
        Ok((ticket, stored))
    }

    async fn update_ticket(&self, id: Uuid, patch: &TicketPatch) -> StoreResult<Ticket> {
        let (change_assignee, assigned_to, assigned_name) = match &patch.assignee {
            None => (false, None, None),
            Some(AssigneeChange::Clear) => (true, None, None),
            Some(AssigneeChange::Assign {
                technician_id,
                display_name,
            }) => (true, Some(*technician_id), Some(display_name.clone())),
        };

        sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET status = COALESCE($2, status),
                urgency = COALESCE($3, urgency),
                assigned_to = CASE WHEN $4 THEN $5 ELSE assigned_to END,
                assigned_name = CASE WHEN $4 THEN $6 ELSE assigned_name END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.status)
        .bind(patch.urgency)
        .bind(change_assignee)
        .bind(assigned_to)
        .bind(assigned_name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("ticket"))
    }

    async fn delete_ticket(&self, id: Uuid) -> StoreResult<Vec<Attachment>> {
        let mut tx = self.pool.begin().await?;

        let attachments =
            sqlx::query_as::<_, Attachment>("SELECT * FROM attachments WHERE ticket_id = $1")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        // Comments and attachments go with the ticket (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("ticket"));
        }

        tx.commit().await?;
        Ok(attachments)
    }

    async fn attachments_for(&self, ticket_ids: &[Uuid]) -> StoreResult<Vec<Attachment>> {
        if ticket_ids.is_empty() {
            return Ok(Vec::new());
        }
        let attachments = sqlx::query_as::<_, Attachment>(
            "SELECT * FROM attachments WHERE ticket_id = ANY($1) ORDER BY created_at",
        )
        .bind(ticket_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(attachments)
    }

    async fn comments_for(&self, ticket_id: Uuid) -> StoreResult<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT * FROM comments WHERE ticket_id = $1 ORDER BY created_at DESC",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn add_comment(&self, comment: NewComment) -> StoreResult<Comment> {
        let result = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (id, ticket_id, user_id, user_name, text)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(comment.ticket_id)
        .bind(comment.user_id)
        .bind(&comment.user_name)
        .bind(&comment.text)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(comment) => Ok(comment),
            // 23503 = foreign_key_violation: the ticket is gone
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23503") => {
                Err(StoreError::not_found("ticket"))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn settings(&self) -> StoreResult<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn put_settings(&self, updates: BTreeMap<String, String>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in updates {
            sqlx::query(
                r#"
                INSERT INTO settings (key, value) VALUES ($1, $2)
                ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn report_summary(&self, now: OffsetDateTime) -> StoreResult<ReportSummary> {
        let (total, open, closed, techs): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status IN ('new', 'in_progress')),
                   COUNT(*) FILTER (WHERE status = 'closed'),
                   (SELECT COUNT(*) FROM technicians)
            FROM tickets
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let today = now.to_offset(UtcOffset::UTC).date();
        let window_start = today
            .checked_sub(Duration::days(i64::from(REPORT_DAYS) - 1))
            .unwrap_or(today)
            .midnight()
            .assume_utc();
        let per_day: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT to_char((created_at AT TIME ZONE 'UTC')::date, 'YYYY-MM-DD') AS day,
                   COUNT(*)
            FROM tickets
            WHERE created_at >= $1
            GROUP BY day
            "#,
        )
        .bind(window_start)
        .fetch_all(&self.pool)
        .await?;
        let per_day: HashMap<String, i64> = per_day.into_iter().collect();
        let daily_created = fill_daily_series(today, REPORT_DAYS, &per_day);

        let recent = sqlx::query_as::<_, RecentTicket>(
            r#"
            SELECT t.id, t.ticket_number, t.title, t.status,
                   COALESCE(tech.display_name, t.assigned_name) AS tech,
                   t.created_at AS date
            FROM tickets t
            LEFT JOIN technicians tech ON tech.id = t.assigned_to
            ORDER BY t.ticket_number DESC
            LIMIT $1
            "#,
        )
        .bind(REPORT_RECENT_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;

        let technicians = sqlx::query_as::<_, TechnicianLoad>(
            r#"
            SELECT tech.id AS technician_id, tech.display_name AS name, COUNT(t.id) AS count
            FROM technicians tech
            LEFT JOIN tickets t ON t.assigned_to = tech.id
            GROUP BY tech.id, tech.display_name
            ORDER BY count DESC, name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ReportSummary {
            kpis: TicketKpis {
                total,
                open,
                closed,
                techs,
            },
            daily_created,
            recent,
            technicians,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations};
    use crate::types::TicketUrgency;

    async fn store() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url, 2).await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        PgStore::new(pool)
    }

    fn new_ticket() -> NewTicket {
        NewTicket {
            title: "VPN down".to_string(),
            description: "cannot connect since this morning".to_string(),
            requester_name: "Ana".to_string(),
            requester_email: Some("ana@example.com".to_string()),
            requester_id: None,
            ticket_token: "f".repeat(32),
            urgency: TicketUrgency::Critical,
            category: Some("network".to_string()),
            sla_hours: Some(4),
        }
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_create_and_delete_ticket() {
        let store = store().await;
        let attachment = NewAttachment {
            filename: "trace.log".to_string(),
            url: "/uploads/trace.log".to_string(),
        };
        let (ticket, attachments) = store
            .create_ticket(new_ticket(), vec![attachment])
            .await
            .expect("create");
        assert_eq!(attachments.len(), 1);

        let (next, _) = store.create_ticket(new_ticket(), vec![]).await.expect("create");
        assert!(next.ticket_number > ticket.ticket_number);

        let removed = store.delete_ticket(ticket.id).await.expect("delete");
        assert_eq!(removed.len(), 1);
        assert!(store
            .attachments_for(&[ticket.id])
            .await
            .expect("attachments")
            .is_empty());
        store.delete_ticket(next.id).await.expect("delete");
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_comment_on_missing_ticket_is_not_found() {
        let store = store().await;
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
}
