//! Common types used across the helpdesk

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Role attached to a user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Operator,
    Technician,
    Admin,
    Superadmin,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Operator
    }
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Technician => "technician",
            Self::Admin => "admin",
            Self::Superadmin => "superadmin",
        }
    }

    /// Admins and superadmins manage users, technicians and settings
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin | Self::Superadmin)
    }

    /// Roles that see every ticket and may change status/urgency/assignee
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Technician | Self::Admin | Self::Superadmin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "operator" => Ok(Self::Operator),
            "technician" => Ok(Self::Technician),
            "admin" => Ok(Self::Admin),
            "superadmin" => Ok(Self::Superadmin),
            _ => Err(ParseEnumError::new("role", s)),
        }
    }
}

/// Ticket lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    InProgress,
    Resolved,
    Closed,
}

impl Default for TicketStatus {
    fn default() -> Self {
        Self::New
    }
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// New and in-progress tickets count as open in reports
    pub fn is_open(&self) -> bool {
        matches!(self, Self::New | Self::InProgress)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "new" => Ok(Self::New),
            "in_progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            _ => Err(ParseEnumError::new("status", s)),
        }
    }
}

/// How urgent the requester says the problem is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketUrgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for TicketUrgency {
    fn default() -> Self {
        Self::Medium
    }
}

impl TicketUrgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for TicketUrgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketUrgency {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(ParseEnumError::new("urgency", s)),
        }
    }
}

/// Error returned when a string does not name a known enum variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field}: {value}")]
pub struct ParseEnumError {
    pub field: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// A user account
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A staff identity that tickets can be assigned to
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Technician {
    pub id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
    pub user_id: Option<Uuid>,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A help-desk request
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: i64,
    pub title: String,
    pub description: String,
    pub requester_name: String,
    pub requester_email: Option<String>,
    pub requester_id: Option<Uuid>,
    /// Handed to the submitter once at creation
    #[serde(skip_serializing)]
    pub ticket_token: String,
    pub status: TicketStatus,
    pub urgency: TicketUrgency,
    pub category: Option<String>,
    pub sla_hours: Option<i32>,
    pub assigned_to: Option<Uuid>,
    pub assigned_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A comment left on a ticket. Comments are never edited.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_name: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A file uploaded with a ticket
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Attachment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub filename: String,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Store inputs
// =============================================================================

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone)]
pub struct NewTechnician {
    pub display_name: String,
    pub email: Option<String>,
    pub user_id: Option<Uuid>,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TechnicianPatch {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub user_id: Option<Uuid>,
    pub active: Option<bool>,
}

/// Everything needed to insert a ticket except its sequence number,
/// which the store draws inside the insert transaction.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub requester_name: String,
    pub requester_email: Option<String>,
    pub requester_id: Option<Uuid>,
    pub ticket_token: String,
    pub urgency: TicketUrgency,
    pub category: Option<String>,
    pub sla_hours: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub filename: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub ticket_id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_name: String,
    pub text: String,
}

/// Requested change to a ticket's assignee
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssigneeChange {
    Clear,
    Assign {
        technician_id: Uuid,
        display_name: String,
    },
}

impl AssigneeChange {
    pub fn technician_id(&self) -> Option<Uuid> {
        match self {
            Self::Clear => None,
            Self::Assign { technician_id, .. } => Some(*technician_id),
        }
    }
}

/// Partial ticket update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TicketPatch {
    pub status: Option<TicketStatus>,
    pub urgency: Option<TicketUrgency>,
    pub assignee: Option<AssigneeChange>,
}

impl TicketPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.urgency.is_none() && self.assignee.is_none()
    }
}

/// Which requesters' tickets a listing may include
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequesterScope {
    /// Staff view: every ticket
    Any,
    /// Tickets whose requester id or requester email matches
    Matching {
        user_id: Option<Uuid>,
        email: Option<String>,
    },
}

impl Default for RequesterScope {
    fn default() -> Self {
        Self::Any
    }
}

#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub urgency: Option<TicketUrgency>,
    pub requester: RequesterScope,
}

impl TicketFilter {
    /// In-process evaluation of the filter, mirrors the SQL `WHERE` clause
    pub fn matches(&self, ticket: &Ticket) -> bool {
        if self.status.is_some_and(|s| s != ticket.status) {
            return false;
        }
        if self.urgency.is_some_and(|u| u != ticket.urgency) {
            return false;
        }
        match &self.requester {
            RequesterScope::Any => true,
            RequesterScope::Matching { user_id, email } => {
                let by_id = user_id.is_some() && *user_id == ticket.requester_id;
                let by_email = email.is_some() && *email == ticket.requester_email;
                by_id || by_email
            }
        }
    }
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct TicketKpis {
    pub total: i64,
    pub open: i64,
    pub closed: i64,
    pub techs: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    /// Calendar day, `YYYY-MM-DD` (UTC)
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RecentTicket {
    pub id: Uuid,
    pub ticket_number: i64,
    pub title: String,
    pub status: TicketStatus,
    pub tech: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct TechnicianLoad {
    pub technician_id: Uuid,
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub kpis: TicketKpis,
    pub daily_created: Vec<DailyCount>,
    pub recent: Vec<RecentTicket>,
    pub technicians: Vec<TechnicianLoad>,
}

/// Format a date as the `YYYY-MM-DD` key used by [`DailyCount`]
pub fn day_key(date: time::Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Build a gap-free series of `days` entries ending at `today`, oldest first,
/// taking counts from `counts` keyed by [`day_key`].
pub fn fill_daily_series(
    today: time::Date,
    days: u32,
    counts: &std::collections::HashMap<String, i64>,
) -> Vec<DailyCount> {
    (0..days)
        .rev()
        .filter_map(|offset| today.checked_sub(time::Duration::days(i64::from(offset))))
        .map(|date| {
            let key = day_key(date);
            let count = counts.get(&key).copied().unwrap_or(0);
            DailyCount { date: key, count }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use time::macros::date;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            TicketStatus::New,
            TicketStatus::InProgress,
            TicketStatus::Resolved,
            TicketStatus::Closed,
        ] {
            assert_eq!(status.as_str().parse::<TicketStatus>().unwrap(), status);
        }
        assert!("done".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TicketStatus::InProgress).unwrap();
        assert_eq!(json, r#""in_progress""#);
    }

    #[test]
    fn test_role_parsing_is_case_insensitive() {
        assert_eq!("Admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!(
            " superadmin ".parse::<UserRole>().unwrap(),
            UserRole::Superadmin
        );
        let err = "owner".parse::<UserRole>().unwrap_err();
        assert_eq!(err.field, "role");
    }

    #[test]
    fn test_role_capabilities() {
        assert!(!UserRole::Operator.is_staff());
        assert!(UserRole::Technician.is_staff());
        assert!(!UserRole::Technician.is_admin());
        assert!(UserRole::Superadmin.is_admin());
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(TicketPatch::default().is_empty());
        let patch = TicketPatch {
            assignee: Some(AssigneeChange::Clear),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_fill_daily_series_fills_gaps() {
        let mut counts = HashMap::new();
        counts.insert("2024-03-01".to_string(), 4);
        counts.insert("2024-02-28".to_string(), 1);

        let series = fill_daily_series(date!(2024 - 03 - 01), 3, &counts);
        assert_eq!(
            series,
            vec![
                DailyCount { date: "2024-02-28".into(), count: 1 },
                DailyCount { date: "2024-02-29".into(), count: 0 },
                DailyCount { date: "2024-03-01".into(), count: 4 },
            ]
        );
    }
}
