//! Ticket routes
//!
//! Every successful mutation reports exactly one change to the emitter,
//! after the store call has returned.

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    Extension, Json,
};
use helpdesk_shared::{
    AssigneeChange, Attachment, Comment, NewComment, NewTicket, RequesterScope, Technician,
    Ticket, TicketFilter, TicketPatch, TicketStatus, TicketUrgency, UserRole,
};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::{check_length, MAX_FIELD_LENGTH};
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
    uploads::{self, UploadedFile},
};

const MAX_TITLE_LENGTH: usize = 500;
const MAX_TEXT_LENGTH: usize = 50_000;

// =============================================================================
// Request / Response types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CreateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub requester_name: Option<String>,
    pub requester_email: Option<String>,
    pub urgency: Option<String>,
    pub category: Option<String>,
    pub sla_hours: Option<i32>,
}

/// A ticket submission, from either a JSON body or a multipart form whose
/// `attachments` parts are files
#[derive(Debug, Default)]
pub struct TicketSubmission {
    pub fields: CreateTicketRequest,
    pub files: Vec<UploadedFile>,
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

#[async_trait]
impl<S> FromRequest<S> for TicketSubmission
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));

        if !is_multipart {
            let Json(fields) = Json::<CreateTicketRequest>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            return Ok(Self {
                fields,
                files: Vec::new(),
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let mut submission = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "attachments" || name == "attachments[]" {
                let original_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "attachment".to_string());
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if !bytes.is_empty() {
                    submission.files.push(UploadedFile {
                        original_name,
                        bytes,
                    });
                }
                continue;
            }

            let value = field.text().await.map_err(multipart_error)?;
            let fields = &mut submission.fields;
            match name.as_str() {
                "title" => fields.title = Some(value),
                "description" => fields.description = Some(value),
                "requester_name" => fields.requester_name = Some(value),
                "requester_email" => fields.requester_email = Some(value),
                "urgency" => fields.urgency = Some(value),
                "category" => fields.category = Some(value),
                "sla_hours" if !value.trim().is_empty() => {
                    fields.sla_hours = Some(value.trim().parse().map_err(|_| {
                        ApiError::Validation("sla_hours must be a whole number".into())
                    })?);
                }
                _ => {}
            }
        }

        Ok(submission)
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedAttachment {
    pub filename: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct CreateTicketResponse {
    pub ok: bool,
    pub id: Uuid,
    pub ticket_number: i64,
    /// Access token for the submitter; only ever returned here
    pub token: String,
    pub attachments: Vec<CreatedAttachment>,
}

#[derive(Debug, Deserialize)]
pub struct ListTicketsQuery {
    pub status: Option<String>,
    pub urgency: Option<String>,
    pub requester_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TicketWithAttachments {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub attachments: Vec<Attachment>,
    pub comments: Vec<Comment>,
}

/// Distinguishes a missing field from an explicit `null`
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTicketRequest {
    pub status: Option<String>,
    pub urgency: Option<String>,
    /// Absent: unchanged. `null` or `""`: clear. Otherwise a technician id.
    #[serde(default, deserialize_with = "present")]
    pub assigned_to: Option<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct UpdateTicketResponse {
    pub ok: bool,
    pub ticket: Ticket,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub text: Option<String>,
}

// =============================================================================
// Validation helpers
// =============================================================================

fn required(value: Option<String>, field: &'static str) -> ApiResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingField(field))
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_status(value: &str) -> ApiResult<TicketStatus> {
    value
        .parse()
        .map_err(|_| ApiError::Validation(format!("Invalid status: {value}")))
}

fn parse_urgency(value: &str) -> ApiResult<TicketUrgency> {
    value
        .parse()
        .map_err(|_| ApiError::Validation(format!("Invalid urgency: {value}")))
}

/// Who may point a ticket at `target`.
///
/// Technicians may only assign their own technician record; admins and
/// superadmins may assign anyone (whether the target is usable is checked
/// separately). Every other role is refused.
pub fn authorize_assignment(
    role: UserRole,
    own_record: Option<&Technician>,
    target: Uuid,
) -> ApiResult<()> {
    match role {
        UserRole::Admin | UserRole::Superadmin => Ok(()),
        UserRole::Technician => match own_record {
            Some(own) if own.id == target => Ok(()),
            _ => Err(ApiError::Forbidden),
        },
        UserRole::Operator => Err(ApiError::Forbidden),
    }
}

/// Turn the raw `assigned_to` value into a store-level change, enforcing
/// the self-assignment rule
async fn resolve_assignee(
    state: &AppState,
    auth_user: &AuthUser,
    raw: Option<String>,
) -> ApiResult<AssigneeChange> {
    let Some(raw) = optional(raw) else {
        return Ok(AssigneeChange::Clear);
    };
    let target: Uuid = raw
        .parse()
        .map_err(|_| ApiError::Validation("assigned_to must be a technician id".into()))?;

    if auth_user.role == UserRole::Technician {
        let own = state.store.technician_for_user(auth_user.user_id).await?;
        if let Err(err) = authorize_assignment(auth_user.role, own.as_ref(), target) {
            tracing::warn!(
                user_id = %auth_user.user_id,
                target = %target,
                "Technician tried to assign a ticket to someone else"
            );
            return Err(err);
        }
        // Matched above, so `own` is the target
        let own = own.ok_or(ApiError::Forbidden)?;
        return Ok(AssigneeChange::Assign {
            technician_id: own.id,
            display_name: own.display_name,
        });
    }

    authorize_assignment(auth_user.role, None, target)?;
    let tech = match state.store.get_technician(target).await {
        Ok(tech) => tech,
        Err(helpdesk_shared::StoreError::NotFound(_)) => {
            return Err(ApiError::Validation("Unknown technician".into()))
        }
        Err(err) => return Err(err.into()),
    };
    if !tech.active {
        return Err(ApiError::Validation("Technician is inactive".into()));
    }
    Ok(AssigneeChange::Assign {
        technician_id: tech.id,
        display_name: tech.display_name,
    })
}

async fn with_attachments(
    state: &AppState,
    tickets: Vec<Ticket>,
) -> ApiResult<Vec<TicketWithAttachments>> {
    let ids: Vec<Uuid> = tickets.iter().map(|t| t.id).collect();
    let mut attachments = state.store.attachments_for(&ids).await?;

    Ok(tickets
        .into_iter()
        .map(|ticket| {
            let (mine, rest): (Vec<Attachment>, Vec<Attachment>) = std::mem::take(&mut attachments)
                .into_iter()
                .partition(|a| a.ticket_id == ticket.id);
            attachments = rest;
            TicketWithAttachments {
                ticket,
                attachments: mine,
            }
        })
        .collect())
}

// =============================================================================
// Handlers
// =============================================================================

/// List tickets visible to the caller
pub async fn list_tickets(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
    Query(query): Query<ListTicketsQuery>,
) -> ApiResult<Json<Vec<TicketWithAttachments>>> {
    let status = optional(query.status)
        .map(|s| parse_status(&s))
        .transpose()?;
    let urgency = optional(query.urgency)
        .map(|u| parse_urgency(&u))
        .transpose()?;

    let requester = match auth_user.map(|Extension(user)| user) {
        Some(user) if user.role.is_staff() => RequesterScope::Any,
        Some(user) => RequesterScope::Matching {
            user_id: Some(user.user_id),
            email: Some(user.email),
        },
        None => match optional(query.requester_email) {
            Some(email) => RequesterScope::Matching {
                user_id: None,
                email: Some(email.to_lowercase()),
            },
            None => return Ok(Json(Vec::new())),
        },
    };

    let filter = TicketFilter {
        status,
        urgency,
        requester,
    };
    let tickets = state.store.list_tickets(&filter).await?;
    Ok(Json(with_attachments(&state, tickets).await?))
}

/// Submit a new ticket
pub async fn create_ticket(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
    submission: TicketSubmission,
) -> ApiResult<(StatusCode, Json<CreateTicketResponse>)> {
    let auth_user = auth_user.map(|Extension(user)| user);
    let TicketSubmission { fields, files } = submission;

    let title = required(fields.title, "title")?;
    let description = required(fields.description, "description")?;
    let requester_name = required(fields.requester_name, "requester_name")?;
    check_length(&title, "title", MAX_TITLE_LENGTH)?;
    check_length(&description, "description", MAX_TEXT_LENGTH)?;
    check_length(&requester_name, "requester_name", MAX_FIELD_LENGTH)?;
    let category = optional(fields.category);
    if let Some(category) = &category {
        check_length(category, "category", MAX_FIELD_LENGTH)?;
    }

    let urgency = optional(fields.urgency)
        .map(|u| parse_urgency(&u))
        .transpose()?
        .unwrap_or_default();
    if fields.sla_hours.is_some_and(|h| h < 0) {
        return Err(ApiError::Validation("sla_hours cannot be negative".into()));
    }

    let requester_email = optional(fields.requester_email)
        .map(|e| e.to_lowercase())
        .or_else(|| auth_user.as_ref().map(|u| u.email.clone()));
    if let Some(email) = &requester_email {
        check_length(email, "requester_email", MAX_FIELD_LENGTH)?;
    }

    let token = hex::encode(rand::random::<[u8; 16]>());
    let new_ticket = NewTicket {
        title,
        description,
        requester_name,
        requester_email,
        requester_id: auth_user.as_ref().map(|u| u.user_id),
        ticket_token: token.clone(),
        urgency,
        category,
        sla_hours: fields.sla_hours,
    };

    let new_attachments = uploads::save_uploads(&state.config.upload_dir, &files)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to store ticket attachments");
            ApiError::Internal
        })?;

    let (ticket, attachments) = match state
        .store
        .create_ticket(new_ticket, new_attachments.clone())
        .await
    {
        Ok(created) => created,
        Err(err) => {
            uploads::remove_files(
                &state.config.upload_dir,
                new_attachments.iter().map(|a| a.url.as_str()),
            )
            .await;
            return Err(err.into());
        }
    };

    state.emitter.ticket_created(&ticket);

    tracing::info!(
        ticket_id = %ticket.id,
        ticket_number = ticket.ticket_number,
        attachments = attachments.len(),
        requester_id = ?ticket.requester_id,
        "Ticket created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateTicketResponse {
            ok: true,
            id: ticket.id,
            ticket_number: ticket.ticket_number,
            token,
            attachments: attachments
                .into_iter()
                .map(|a| CreatedAttachment {
                    filename: a.filename,
                    url: a.url,
                })
                .collect(),
        }),
    ))
}

/// Ticket with attachments and comments (newest first)
pub async fn get_ticket(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<TicketDetail>> {
    let ticket = state.store.get_ticket(ticket_id).await?;
    let attachments = state.store.attachments_for(&[ticket_id]).await?;
    let comments = state.store.comments_for(ticket_id).await?;

    Ok(Json(TicketDetail {
        ticket,
        attachments,
        comments,
    }))
}

/// Change status, urgency or assignee
pub async fn update_ticket(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(ticket_id): Path<Uuid>,
    Json(req): Json<UpdateTicketRequest>,
) -> ApiResult<Json<UpdateTicketResponse>> {
    auth_user.require_role(&[UserRole::Admin, UserRole::Superadmin, UserRole::Technician])?;

    let mut patch = TicketPatch {
        status: optional(req.status).map(|s| parse_status(&s)).transpose()?,
        urgency: optional(req.urgency).map(|u| parse_urgency(&u)).transpose()?,
        assignee: None,
    };
    if let Some(raw) = req.assigned_to {
        patch.assignee = Some(resolve_assignee(&state, &auth_user, raw).await?);
    }
    if patch.is_empty() {
        return Err(ApiError::Validation(
            "Provide at least one of status, urgency, assigned_to".into(),
        ));
    }

    let ticket = state.store.update_ticket(ticket_id, &patch).await?;
    state.emitter.ticket_updated(ticket.id, &patch);

    tracing::info!(
        ticket_id = %ticket_id,
        user_id = %auth_user.user_id,
        status = ?patch.status,
        urgency = ?patch.urgency,
        assigned_to = ?patch.assignee.as_ref().map(AssigneeChange::technician_id),
        "Ticket updated"
    );

    Ok(Json(UpdateTicketResponse { ok: true, ticket }))
}

/// Delete a ticket with its comments, attachments and files
pub async fn delete_ticket(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    auth_user.require_admin()?;

    let attachments = state.store.delete_ticket(ticket_id).await?;
    state.emitter.ticket_deleted(ticket_id);
    uploads::remove_attachments(&state.config.upload_dir, &attachments).await;

    tracing::info!(
        ticket_id = %ticket_id,
        user_id = %auth_user.user_id,
        attachments = attachments.len(),
        "Ticket deleted"
    );

    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Add a comment to a ticket
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(ticket_id): Path<Uuid>,
    Json(req): Json<AddCommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let text = required(req.text, "text")?;
    check_length(&text, "text", MAX_TEXT_LENGTH)?;

    let comment = state
        .store
        .add_comment(NewComment {
            ticket_id,
            user_id: Some(auth_user.user_id),
            user_name: auth_user.name.clone(),
            text,
        })
        .await?;
    state.emitter.comment_created(&comment);

    tracing::info!(
        ticket_id = %ticket_id,
        comment_id = %comment.id,
        user_id = %auth_user.user_id,
        "Comment added"
    );

    Ok((StatusCode::CREATED, Json(comment)))
}
