//! Server-Sent Events endpoint
//!
//! `GET /api/events` sits behind `require_auth`, so anonymous callers get a
//! 401 before anything is registered with the hub.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use futures::{Stream, StreamExt};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub async fn events_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // The session may outlive the account
    if let Err(err) = state.store.get_user(user.user_id).await {
        tracing::warn!(user_id = %user.user_id, error = %err, "Event stream refused: user not found");
        return Err(ApiError::Unauthorized);
    }

    let stream = state.hub.subscribe(user.user_id, user.role);
    tracing::info!(
        subscriber_id = %stream.id(),
        user_id = %user.user_id,
        role = %user.role,
        "Event stream opened"
    );

    let events = stream.map(|event| Ok(event.to_sse_event()));

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(state.config.events_keepalive)
            .text("keep-alive"),
    ))
}
