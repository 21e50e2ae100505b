//! Reporting routes

use axum::{
    extract::{Extension, State},
    Json,
};
use helpdesk_shared::ReportSummary;
use time::OffsetDateTime;

use crate::{auth::AuthUser, error::ApiResult, state::AppState};

/// KPIs, tickets per day, recent tickets and technician load
pub async fn get_reports(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<ReportSummary>> {
    auth_user.require_superadmin()?;

    let summary = state
        .store
        .report_summary(OffsetDateTime::now_utc())
        .await?;

    tracing::debug!(
        total = summary.kpis.total,
        open = summary.kpis.open,
        "Report generated"
    );

    Ok(Json(summary))
}
