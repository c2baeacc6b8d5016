use std::sync::Arc;

use axum::{extract::Path, response::IntoResponse, routing::put, Extension, Json, Router};
use uuid::Uuid;

use crate::{
    db::marketdb::MarketExt, dtos::marketdtos::ApiResponse, error::HttpError,
    middleware::main_middleware::JWTAuthMiddleware, service::escrow, AppState,
};

pub fn bids_handler() -> Router {
    Router::new().route("/:bid_id/accept", put(accept_bid))
}

/// Accepts a bid on behalf of the job owner. Every sibling bid is rejected in
/// the same database transaction, so the job never ends up with two workers.
pub async fn accept_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let bid = app_state
        .db_client
        .get_bid_by_id(bid_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Bid not found"))?;

    let job = app_state
        .db_client
        .get_job_by_id(bid.job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Job not found"))?;

    escrow::ensure_bid_acceptable(&job, &bid, auth.user.id)?;

    // The UPDATE re-checks both statuses, so a race with another accept
    // surfaces as RowNotFound rather than a double assignment.
    let accepted = app_state
        .db_client
        .accept_bid(job.id, bid_id)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => HttpError::bad_request("Bid can no longer be accepted"),
            _ => HttpError::server_error(e.to_string()),
        })?;

    Ok(Json(ApiResponse::success(
        "Bid accepted successfully",
        accepted,
    )))
}
