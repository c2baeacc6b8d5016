use std::sync::Arc;

use axum::{extract::Path, response::IntoResponse, routing::put, Extension, Json, Router};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::marketdb::MarketExt,
    dtos::marketdtos::{ApiResponse, ReviewSubmissionDto, SubmissionReviewedDto},
    error::HttpError,
    middleware::main_middleware::JWTAuthMiddleware,
    models::marketmodel::{JobStatus, SubmissionStatus},
    service::escrow,
    AppState,
};

pub fn submissions_handler() -> Router {
    Router::new().route("/:submission_id/review", put(review_submission))
}

/// Owner decision on a pending work submission. Approving completes the job;
/// rejecting leaves it in progress so the worker can submit again.
pub async fn review_submission(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(submission_id): Path<Uuid>,
    Json(body): Json<ReviewSubmissionDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let decision = match body.decision.as_str() {
        "approve" => SubmissionStatus::Approved,
        "reject" => SubmissionStatus::Rejected,
        _ => {
            return Err(HttpError::bad_request(
                "Decision must be either 'approve' or 'reject'",
            ))
        }
    };

    let submission = app_state
        .db_client
        .get_submission_by_id(submission_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Submission not found"))?;

    let job = app_state
        .db_client
        .get_job_by_id(submission.job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Job not found"))?;

    escrow::ensure_review_allowed(&job, &submission, auth.user.id)?;

    let reviewed = app_state
        .db_client
        .review_submission(submission_id, job.id, decision, body.review_note)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                HttpError::bad_request("Submission has already been reviewed")
            }
            _ => HttpError::server_error(e.to_string()),
        })?;

    // Approving moves the job to complete, so report the job status as it
    // stands after the review.
    let job_after = app_state
        .db_client
        .get_job_by_id(job.id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Job not found"))?;

    Ok(Json(ApiResponse::success(
        "Submission reviewed successfully",
        SubmissionReviewedDto {
            submission: reviewed,
            job_status: job_after.status.unwrap_or(JobStatus::InProgress),
        },
    )))
}
