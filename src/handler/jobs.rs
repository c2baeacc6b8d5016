use std::sync::Arc;

use axum::{
    extract::Path,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{marketdb::MarketExt, paymentdb::PaymentExt},
    dtos::marketdtos::{
        ApiResponse, CreateBidDto, CreateJobDto, CreateMilestoneDto, CreateSubmissionDto,
        JobDetailsDto, JobsResponse, TransactionsResponse,
    },
    error::{ErrorMessage, HttpError},
    middleware::main_middleware::JWTAuthMiddleware,
    models::marketmodel::JobStatus,
    service::{aggregation, escrow},
    AppState,
};

pub fn jobs_handler() -> Router {
    Router::new()
        // Job routes
        .route("/", post(create_job))
        .route("/", get(list_open_jobs))
        .route("/:job_id", get(get_job_details))
        // Bid routes
        .route("/:job_id/bids", post(place_bid))
        .route("/:job_id/bids", get(list_bids))
        // Milestone routes
        .route("/:job_id/milestones", post(create_milestone))
        .route("/:job_id/milestones", get(list_milestones))
        // Payment overview routes
        .route("/:job_id/payments", get(list_transactions))
        .route("/:job_id/payments/summary", get(get_payment_summary))
        // Work submission routes
        .route("/:job_id/submissions", post(submit_work))
        .route("/:job_id/submissions", get(list_submissions))
}

// Job Handlers
pub async fn create_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Json(body): Json<CreateJobDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let currency = body.currency.unwrap_or_else(|| "MYR".to_string());

    let job = app_state
        .db_client
        .create_job(
            auth.user.id,
            body.title,
            body.description,
            body.budget,
            currency,
            body.uses_milestones.unwrap_or(false),
        )
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success("Job created successfully", job)))
}

pub async fn list_open_jobs(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let jobs = app_state
        .db_client
        .get_open_jobs()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(JobsResponse {
        status: "success".to_string(),
        message: "Open jobs retrieved successfully".to_string(),
        data: jobs,
    }))
}

pub async fn get_job_details(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let job = app_state
        .db_client
        .get_job_by_id(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Job not found"))?;

    let bids = app_state
        .db_client
        .get_bids_for_job(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let milestones = app_state
        .db_client
        .get_milestones_for_job(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(
        "Job retrieved successfully",
        JobDetailsDto {
            job,
            bids,
            milestones,
        },
    )))
}

// Bid Handlers
pub async fn place_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<CreateBidDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let job = app_state
        .db_client
        .get_job_by_id(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Job not found"))?;

    if job.owner_id == auth.user.id {
        return Err(HttpError::bad_request("You cannot bid on your own job"));
    }

    let status = job.status.unwrap_or(JobStatus::Open);
    if !matches!(status, JobStatus::Open | JobStatus::Bidding) {
        return Err(HttpError::bad_request("Job is no longer accepting bids"));
    }

    let existing_bid = app_state
        .db_client
        .get_bid_by_job_and_bidder(job_id, auth.user.id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if existing_bid.is_some() {
        return Err(HttpError::bad_request(
            "You have already placed a bid on this job",
        ));
    }

    let bid = app_state
        .db_client
        .create_bid(job_id, auth.user.id, body.amount, body.message)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success("Bid placed successfully", bid)))
}

pub async fn list_bids(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let bids = app_state
        .db_client
        .get_bids_for_job(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(
        "Bids retrieved successfully",
        bids,
    )))
}

// Milestone Handlers
pub async fn create_milestone(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<CreateMilestoneDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let job = app_state
        .db_client
        .get_job_by_id(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Job not found"))?;

    if job.owner_id != auth.user.id {
        return Err(HttpError::unauthorized(
            ErrorMessage::PermissionDenied.to_string(),
        ));
    }

    if !job.uses_milestones.unwrap_or(false) {
        return Err(HttpError::bad_request(
            "Job does not use milestone payments",
        ));
    }

    if job.status.unwrap_or(JobStatus::Open) == JobStatus::Complete {
        return Err(HttpError::bad_request("Job is already complete"));
    }

    let milestone = app_state
        .db_client
        .create_milestone(job_id, body.title, body.amount, body.order_index)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(
        "Milestone created successfully",
        milestone,
    )))
}

pub async fn list_milestones(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let milestones = app_state
        .db_client
        .get_milestones_for_job(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(
        "Milestones retrieved successfully",
        milestones,
    )))
}

// Payment Overview Handlers
pub async fn get_payment_summary(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let job = app_state
        .db_client
        .get_job_by_id(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Job not found"))?;

    let milestones = app_state
        .db_client
        .get_milestones_for_job(job.id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let transactions = app_state
        .db_client
        .get_transactions_for_job(job.id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let summary = aggregation::summarize(&milestones, &transactions);

    Ok(Json(ApiResponse::success(
        "Payment summary retrieved successfully",
        summary,
    )))
}

pub async fn list_transactions(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let transactions = app_state
        .db_client
        .get_transactions_for_job(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(TransactionsResponse {
        status: "success".to_string(),
        message: "Transactions retrieved successfully".to_string(),
        data: transactions,
    }))
}

// Work Submission Handlers
pub async fn submit_work(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<CreateSubmissionDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let job = app_state
        .db_client
        .get_job_by_id(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Job not found"))?;

    let accepted_bid = app_state
        .db_client
        .get_accepted_bid(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::bad_request("Job has no accepted bid"))?;

    let open_submission = app_state
        .db_client
        .get_pending_submission(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    escrow::ensure_submission_allowed(&job, &accepted_bid, open_submission.as_ref(), auth.user.id)?;

    let submission = app_state
        .db_client
        .create_submission(job_id, accepted_bid.id, body.note)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(
        "Work submitted for review",
        submission,
    )))
}

pub async fn list_submissions(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let submissions = app_state
        .db_client
        .get_submissions_for_job(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(
        "Submissions retrieved successfully",
        submissions,
    )))
}
