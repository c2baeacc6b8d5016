use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::marketmodel::*;

// Job DTOs
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateJobDto {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: String,

    #[validate(length(min = 20, max = 2000, message = "Description must be between 20 and 2000 characters"))]
    pub description: String,

    #[validate(range(min = 1.0, message = "Budget must be positive"))]
    pub budget: f64,

    #[validate(length(min = 3, max = 3, message = "Currency must be a 3-letter code"))]
    pub currency: Option<String>,

    pub uses_milestones: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobDetailsDto {
    pub job: Job,
    pub bids: Vec<Bid>,
    pub milestones: Vec<Milestone>,
}

// Bid DTOs
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateBidDto {
    #[validate(range(min = 1.0, message = "Bid amount must be positive"))]
    pub amount: f64,

    #[validate(length(min = 1, max = 1000, message = "Message must be between 1 and 1000 characters"))]
    pub message: String,
}

// Milestone DTOs
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateMilestoneDto {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: String,

    #[validate(range(min = 1.0, message = "Milestone amount must be positive"))]
    pub amount: f64,

    #[validate(range(min = 0, message = "Order index must not be negative"))]
    pub order_index: i32,
}

// Work submission DTOs
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateSubmissionDto {
    #[validate(length(min = 1, max = 2000, message = "Note must be between 1 and 2000 characters"))]
    pub note: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ReviewSubmissionDto {
    #[validate(length(min = 1, message = "Decision is required"))]
    pub decision: String, // "approve" or "reject"

    #[validate(length(max = 2000, message = "Review note must not exceed 2000 characters"))]
    pub review_note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmissionReviewedDto {
    pub submission: WorkSubmission,
    pub job_status: JobStatus,
}

// Response wrappers
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobsResponse {
    pub status: String,
    pub message: String,
    pub data: Vec<Job>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub status: String,
    pub message: String,
    pub data: Vec<Transaction>,
}
