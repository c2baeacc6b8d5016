use crate::{error::HttpError, models::marketmodel::*};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Bid {0} not found")]
    BidNotFound(Uuid),

    #[error("Milestone {0} not found")]
    MilestoneNotFound(Uuid),

    #[error("Transaction {0} not found")]
    TransactionNotFound(Uuid),

    #[error("No transaction found for CHIP purchase {0}")]
    ChipTransactionNotFound(String),

    #[error("Job {0} is in status {1:?}")]
    InvalidJobStatus(Uuid, JobStatus),

    #[error("Invalid escrow state transition: {0}")]
    InvalidEscrowTransition(String),

    #[error("User {0} is not authorized to perform this action on job {1}")]
    UnauthorizedJobAccess(Uuid, Uuid),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::JobNotFound(_)
            | ServiceError::BidNotFound(_)
            | ServiceError::MilestoneNotFound(_)
            | ServiceError::TransactionNotFound(_)
            | ServiceError::ChipTransactionNotFound(_) => HttpError::not_found(error.to_string()),

            ServiceError::InvalidJobStatus(_, _)
            | ServiceError::InvalidEscrowTransition(_)
            | ServiceError::Validation(_) => HttpError::bad_request(error.to_string()),

            ServiceError::UnauthorizedJobAccess(_, _) => HttpError::unauthorized(error.to_string()),

            ServiceError::Gateway(_) => HttpError::bad_gateway(error.to_string()),

            _ => HttpError::server_error(error.to_string()),
        }
    }
}
