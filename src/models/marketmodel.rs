use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Bidding,
    InProgress,
    Complete,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "job_payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobPaymentStatus {
    Unpaid,
    Processing,
    Paid,
    Released,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "bid_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "milestone_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Released,
    Disbursed,
    Failed,
}

impl TransactionStatus {
    pub fn to_str(&self) -> &str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Released => "released",
            TransactionStatus::Disbursed => "disbursed",
            TransactionStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "submission_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    PendingReview,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub budget: BigDecimal,
    pub currency: String,
    pub status: Option<JobStatus>,                 // Database has DEFAULT 'open', can be NULL
    pub payment_status: Option<JobPaymentStatus>,  // Database has DEFAULT 'unpaid', can be NULL
    pub uses_milestones: Option<bool>,             // Database has DEFAULT FALSE, can be NULL
    pub created_at: Option<DateTime<Utc>>,         // Database has DEFAULT NOW(), can be NULL
    pub updated_at: Option<DateTime<Utc>>,         // Database has DEFAULT NOW(), can be NULL
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bid {
    pub id: Uuid,
    pub job_id: Uuid,
    pub bidder_id: Uuid,
    pub amount: BigDecimal,
    pub message: String,
    pub status: Option<BidStatus>,          // Database has DEFAULT 'pending', can be NULL
    pub created_at: Option<DateTime<Utc>>,  // Database has DEFAULT NOW(), can be NULL
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Milestone {
    pub id: Uuid,
    pub job_id: Uuid,
    pub title: String,
    pub amount: BigDecimal,
    pub order_index: i32,
    pub status: Option<MilestoneStatus>,    // Database has DEFAULT 'pending', can be NULL
    pub created_at: Option<DateTime<Utc>>,  // Database has DEFAULT NOW(), can be NULL
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub job_id: Uuid,
    pub bid_id: Uuid,
    pub milestone_id: Option<Uuid>, // NULL means the whole-job scope
    pub payer_id: Uuid,
    pub payee_id: Uuid,
    pub amount: BigDecimal,
    pub fee_amount: BigDecimal,
    pub currency: String,
    pub status: Option<TransactionStatus>,  // Database has DEFAULT 'pending', can be NULL
    pub reference: String,
    pub chip_transaction_id: Option<String>,
    pub chip_send_instruction_id: Option<String>,
    pub escrow_released_at: Option<DateTime<Utc>>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,  // Database has DEFAULT NOW(), can be NULL
    pub updated_at: Option<DateTime<Utc>>,  // Database has DEFAULT NOW(), can be NULL
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkSubmission {
    pub id: Uuid,
    pub job_id: Uuid,
    pub bid_id: Uuid,
    pub note: String,
    pub status: Option<SubmissionStatus>,   // Database has DEFAULT 'pending_review', can be NULL
    pub review_note: Option<String>,
    pub created_at: Option<DateTime<Utc>>,  // Database has DEFAULT NOW(), can be NULL
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Stable idempotency reference for an escrow charge. Retrying a charge for
/// the same job/milestone scope reuses the same reference so the gateway can
/// deduplicate.
pub fn escrow_reference(job_id: Uuid, milestone_id: Option<Uuid>) -> String {
    match milestone_id {
        Some(milestone_id) => format!("kpay-job-{}-ms-{}", job_id, milestone_id),
        None => format!("kpay-job-{}", job_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escrow_reference_is_stable() {
        let job_id = Uuid::new_v4();
        let milestone_id = Uuid::new_v4();

        assert_eq!(
            escrow_reference(job_id, None),
            escrow_reference(job_id, None)
        );
        assert_ne!(
            escrow_reference(job_id, None),
            escrow_reference(job_id, Some(milestone_id))
        );
        assert_eq!(escrow_reference(job_id, None), format!("kpay-job-{}", job_id));
        assert!(escrow_reference(job_id, Some(milestone_id)).contains("-ms-"));
    }

    #[test]
    fn test_status_strings_match_database_labels() {
        assert_eq!(TransactionStatus::Pending.to_str(), "pending");
        assert_eq!(TransactionStatus::Released.to_str(), "released");
        assert_eq!(TransactionStatus::Disbursed.to_str(), "disbursed");
    }
}
