// service/aggregation.rs
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::models::marketmodel::*;

/// Transaction statuses that count as money having left the payer, whether it
/// is still in escrow or already paid out.
const PAID_STATUSES: [TransactionStatus; 3] = [
    TransactionStatus::Completed,
    TransactionStatus::Released,
    TransactionStatus::Disbursed,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestonePaymentEntry {
    pub milestone_id: Uuid,
    pub title: String,
    pub amount: BigDecimal,
    pub status: Option<MilestoneStatus>,
    pub paid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestonePaymentSummary {
    pub total_budget: BigDecimal,
    pub total_paid: BigDecimal,
    pub percent_paid: f64,
    pub milestones: Vec<MilestonePaymentEntry>,
}

fn is_paid(status: Option<TransactionStatus>) -> bool {
    status.map_or(false, |status| PAID_STATUSES.contains(&status))
}

/// Read-only milestone payment rollup for a job. Only milestone-scoped
/// transactions feed the totals, and a milestone with no paid transaction
/// counts as unpaid. The percentage is reported against the milestone budget
/// and deliberately not clamped, so an overpaid job reads above 100.
pub fn summarize(
    milestones: &[Milestone],
    transactions: &[Transaction],
) -> MilestonePaymentSummary {
    let total_budget: BigDecimal = milestones
        .iter()
        .map(|milestone| milestone.amount.clone())
        .sum();

    let total_paid: BigDecimal = transactions
        .iter()
        .filter(|txn| txn.milestone_id.is_some() && is_paid(txn.status))
        .map(|txn| txn.amount.clone())
        .sum();

    let percent_paid = match total_budget.to_f64() {
        Some(budget) if budget > 0.0 => {
            total_paid.to_f64().unwrap_or(0.0) / budget * 100.0
        }
        _ => 0.0,
    };

    let entries = milestones
        .iter()
        .map(|milestone| {
            let paid = transactions
                .iter()
                .any(|txn| txn.milestone_id == Some(milestone.id) && is_paid(txn.status));
            MilestonePaymentEntry {
                milestone_id: milestone.id,
                title: milestone.title.clone(),
                amount: milestone.amount.clone(),
                status: milestone.status,
                paid,
            }
        })
        .collect();

    MilestonePaymentSummary {
        total_budget,
        total_paid,
        percent_paid,
        milestones: entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milestone(job_id: Uuid, amount: i64, order_index: i32) -> Milestone {
        Milestone {
            id: Uuid::new_v4(),
            job_id,
            title: format!("Milestone {}", order_index + 1),
            amount: BigDecimal::from(amount),
            order_index,
            status: Some(MilestoneStatus::Pending),
            created_at: None,
        }
    }

    fn transaction(
        job_id: Uuid,
        milestone_id: Option<Uuid>,
        amount: i64,
        status: TransactionStatus,
    ) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            job_id,
            bid_id: Uuid::new_v4(),
            milestone_id,
            payer_id: Uuid::new_v4(),
            payee_id: Uuid::new_v4(),
            amount: BigDecimal::from(amount),
            fee_amount: BigDecimal::from(0),
            currency: "MYR".to_string(),
            status: Some(status),
            reference: "kpay-job-test".to_string(),
            chip_transaction_id: None,
            chip_send_instruction_id: None,
            escrow_released_at: None,
            disbursed_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_summarize_counts_only_settled_transactions() {
        let job_id = Uuid::new_v4();
        let first = milestone(job_id, 200, 0);
        let second = milestone(job_id, 300, 1);

        let transactions = vec![
            transaction(job_id, Some(first.id), 200, TransactionStatus::Disbursed),
            transaction(job_id, Some(second.id), 300, TransactionStatus::Pending),
        ];

        let summary = summarize(&[first.clone(), second.clone()], &transactions);

        assert_eq!(summary.total_budget, BigDecimal::from(500));
        assert_eq!(summary.total_paid, BigDecimal::from(200));
        assert!((summary.percent_paid - 40.0).abs() < f64::EPSILON);

        assert!(summary.milestones[0].paid);
        assert!(!summary.milestones[1].paid);
    }

    #[test]
    fn test_summarize_escrowed_counts_as_paid() {
        let job_id = Uuid::new_v4();
        let only = milestone(job_id, 100, 0);
        let transactions = vec![transaction(
            job_id,
            Some(only.id),
            100,
            TransactionStatus::Completed,
        )];

        let summary = summarize(&[only], &transactions);
        assert_eq!(summary.total_paid, BigDecimal::from(100));
        assert!(summary.milestones[0].paid);
    }

    #[test]
    fn test_summarize_failed_transactions_leave_milestone_unpaid() {
        let job_id = Uuid::new_v4();
        let only = milestone(job_id, 100, 0);
        let transactions = vec![transaction(
            job_id,
            Some(only.id),
            100,
            TransactionStatus::Failed,
        )];

        let summary = summarize(&[only], &transactions);
        assert_eq!(summary.total_paid, BigDecimal::from(0));
        assert!(!summary.milestones[0].paid);
    }

    #[test]
    fn test_summarize_does_not_clamp_overpayment() {
        // Charge amounts are caller-supplied, so a milestone can be paid
        // above its advisory amount.
        let job_id = Uuid::new_v4();
        let only = milestone(job_id, 100, 0);
        let transactions = vec![transaction(
            job_id,
            Some(only.id),
            150,
            TransactionStatus::Disbursed,
        )];

        let summary = summarize(&[only], &transactions);
        assert_eq!(summary.total_paid, BigDecimal::from(150));
        assert!(summary.percent_paid > 100.0);
    }

    #[test]
    fn test_summarize_skips_whole_job_transactions() {
        // A whole-job charge has no milestone to attribute it to and stays
        // out of the rollup entirely.
        let job_id = Uuid::new_v4();
        let only = milestone(job_id, 100, 0);
        let transactions = vec![
            transaction(job_id, Some(only.id), 100, TransactionStatus::Completed),
            transaction(job_id, None, 500, TransactionStatus::Disbursed),
        ];

        let summary = summarize(&[only], &transactions);
        assert_eq!(summary.total_paid, BigDecimal::from(100));
        assert!((summary.percent_paid - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summarize_empty_budget_reports_zero_percent() {
        let summary = summarize(&[], &[]);
        assert_eq!(summary.total_paid, BigDecimal::from(0));
        assert_eq!(summary.percent_paid, 0.0);
        assert!(summary.milestones.is_empty());
    }
}
