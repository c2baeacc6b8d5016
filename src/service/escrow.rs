// service/escrow.rs
//
// Pure escrow state machine. Everything here works on rows already loaded by
// the caller; the database writes that apply an allowed transition live in
// db/paymentdb.rs and the gateway calls in service/payment_service.rs.
use uuid::Uuid;

use crate::{models::marketmodel::*, service::error::ServiceError};

/// Payment state of one escrow scope: a whole job, or a single milestone.
/// Derived from the newest transaction in the scope, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Unpaid,
    Processing,
    Escrowed,
    Released,
}

pub fn scope_state(latest: Option<&Transaction>) -> ScopeState {
    match latest {
        None => ScopeState::Unpaid,
        Some(txn) => match txn.status.unwrap_or(TransactionStatus::Pending) {
            // A failed charge leaves the scope payable again.
            TransactionStatus::Failed => ScopeState::Unpaid,
            TransactionStatus::Pending => ScopeState::Processing,
            TransactionStatus::Completed => ScopeState::Escrowed,
            TransactionStatus::Released | TransactionStatus::Disbursed => ScopeState::Released,
        },
    }
}

/// What a gateway status check means for a pending transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Complete,
    Fail,
}

/// CHIP purchase statuses that can no longer become paid.
const TERMINAL_FAILURE_STATUSES: [&str; 4] = ["error", "cancelled", "expired", "blocked"];

/// Decide how a gateway purchase status applies to our transaction. Returns
/// None when there is nothing to do, which makes repeated status checks
/// idempotent: a transaction past pending never moves backwards from here.
pub fn reconcile_action(
    current: TransactionStatus,
    gateway_status: &str,
) -> Option<ReconcileAction> {
    if current != TransactionStatus::Pending {
        return None;
    }
    if gateway_status == "paid" {
        return Some(ReconcileAction::Complete);
    }
    if TERMINAL_FAILURE_STATUSES.contains(&gateway_status) {
        return Some(ReconcileAction::Fail);
    }
    None
}

/// Guard for creating a new escrow charge against a job or milestone scope.
pub fn authorize_charge(
    job: &Job,
    bid: &Bid,
    milestone: Option<&Milestone>,
    latest: Option<&Transaction>,
    payer_id: Uuid,
    payee_id: Uuid,
) -> Result<(), ServiceError> {
    if job.owner_id != payer_id {
        return Err(ServiceError::UnauthorizedJobAccess(payer_id, job.id));
    }

    let status = job.status.unwrap_or(JobStatus::Open);
    if status != JobStatus::InProgress {
        return Err(ServiceError::InvalidJobStatus(job.id, status));
    }

    if bid.job_id != job.id {
        return Err(ServiceError::Validation(
            "Bid does not belong to this job".to_string(),
        ));
    }
    if bid.status.unwrap_or(BidStatus::Pending) != BidStatus::Accepted {
        return Err(ServiceError::Validation(
            "Only the accepted bid can be paid".to_string(),
        ));
    }
    if payee_id != bid.bidder_id {
        return Err(ServiceError::Validation(
            "Payee must be the accepted bidder".to_string(),
        ));
    }

    let uses_milestones = job.uses_milestones.unwrap_or(false);
    match milestone {
        Some(milestone) => {
            if !uses_milestones {
                return Err(ServiceError::Validation(
                    "Job does not use milestone payments".to_string(),
                ));
            }
            if milestone.job_id != job.id {
                return Err(ServiceError::Validation(
                    "Milestone does not belong to this job".to_string(),
                ));
            }
        }
        None => {
            if uses_milestones {
                return Err(ServiceError::Validation(
                    "This job is paid per milestone".to_string(),
                ));
            }
            // Whole-job payments also key off the job-level flag; a failed
            // charge resets it to unpaid, anything else means money moved.
            let payment_status = job.payment_status.unwrap_or(JobPaymentStatus::Unpaid);
            if payment_status != JobPaymentStatus::Unpaid {
                return Err(ServiceError::InvalidEscrowTransition(format!(
                    "Job payment is already {:?}",
                    payment_status
                )));
            }
        }
    }

    match scope_state(latest) {
        ScopeState::Unpaid => Ok(()),
        state => Err(ServiceError::InvalidEscrowTransition(format!(
            "Cannot create a charge while the payment scope is {:?}",
            state
        ))),
    }
}

/// Guard for releasing escrowed funds to the worker. Release is allowed while
/// work is in progress or after the job is complete; it is the job owner's
/// call either way.
pub fn authorize_release(
    job: &Job,
    transaction: &Transaction,
    caller_id: Uuid,
) -> Result<(), ServiceError> {
    if job.owner_id != caller_id {
        return Err(ServiceError::UnauthorizedJobAccess(caller_id, job.id));
    }
    if transaction.job_id != job.id {
        return Err(ServiceError::Validation(
            "Transaction does not belong to this job".to_string(),
        ));
    }

    let status = job.status.unwrap_or(JobStatus::Open);
    if !matches!(status, JobStatus::InProgress | JobStatus::Complete) {
        return Err(ServiceError::InvalidJobStatus(job.id, status));
    }

    // Paid is the only window with escrow still held at the job level;
    // released means every transaction has already left.
    let payment_status = job.payment_status.unwrap_or(JobPaymentStatus::Unpaid);
    if payment_status != JobPaymentStatus::Paid {
        return Err(ServiceError::InvalidEscrowTransition(format!(
            "Job payment is {:?}, there is no held escrow to release",
            payment_status
        )));
    }

    match transaction.status.unwrap_or(TransactionStatus::Pending) {
        TransactionStatus::Completed => Ok(()),
        status => Err(ServiceError::InvalidEscrowTransition(format!(
            "Only escrowed funds can be released, transaction is {:?}",
            status
        ))),
    }
}

pub fn ensure_bid_acceptable(job: &Job, bid: &Bid, caller_id: Uuid) -> Result<(), ServiceError> {
    if job.owner_id != caller_id {
        return Err(ServiceError::UnauthorizedJobAccess(caller_id, job.id));
    }
    if bid.job_id != job.id {
        return Err(ServiceError::Validation(
            "Bid does not belong to this job".to_string(),
        ));
    }

    let status = job.status.unwrap_or(JobStatus::Open);
    if !matches!(status, JobStatus::Open | JobStatus::Bidding) {
        return Err(ServiceError::InvalidJobStatus(job.id, status));
    }

    if bid.status.unwrap_or(BidStatus::Pending) != BidStatus::Pending {
        return Err(ServiceError::Validation(
            "Bid has already been decided".to_string(),
        ));
    }
    Ok(())
}

/// Only the accepted bidder may submit, only while the job is in progress
/// and escrow-funded, and only one submission may await review at a time.
pub fn ensure_submission_allowed(
    job: &Job,
    accepted_bid: &Bid,
    open_submission: Option<&WorkSubmission>,
    caller_id: Uuid,
) -> Result<(), ServiceError> {
    let status = job.status.unwrap_or(JobStatus::Open);
    if status != JobStatus::InProgress {
        return Err(ServiceError::InvalidJobStatus(job.id, status));
    }
    let payment_status = job.payment_status.unwrap_or(JobPaymentStatus::Unpaid);
    if payment_status != JobPaymentStatus::Paid {
        return Err(ServiceError::Validation(
            "Work cannot be submitted before the job is funded".to_string(),
        ));
    }
    if accepted_bid.bidder_id != caller_id {
        return Err(ServiceError::UnauthorizedJobAccess(caller_id, job.id));
    }
    if open_submission.is_some() {
        return Err(ServiceError::Validation(
            "A submission is already awaiting review".to_string(),
        ));
    }
    Ok(())
}

pub fn ensure_review_allowed(
    job: &Job,
    submission: &WorkSubmission,
    caller_id: Uuid,
) -> Result<(), ServiceError> {
    if job.owner_id != caller_id {
        return Err(ServiceError::UnauthorizedJobAccess(caller_id, job.id));
    }
    if submission.job_id != job.id {
        return Err(ServiceError::Validation(
            "Submission does not belong to this job".to_string(),
        ));
    }
    if submission.status.unwrap_or(SubmissionStatus::PendingReview)
        != SubmissionStatus::PendingReview
    {
        return Err(ServiceError::Validation(
            "Submission has already been reviewed".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::BigDecimal;

    fn job(owner_id: Uuid, status: JobStatus, uses_milestones: bool) -> Job {
        Job {
            id: Uuid::new_v4(),
            owner_id,
            title: "Build a landing page".to_string(),
            description: "Static landing page with a contact form".to_string(),
            budget: BigDecimal::from(500),
            currency: "MYR".to_string(),
            status: Some(status),
            payment_status: Some(JobPaymentStatus::Unpaid),
            uses_milestones: Some(uses_milestones),
            created_at: None,
            updated_at: None,
        }
    }

    fn bid(job_id: Uuid, bidder_id: Uuid, status: BidStatus) -> Bid {
        Bid {
            id: Uuid::new_v4(),
            job_id,
            bidder_id,
            amount: BigDecimal::from(450),
            message: "Can deliver in a week".to_string(),
            status: Some(status),
            created_at: None,
        }
    }

    fn milestone(job_id: Uuid) -> Milestone {
        Milestone {
            id: Uuid::new_v4(),
            job_id,
            title: "First draft".to_string(),
            amount: BigDecimal::from(200),
            order_index: 0,
            status: Some(MilestoneStatus::Pending),
            created_at: None,
        }
    }

    fn transaction(job_id: Uuid, status: TransactionStatus) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            job_id,
            bid_id: Uuid::new_v4(),
            milestone_id: None,
            payer_id: Uuid::new_v4(),
            payee_id: Uuid::new_v4(),
            amount: BigDecimal::from(450),
            fee_amount: BigDecimal::from(22),
            currency: "MYR".to_string(),
            status: Some(status),
            reference: "kpay-job-test".to_string(),
            chip_transaction_id: Some("chip_123".to_string()),
            chip_send_instruction_id: None,
            escrow_released_at: None,
            disbursed_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn submission(job_id: Uuid, bid_id: Uuid, status: SubmissionStatus) -> WorkSubmission {
        WorkSubmission {
            id: Uuid::new_v4(),
            job_id,
            bid_id,
            note: "Done, see attached".to_string(),
            status: Some(status),
            review_note: None,
            created_at: None,
            reviewed_at: None,
        }
    }

    #[test]
    fn test_scope_state_from_latest_transaction() {
        let job_id = Uuid::new_v4();

        assert_eq!(scope_state(None), ScopeState::Unpaid);
        assert_eq!(
            scope_state(Some(&transaction(job_id, TransactionStatus::Failed))),
            ScopeState::Unpaid
        );
        assert_eq!(
            scope_state(Some(&transaction(job_id, TransactionStatus::Pending))),
            ScopeState::Processing
        );
        assert_eq!(
            scope_state(Some(&transaction(job_id, TransactionStatus::Completed))),
            ScopeState::Escrowed
        );
        assert_eq!(
            scope_state(Some(&transaction(job_id, TransactionStatus::Released))),
            ScopeState::Released
        );
        assert_eq!(
            scope_state(Some(&transaction(job_id, TransactionStatus::Disbursed))),
            ScopeState::Released
        );
    }

    #[test]
    fn test_reconcile_paid_completes_pending() {
        assert_eq!(
            reconcile_action(TransactionStatus::Pending, "paid"),
            Some(ReconcileAction::Complete)
        );
    }

    #[test]
    fn test_reconcile_terminal_gateway_failures() {
        for status in ["error", "cancelled", "expired", "blocked"] {
            assert_eq!(
                reconcile_action(TransactionStatus::Pending, status),
                Some(ReconcileAction::Fail),
                "gateway status {status} should fail the charge"
            );
        }
    }

    #[test]
    fn test_reconcile_ignores_in_flight_gateway_statuses() {
        for status in ["created", "sent", "viewed", "hold"] {
            assert_eq!(reconcile_action(TransactionStatus::Pending, status), None);
        }
    }

    #[test]
    fn test_reconcile_is_idempotent_after_pending() {
        // Repeating a check against an already settled transaction must not
        // move it, not even when the gateway later reports a failure.
        for current in [
            TransactionStatus::Completed,
            TransactionStatus::Released,
            TransactionStatus::Disbursed,
            TransactionStatus::Failed,
        ] {
            assert_eq!(reconcile_action(current, "paid"), None);
            assert_eq!(reconcile_action(current, "error"), None);
        }
    }

    #[test]
    fn test_authorize_charge_happy_path() {
        let owner = Uuid::new_v4();
        let worker = Uuid::new_v4();
        let job = job(owner, JobStatus::InProgress, false);
        let bid = bid(job.id, worker, BidStatus::Accepted);

        assert!(authorize_charge(&job, &bid, None, None, owner, worker).is_ok());
    }

    #[test]
    fn test_authorize_charge_rejects_non_owner() {
        let owner = Uuid::new_v4();
        let worker = Uuid::new_v4();
        let job = job(owner, JobStatus::InProgress, false);
        let bid = bid(job.id, worker, BidStatus::Accepted);

        let result = authorize_charge(&job, &bid, None, None, worker, worker);
        assert!(matches!(
            result,
            Err(ServiceError::UnauthorizedJobAccess(_, _))
        ));
    }

    #[test]
    fn test_authorize_charge_requires_in_progress_job() {
        let owner = Uuid::new_v4();
        let worker = Uuid::new_v4();
        let job = job(owner, JobStatus::Open, false);
        let bid = bid(job.id, worker, BidStatus::Accepted);

        let result = authorize_charge(&job, &bid, None, None, owner, worker);
        assert!(matches!(result, Err(ServiceError::InvalidJobStatus(_, _))));
    }

    #[test]
    fn test_authorize_charge_requires_accepted_bid_and_matching_payee() {
        let owner = Uuid::new_v4();
        let worker = Uuid::new_v4();
        let job = job(owner, JobStatus::InProgress, false);

        let pending = bid(job.id, worker, BidStatus::Pending);
        assert!(authorize_charge(&job, &pending, None, None, owner, worker).is_err());

        let accepted = bid(job.id, worker, BidStatus::Accepted);
        let stranger = Uuid::new_v4();
        assert!(authorize_charge(&job, &accepted, None, None, owner, stranger).is_err());
    }

    #[test]
    fn test_authorize_charge_milestone_scope_must_match_job_mode() {
        let owner = Uuid::new_v4();
        let worker = Uuid::new_v4();

        // Whole-job payment against a milestone job is rejected.
        let milestone_job = job(owner, JobStatus::InProgress, true);
        let accepted = bid(milestone_job.id, worker, BidStatus::Accepted);
        assert!(authorize_charge(&milestone_job, &accepted, None, None, owner, worker).is_err());

        // Milestone payment against a whole-job job is rejected.
        let plain_job = job(owner, JobStatus::InProgress, false);
        let accepted = bid(plain_job.id, worker, BidStatus::Accepted);
        let ms = milestone(plain_job.id);
        assert!(authorize_charge(&plain_job, &accepted, Some(&ms), None, owner, worker).is_err());

        // Matching mode passes.
        let ms = milestone(milestone_job.id);
        let accepted = bid(milestone_job.id, worker, BidStatus::Accepted);
        assert!(
            authorize_charge(&milestone_job, &accepted, Some(&ms), None, owner, worker).is_ok()
        );
    }

    #[test]
    fn test_authorize_charge_blocks_double_payment() {
        let owner = Uuid::new_v4();
        let worker = Uuid::new_v4();
        let job = job(owner, JobStatus::InProgress, false);
        let accepted = bid(job.id, worker, BidStatus::Accepted);

        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Completed,
            TransactionStatus::Released,
            TransactionStatus::Disbursed,
        ] {
            let latest = transaction(job.id, status);
            let result = authorize_charge(&job, &accepted, None, Some(&latest), owner, worker);
            assert!(
                matches!(result, Err(ServiceError::InvalidEscrowTransition(_))),
                "scope with a {status:?} transaction must not accept a new charge"
            );
        }
    }

    #[test]
    fn test_authorize_charge_allows_retry_after_failure() {
        let owner = Uuid::new_v4();
        let worker = Uuid::new_v4();
        let job = job(owner, JobStatus::InProgress, false);
        let accepted = bid(job.id, worker, BidStatus::Accepted);
        let failed = transaction(job.id, TransactionStatus::Failed);

        assert!(authorize_charge(&job, &accepted, None, Some(&failed), owner, worker).is_ok());
    }

    #[test]
    fn test_authorize_charge_whole_job_checks_payment_flag() {
        let owner = Uuid::new_v4();
        let worker = Uuid::new_v4();
        let mut job = job(owner, JobStatus::InProgress, false);
        job.payment_status = Some(JobPaymentStatus::Processing);
        let accepted = bid(job.id, worker, BidStatus::Accepted);

        // Even with no scoped transaction in hand, a job already marked
        // processing must not take a second whole-job charge.
        let result = authorize_charge(&job, &accepted, None, None, owner, worker);
        assert!(matches!(result, Err(ServiceError::InvalidEscrowTransition(_))));
    }

    #[test]
    fn test_authorize_release_requires_escrowed_funds() {
        let owner = Uuid::new_v4();
        let mut job = job(owner, JobStatus::Complete, false);
        job.payment_status = Some(JobPaymentStatus::Paid);

        let escrowed = transaction(job.id, TransactionStatus::Completed);
        assert!(authorize_release(&job, &escrowed, owner).is_ok());

        let pending = transaction(job.id, TransactionStatus::Pending);
        assert!(matches!(
            authorize_release(&job, &pending, owner),
            Err(ServiceError::InvalidEscrowTransition(_))
        ));

        let released = transaction(job.id, TransactionStatus::Released);
        assert!(authorize_release(&job, &released, owner).is_err());
    }

    #[test]
    fn test_authorize_release_requires_job_paid() {
        let owner = Uuid::new_v4();
        let unfunded = job(owner, JobStatus::InProgress, false);
        let escrowed = transaction(unfunded.id, TransactionStatus::Completed);

        assert!(matches!(
            authorize_release(&unfunded, &escrowed, owner),
            Err(ServiceError::InvalidEscrowTransition(_))
        ));
    }

    #[test]
    fn test_authorize_release_window() {
        let owner = Uuid::new_v4();

        let mut in_progress = job(owner, JobStatus::InProgress, false);
        in_progress.payment_status = Some(JobPaymentStatus::Paid);
        let escrowed = transaction(in_progress.id, TransactionStatus::Completed);
        assert!(authorize_release(&in_progress, &escrowed, owner).is_ok());

        let open = job(owner, JobStatus::Open, false);
        let escrowed = transaction(open.id, TransactionStatus::Completed);
        assert!(matches!(
            authorize_release(&open, &escrowed, owner),
            Err(ServiceError::InvalidJobStatus(_, _))
        ));
    }

    #[test]
    fn test_ensure_bid_acceptable() {
        let owner = Uuid::new_v4();
        let worker = Uuid::new_v4();

        let open_job = job(owner, JobStatus::Open, false);
        let pending = bid(open_job.id, worker, BidStatus::Pending);
        assert!(ensure_bid_acceptable(&open_job, &pending, owner).is_ok());

        let bidding_job = job(owner, JobStatus::Bidding, false);
        let pending = bid(bidding_job.id, worker, BidStatus::Pending);
        assert!(ensure_bid_acceptable(&bidding_job, &pending, owner).is_ok());

        // Already assigned jobs take no more acceptances.
        let assigned = job(owner, JobStatus::InProgress, false);
        let pending = bid(assigned.id, worker, BidStatus::Pending);
        assert!(ensure_bid_acceptable(&assigned, &pending, owner).is_err());

        // A decided bid cannot be accepted again.
        let rejected = bid(open_job.id, worker, BidStatus::Rejected);
        assert!(ensure_bid_acceptable(&open_job, &rejected, owner).is_err());

        // Only the owner accepts.
        let pending = bid(open_job.id, worker, BidStatus::Pending);
        assert!(ensure_bid_acceptable(&open_job, &pending, worker).is_err());
    }

    #[test]
    fn test_ensure_submission_allowed() {
        let owner = Uuid::new_v4();
        let worker = Uuid::new_v4();
        let mut active = job(owner, JobStatus::InProgress, false);
        active.payment_status = Some(JobPaymentStatus::Paid);
        let accepted = bid(active.id, worker, BidStatus::Accepted);

        assert!(ensure_submission_allowed(&active, &accepted, None, worker).is_ok());

        // Owner is not the worker.
        assert!(ensure_submission_allowed(&active, &accepted, None, owner).is_err());

        // One open submission at a time.
        let open = submission(active.id, accepted.id, SubmissionStatus::PendingReview);
        assert!(ensure_submission_allowed(&active, &accepted, Some(&open), worker).is_err());

        // Escrow has to be funded before work goes up for review.
        let unfunded = job(owner, JobStatus::InProgress, false);
        let accepted_unfunded = bid(unfunded.id, worker, BidStatus::Accepted);
        assert!(ensure_submission_allowed(&unfunded, &accepted_unfunded, None, worker).is_err());

        // Job must still be running.
        let done = job(owner, JobStatus::Complete, false);
        let accepted = bid(done.id, worker, BidStatus::Accepted);
        assert!(ensure_submission_allowed(&done, &accepted, None, worker).is_err());
    }

    #[test]
    fn test_ensure_review_allowed() {
        let owner = Uuid::new_v4();
        let worker = Uuid::new_v4();
        let active = job(owner, JobStatus::InProgress, false);
        let accepted = bid(active.id, worker, BidStatus::Accepted);

        let open = submission(active.id, accepted.id, SubmissionStatus::PendingReview);
        assert!(ensure_review_allowed(&active, &open, owner).is_ok());
        assert!(ensure_review_allowed(&active, &open, worker).is_err());

        let decided = submission(active.id, accepted.id, SubmissionStatus::Approved);
        assert!(ensure_review_allowed(&active, &decided, owner).is_err());
    }
}
