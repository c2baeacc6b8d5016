// service/payment_service.rs
//
// Orchestrates the escrow payment lifecycle against CHIP: charge creation
// (collection), status reconciliation, and release/disbursement. Guards live
// in service/escrow.rs; the state writes in db/paymentdb.rs.
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::{db::DBClient, marketdb::MarketExt, paymentdb::PaymentExt, userdb::UserExt},
    models::{marketmodel::*, usermodel::User},
    service::{
        chip::{
            ChipApi, ChipError, ChipSendInstruction, CreateBankAccountRequest,
            CreatePurchaseRequest, CreateSendInstructionRequest,
        },
        error::ServiceError,
        escrow::{self, ReconcileAction},
    },
    utils::currency,
};

#[derive(Debug)]
pub struct ChargeOutcome {
    pub transaction: Transaction,
    pub checkout_url: String,
}

#[derive(Debug)]
pub struct DisbursementOutcome {
    pub transaction: Transaction,
    pub send_instruction_id: Option<String>,
    pub warning: Option<String>,
}

struct PayeeBankDetails {
    name: String,
    account_number: String,
    bank_code: String,
    email: String,
}

fn payee_bank_details(user: &User) -> Option<PayeeBankDetails> {
    Some(PayeeBankDetails {
        name: user.bank_account_name.clone()?,
        account_number: user.bank_account_number.clone()?,
        bank_code: user.bank_code.clone()?,
        email: user.email.clone(),
    })
}

// The CHIP Send sequence: balance check, payee bank registration, send
// instruction. Stops at the first failing step. Callers convert the amount
// to cents up front, so every error out of here is a gateway failure the
// retry job can pick up.
async fn run_send_sequence(
    chip: &dyn ChipApi,
    transaction: &Transaction,
    bank: &PayeeBankDetails,
    amount_cents: i64,
) -> Result<ChipSendInstruction, ChipError> {
    let balance = chip.send_balance().await?;
    tracing::info!(
        "CHIP send balance check before release of {}: {} account(s)",
        transaction.reference,
        balance.accounts.len()
    );

    let bank_account = chip
        .create_bank_account(CreateBankAccountRequest {
            account_number: bank.account_number.clone(),
            bank_code: bank.bank_code.clone(),
            name: bank.name.clone(),
        })
        .await?;
    tracing::info!(
        "CHIP bank account {} registered for transaction {}",
        bank_account.id,
        transaction.id
    );

    let instruction = chip
        .create_send_instruction(CreateSendInstructionRequest {
            bank_account_id: bank_account.id,
            amount_cents,
            description: format!("Escrow release for job {}", transaction.job_id),
            email: bank.email.clone(),
            reference: transaction.reference.clone(),
        })
        .await?;
    tracing::info!(
        "CHIP send instruction {} submitted for transaction {}",
        instruction.id,
        transaction.id
    );

    Ok(instruction)
}

#[derive(Clone)]
pub struct PaymentService {
    db_client: Arc<DBClient>,
    chip: Arc<dyn ChipApi>,
    app_url: String,
}

impl PaymentService {
    pub fn new(db_client: Arc<DBClient>, chip: Arc<dyn ChipApi>, app_url: String) -> Self {
        Self {
            db_client,
            chip,
            app_url,
        }
    }

    /// Create an escrow charge for a job or milestone scope. The gateway
    /// purchase is created first; only when CHIP accepts it does the pending
    /// transaction get persisted and the job move to processing.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_charge(
        &self,
        payer_id: Uuid,
        job_id: Uuid,
        bid_id: Uuid,
        milestone_id: Option<Uuid>,
        amount: f64,
        currency_code: String,
        buyer_name: String,
        buyer_email: String,
        payee_id: Uuid,
        reference: Option<String>,
    ) -> Result<ChargeOutcome, ServiceError> {
        let job = self
            .db_client
            .get_job_by_id(job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))?;
        let bid = self
            .db_client
            .get_bid_by_id(bid_id)
            .await?
            .ok_or(ServiceError::BidNotFound(bid_id))?;

        let milestone = match milestone_id {
            Some(milestone_id) => Some(
                self.db_client
                    .get_milestone_by_id(milestone_id)
                    .await?
                    .ok_or(ServiceError::MilestoneNotFound(milestone_id))?,
            ),
            None => None,
        };

        let latest = self
            .db_client
            .get_latest_scope_transaction(job_id, milestone_id)
            .await?;

        escrow::authorize_charge(
            &job,
            &bid,
            milestone.as_ref(),
            latest.as_ref(),
            payer_id,
            payee_id,
        )?;

        let amount = currency::amount_from_f64(amount)
            .map_err(|_| ServiceError::Validation("Invalid payment amount".to_string()))?;
        let fee_amount = currency::platform_fee(&amount);
        let charge_total = currency::total_with_fee(&amount);
        let amount_cents = currency::amount_to_cents(&charge_total).ok_or_else(|| {
            ServiceError::Validation("Payment amount is too large to express in cents".to_string())
        })?;

        // Retrying a charge for the same scope reuses the same reference so
        // the gateway can deduplicate.
        let reference = reference.unwrap_or_else(|| escrow_reference(job_id, milestone_id));

        let purchase = self
            .chip
            .create_purchase(CreatePurchaseRequest {
                client_email: buyer_email,
                client_full_name: buyer_name,
                product_name: job.title.clone(),
                amount_cents,
                currency: currency_code.clone(),
                reference: reference.clone(),
                success_redirect: Some(format!(
                    "{}/jobs/{}?payment=success",
                    self.app_url, job.id
                )),
                failure_redirect: Some(format!("{}/jobs/{}?payment=failed", self.app_url, job.id)),
            })
            .await?;

        if purchase.checkout_url.is_empty() {
            return Err(ServiceError::Gateway(
                "CHIP purchase has no checkout URL".to_string(),
            ));
        }

        let transaction = self
            .db_client
            .create_charge_transaction(
                job_id,
                bid_id,
                milestone_id,
                payer_id,
                payee_id,
                amount,
                fee_amount,
                currency_code,
                reference,
                purchase.id.clone(),
            )
            .await?;

        tracing::info!(
            "Created CHIP purchase {} for transaction {}",
            purchase.id,
            transaction.id
        );

        Ok(ChargeOutcome {
            transaction,
            checkout_url: purchase.checkout_url,
        })
    }

    /// Poll CHIP for a pending charge and reconcile our state with the
    /// answer. Safe to call repeatedly; a transaction past pending is
    /// reported as-is without touching the gateway.
    pub async fn check_status(
        &self,
        chip_transaction_id: &str,
    ) -> Result<TransactionStatus, ServiceError> {
        let transaction = self
            .db_client
            .get_transaction_by_chip_id(chip_transaction_id)
            .await?
            .ok_or_else(|| {
                ServiceError::ChipTransactionNotFound(chip_transaction_id.to_string())
            })?;

        let current = transaction.status.unwrap_or(TransactionStatus::Pending);
        if current != TransactionStatus::Pending {
            return Ok(current);
        }

        let purchase = self.chip.get_purchase(chip_transaction_id).await?;

        match escrow::reconcile_action(current, &purchase.status) {
            Some(ReconcileAction::Complete) => {
                self.db_client
                    .confirm_escrow(transaction.id, transaction.job_id, transaction.milestone_id)
                    .await?;
                tracing::info!(
                    "Escrow confirmed for transaction {} (CHIP status {})",
                    transaction.id,
                    purchase.status
                );
                Ok(TransactionStatus::Completed)
            }
            Some(ReconcileAction::Fail) => {
                self.db_client
                    .fail_transaction(transaction.id, transaction.job_id)
                    .await?;
                tracing::info!(
                    "Charge failed for transaction {} (CHIP status {})",
                    transaction.id,
                    purchase.status
                );
                Ok(TransactionStatus::Failed)
            }
            None => Ok(current),
        }
    }

    /// Release escrowed funds to the payee. On a confirmed payout the
    /// transaction ends disbursed; if any CHIP Send step fails the escrow
    /// still leaves (released) and the caller gets a warning instead of an
    /// error, with the retry job finishing the payout later.
    pub async fn release_funds(
        &self,
        caller_id: Uuid,
        transaction_id: Uuid,
        job_id: Uuid,
    ) -> Result<DisbursementOutcome, ServiceError> {
        let job = self
            .db_client
            .get_job_by_id(job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))?;
        let transaction = self
            .db_client
            .get_transaction_by_id(transaction_id)
            .await?
            .ok_or(ServiceError::TransactionNotFound(transaction_id))?;

        escrow::authorize_release(&job, &transaction, caller_id)?;

        let payee = self
            .db_client
            .get_user(Some(transaction.payee_id), None)
            .await?
            .ok_or_else(|| ServiceError::Validation("Payee account no longer exists".to_string()))?;
        let bank = payee_bank_details(&payee).ok_or_else(|| {
            ServiceError::Validation("Payee has no bank account on file".to_string())
        })?;
        let amount_cents = currency::amount_to_cents(&transaction.amount).ok_or_else(|| {
            ServiceError::Validation("Escrow amount is too large to express in cents".to_string())
        })?;

        match run_send_sequence(self.chip.as_ref(), &transaction, &bank, amount_cents).await {
            Ok(instruction) => {
                let updated = self
                    .db_client
                    .finalize_release(
                        transaction.id,
                        job_id,
                        transaction.milestone_id,
                        Some(instruction.id.to_string()),
                        true,
                    )
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InvalidEscrowTransition(
                            "Escrow has already been released".to_string(),
                        )
                    })?;

                Ok(DisbursementOutcome {
                    transaction: updated,
                    send_instruction_id: Some(instruction.id.to_string()),
                    warning: None,
                })
            }
            Err(error) => {
                // The release still goes forward: the transaction is marked
                // released (not disbursed) and the disbursement retry job
                // finishes the payout later.
                tracing::error!(
                    "CHIP disbursement failed for transaction {}: {}",
                    transaction.id,
                    error
                );
                let updated = self
                    .db_client
                    .finalize_release(transaction.id, job_id, transaction.milestone_id, None, false)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InvalidEscrowTransition(
                            "Escrow has already been released".to_string(),
                        )
                    })?;

                Ok(DisbursementOutcome {
                    transaction: updated,
                    send_instruction_id: None,
                    warning: Some(format!(
                        "Escrow released but payout unconfirmed: {}. Disbursement will be retried.",
                        error
                    )),
                })
            }
        }
    }

    /// Re-run the payout for a transaction stuck in released. Used by the
    /// background retry job; never escalates gateway failures.
    pub async fn retry_disbursement(
        &self,
        transaction: &Transaction,
    ) -> Result<Option<Transaction>, ServiceError> {
        if transaction.status.unwrap_or(TransactionStatus::Pending) != TransactionStatus::Released
        {
            return Ok(None);
        }

        let payee = self
            .db_client
            .get_user(Some(transaction.payee_id), None)
            .await?
            .ok_or_else(|| ServiceError::Validation("Payee account no longer exists".to_string()))?;

        let Some(bank) = payee_bank_details(&payee) else {
            tracing::warn!(
                "Transaction {} payee has no bank account on file, skipping disbursement retry",
                transaction.id
            );
            return Ok(None);
        };
        let amount_cents = currency::amount_to_cents(&transaction.amount).ok_or_else(|| {
            ServiceError::Validation("Escrow amount is too large to express in cents".to_string())
        })?;

        match run_send_sequence(self.chip.as_ref(), transaction, &bank, amount_cents).await {
            Ok(instruction) => {
                let updated = self
                    .db_client
                    .mark_disbursed(transaction.id, instruction.id.to_string())
                    .await?;
                if updated.is_some() {
                    tracing::info!(
                        "Disbursement confirmed on retry for transaction {} (send instruction {})",
                        transaction.id,
                        instruction.id
                    );
                }
                Ok(updated)
            }
            Err(error) => {
                tracing::warn!(
                    "Disbursement retry failed for transaction {}: {}",
                    transaction.id,
                    error
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use sqlx::types::BigDecimal;
    use std::sync::Mutex;

    use crate::service::chip::{ChipBankAccount, ChipPurchase, ChipSendAccount, ChipSendBalance};

    struct MockChip {
        fail_balance: bool,
        fail_bank_account: bool,
        fail_send_instruction: bool,
        calls: Mutex<Vec<&'static str>>,
        sent: Mutex<Option<CreateSendInstructionRequest>>,
    }

    impl MockChip {
        fn ok() -> Self {
            Self {
                fail_balance: false,
                fail_bank_account: false,
                fail_send_instruction: false,
                calls: Mutex::new(Vec::new()),
                sent: Mutex::new(None),
            }
        }

        fn api_error() -> ChipError {
            ChipError::Api {
                status: 503,
                body: "temporarily unavailable".to_string(),
            }
        }
    }

    #[async_trait]
    impl ChipApi for MockChip {
        async fn create_purchase(
            &self,
            _request: CreatePurchaseRequest,
        ) -> Result<ChipPurchase, ChipError> {
            self.calls.lock().unwrap().push("create_purchase");
            Ok(ChipPurchase {
                id: "purchase_1".to_string(),
                status: "created".to_string(),
                checkout_url: "https://gate.test/p/1/".to_string(),
            })
        }

        async fn get_purchase(&self, _purchase_id: &str) -> Result<ChipPurchase, ChipError> {
            self.calls.lock().unwrap().push("get_purchase");
            Ok(ChipPurchase {
                id: "purchase_1".to_string(),
                status: "paid".to_string(),
                checkout_url: String::new(),
            })
        }

        async fn send_balance(&self) -> Result<ChipSendBalance, ChipError> {
            self.calls.lock().unwrap().push("send_balance");
            if self.fail_balance {
                return Err(Self::api_error());
            }
            Ok(ChipSendBalance {
                accounts: vec![ChipSendAccount {
                    id: 1,
                    balance: "1000.00".to_string(),
                    currency: "MYR".to_string(),
                }],
            })
        }

        async fn create_bank_account(
            &self,
            _request: CreateBankAccountRequest,
        ) -> Result<ChipBankAccount, ChipError> {
            self.calls.lock().unwrap().push("create_bank_account");
            if self.fail_bank_account {
                return Err(Self::api_error());
            }
            Ok(ChipBankAccount {
                id: 77,
                status: "verified".to_string(),
            })
        }

        async fn create_send_instruction(
            &self,
            request: CreateSendInstructionRequest,
        ) -> Result<ChipSendInstruction, ChipError> {
            self.calls.lock().unwrap().push("create_send_instruction");
            if self.fail_send_instruction {
                return Err(Self::api_error());
            }
            *self.sent.lock().unwrap() = Some(request);
            Ok(ChipSendInstruction {
                id: 4242,
                state: "executed".to_string(),
            })
        }
    }

    fn released_transaction() -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            bid_id: Uuid::new_v4(),
            milestone_id: None,
            payer_id: Uuid::new_v4(),
            payee_id: Uuid::new_v4(),
            amount: BigDecimal::from(450),
            fee_amount: BigDecimal::from(22),
            currency: "MYR".to_string(),
            status: Some(TransactionStatus::Completed),
            reference: "kpay-job-test".to_string(),
            chip_transaction_id: Some("purchase_1".to_string()),
            chip_send_instruction_id: None,
            escrow_released_at: None,
            disbursed_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn bank_details() -> PayeeBankDetails {
        PayeeBankDetails {
            name: "Aisha Binti Rahman".to_string(),
            account_number: "1122334455".to_string(),
            bank_code: "MBBEMYKL".to_string(),
            email: "aisha@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_sequence_runs_steps_in_order() {
        let chip = MockChip::ok();
        let transaction = released_transaction();
        let amount_cents = currency::amount_to_cents(&transaction.amount).unwrap();

        let instruction = run_send_sequence(&chip, &transaction, &bank_details(), amount_cents)
            .await
            .unwrap();

        assert_eq!(instruction.id, 4242);
        assert_eq!(
            *chip.calls.lock().unwrap(),
            vec![
                "send_balance",
                "create_bank_account",
                "create_send_instruction"
            ]
        );

        let sent = chip.sent.lock().unwrap().clone().unwrap();
        assert_eq!(sent.bank_account_id, 77);
        assert_eq!(sent.amount_cents, 45_000);
        assert_eq!(sent.reference, transaction.reference);
        assert_eq!(sent.email, "aisha@example.com");
    }

    #[tokio::test]
    async fn test_send_sequence_stops_on_balance_failure() {
        let chip = MockChip {
            fail_balance: true,
            ..MockChip::ok()
        };
        let transaction = released_transaction();

        let result = run_send_sequence(&chip, &transaction, &bank_details(), 45_000).await;
        assert!(result.is_err());
        assert_eq!(*chip.calls.lock().unwrap(), vec!["send_balance"]);
    }

    #[tokio::test]
    async fn test_send_sequence_stops_on_bank_registration_failure() {
        let chip = MockChip {
            fail_bank_account: true,
            ..MockChip::ok()
        };
        let transaction = released_transaction();

        let result = run_send_sequence(&chip, &transaction, &bank_details(), 45_000).await;
        assert!(result.is_err());
        assert_eq!(
            *chip.calls.lock().unwrap(),
            vec!["send_balance", "create_bank_account"]
        );
    }

    #[test]
    fn test_payee_bank_details_requires_every_field() {
        let mut user = User {
            id: Uuid::new_v4(),
            name: "Aisha Binti Rahman".to_string(),
            email: "aisha@example.com".to_string(),
            password: "hashed".to_string(),
            bank_account_name: Some("Aisha Binti Rahman".to_string()),
            bank_account_number: Some("1122334455".to_string()),
            bank_code: Some("MBBEMYKL".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(payee_bank_details(&user).is_some());

        user.bank_code = None;
        assert!(payee_bank_details(&user).is_none());
    }
}
