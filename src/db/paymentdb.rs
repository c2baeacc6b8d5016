// db/paymentdb.rs
use async_trait::async_trait;
use sqlx::{types::BigDecimal, Error};
use uuid::Uuid;

use super::db::DBClient;
use crate::models::marketmodel::*;

#[async_trait]
pub trait PaymentExt {
    /// Insert the pending transaction for a freshly created gateway charge
    /// and move the job into processing, in one database transaction.
    async fn create_charge_transaction(
        &self,
        job_id: Uuid,
        bid_id: Uuid,
        milestone_id: Option<Uuid>,
        payer_id: Uuid,
        payee_id: Uuid,
        amount: BigDecimal,
        fee_amount: BigDecimal,
        currency: String,
        reference: String,
        chip_transaction_id: String,
    ) -> Result<Transaction, Error>;

    async fn get_transaction_by_id(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, Error>;

    async fn get_transaction_by_chip_id(
        &self,
        chip_transaction_id: &str,
    ) -> Result<Option<Transaction>, Error>;

    async fn get_transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, Error>;

    /// Latest transaction for a (job, milestone) payment scope. The scope of
    /// a whole-job payment is the NULL milestone.
    async fn get_latest_scope_transaction(
        &self,
        job_id: Uuid,
        milestone_id: Option<Uuid>,
    ) -> Result<Option<Transaction>, Error>;

    async fn get_transactions_for_job(&self, job_id: Uuid) -> Result<Vec<Transaction>, Error>;

    /// Escrow confirmed by the gateway: transaction pending -> completed,
    /// job payment moves to paid, a scoped milestone enters in_progress.
    /// Returns None when no pending row was flipped (already applied).
    async fn confirm_escrow(
        &self,
        transaction_id: Uuid,
        job_id: Uuid,
        milestone_id: Option<Uuid>,
    ) -> Result<Option<Transaction>, Error>;

    /// Terminal gateway failure: transaction pending -> failed, and the job
    /// returns to unpaid unless another charge already reached escrow.
    async fn fail_transaction(
        &self,
        transaction_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<Transaction>, Error>;

    /// Escrow leaves the platform: transaction completed -> released or
    /// disbursed, milestone/job cycle state rolled forward, in one database
    /// transaction. Returns None when the transaction was not in escrow.
    async fn finalize_release(
        &self,
        transaction_id: Uuid,
        job_id: Uuid,
        milestone_id: Option<Uuid>,
        chip_send_instruction_id: Option<String>,
        disbursed: bool,
    ) -> Result<Option<Transaction>, Error>;

    /// Transactions whose escrow left the platform but whose payout was
    /// never confirmed; the retry job re-runs the disbursement for these.
    async fn get_stuck_disbursements(&self, limit: i64) -> Result<Vec<Transaction>, Error>;

    async fn mark_disbursed(
        &self,
        transaction_id: Uuid,
        chip_send_instruction_id: String,
    ) -> Result<Option<Transaction>, Error>;
}

#[async_trait]
impl PaymentExt for DBClient {
    async fn create_charge_transaction(
        &self,
        job_id: Uuid,
        bid_id: Uuid,
        milestone_id: Option<Uuid>,
        payer_id: Uuid,
        payee_id: Uuid,
        amount: BigDecimal,
        fee_amount: BigDecimal,
        currency: String,
        reference: String,
        chip_transaction_id: String,
    ) -> Result<Transaction, Error> {
        let mut tx = self.pool.begin().await?;

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions
            (job_id, bid_id, milestone_id, payer_id, payee_id, amount, fee_amount,
             currency, reference, chip_transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, job_id, bid_id, milestone_id, payer_id, payee_id,
                amount, fee_amount, currency, status, reference,
                chip_transaction_id, chip_send_instruction_id,
                escrow_released_at, disbursed_at, created_at, updated_at
            "#,
        )
        .bind(job_id)
        .bind(bid_id)
        .bind(milestone_id)
        .bind(payer_id)
        .bind(payee_id)
        .bind(amount)
        .bind(fee_amount)
        .bind(currency)
        .bind(reference)
        .bind(chip_transaction_id)
        .fetch_one(&mut *tx)
        .await?;

        // Only the first charge lifts the job out of unpaid; later milestone
        // charges must not regress a job that has already reached paid.
        sqlx::query(
            r#"
            UPDATE jobs
            SET payment_status = 'processing'::job_payment_status, updated_at = NOW()
            WHERE id = $1 AND payment_status = 'unpaid'::job_payment_status
            "#,
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(transaction)
    }

    async fn get_transaction_by_id(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, job_id, bid_id, milestone_id, payer_id, payee_id,
                amount, fee_amount, currency, status, reference,
                chip_transaction_id, chip_send_instruction_id,
                escrow_released_at, disbursed_at, created_at, updated_at
            FROM transactions
            WHERE id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_transaction_by_chip_id(
        &self,
        chip_transaction_id: &str,
    ) -> Result<Option<Transaction>, Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, job_id, bid_id, milestone_id, payer_id, payee_id,
                amount, fee_amount, currency, status, reference,
                chip_transaction_id, chip_send_instruction_id,
                escrow_released_at, disbursed_at, created_at, updated_at
            FROM transactions
            WHERE chip_transaction_id = $1
            "#,
        )
        .bind(chip_transaction_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, job_id, bid_id, milestone_id, payer_id, payee_id,
                amount, fee_amount, currency, status, reference,
                chip_transaction_id, chip_send_instruction_id,
                escrow_released_at, disbursed_at, created_at, updated_at
            FROM transactions
            WHERE reference = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_latest_scope_transaction(
        &self,
        job_id: Uuid,
        milestone_id: Option<Uuid>,
    ) -> Result<Option<Transaction>, Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, job_id, bid_id, milestone_id, payer_id, payee_id,
                amount, fee_amount, currency, status, reference,
                chip_transaction_id, chip_send_instruction_id,
                escrow_released_at, disbursed_at, created_at, updated_at
            FROM transactions
            WHERE job_id = $1 AND milestone_id IS NOT DISTINCT FROM $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(job_id)
        .bind(milestone_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_transactions_for_job(&self, job_id: Uuid) -> Result<Vec<Transaction>, Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, job_id, bid_id, milestone_id, payer_id, payee_id,
                amount, fee_amount, currency, status, reference,
                chip_transaction_id, chip_send_instruction_id,
                escrow_released_at, disbursed_at, created_at, updated_at
            FROM transactions
            WHERE job_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn confirm_escrow(
        &self,
        transaction_id: Uuid,
        job_id: Uuid,
        milestone_id: Option<Uuid>,
    ) -> Result<Option<Transaction>, Error> {
        let mut tx = self.pool.begin().await?;

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = 'completed'::transaction_status, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'::transaction_status
            RETURNING id, job_id, bid_id, milestone_id, payer_id, payee_id,
                amount, fee_amount, currency, status, reference,
                chip_transaction_id, chip_send_instruction_id,
                escrow_released_at, disbursed_at, created_at, updated_at
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(transaction) = transaction else {
            // Another status check already flipped it; nothing to apply.
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE jobs
            SET payment_status = 'paid'::job_payment_status, updated_at = NOW()
            WHERE id = $1
              AND payment_status IN ('unpaid'::job_payment_status, 'processing'::job_payment_status)
            "#,
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        if let Some(milestone_id) = milestone_id {
            sqlx::query(
                r#"
                UPDATE milestones
                SET status = 'in_progress'::milestone_status
                WHERE id = $1 AND status = 'pending'::milestone_status
                "#,
            )
            .bind(milestone_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(transaction))
    }

    async fn fail_transaction(
        &self,
        transaction_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<Transaction>, Error> {
        let mut tx = self.pool.begin().await?;

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = 'failed'::transaction_status, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'::transaction_status
            RETURNING id, job_id, bid_id, milestone_id, payer_id, payee_id,
                amount, fee_amount, currency, status, reference,
                chip_transaction_id, chip_send_instruction_id,
                escrow_released_at, disbursed_at, created_at, updated_at
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(transaction) = transaction else {
            tx.commit().await?;
            return Ok(None);
        };

        // Reset so a fresh charge can be created, unless another charge for
        // this job already reached escrow.
        sqlx::query(
            r#"
            UPDATE jobs
            SET payment_status = 'unpaid'::job_payment_status, updated_at = NOW()
            WHERE id = $1
              AND payment_status = 'processing'::job_payment_status
              AND NOT EXISTS (
                  SELECT 1 FROM transactions
                  WHERE job_id = $1
                    AND status IN ('completed'::transaction_status,
                                   'released'::transaction_status,
                                   'disbursed'::transaction_status)
              )
            "#,
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(transaction))
    }

    async fn finalize_release(
        &self,
        transaction_id: Uuid,
        job_id: Uuid,
        milestone_id: Option<Uuid>,
        chip_send_instruction_id: Option<String>,
        disbursed: bool,
    ) -> Result<Option<Transaction>, Error> {
        let mut tx = self.pool.begin().await?;

        let new_status = if disbursed {
            TransactionStatus::Disbursed
        } else {
            TransactionStatus::Released
        };

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = $2::transaction_status,
                chip_send_instruction_id = $3,
                escrow_released_at = NOW(),
                disbursed_at = CASE WHEN $2 = 'disbursed' THEN NOW() ELSE NULL END,
                updated_at = NOW()
            WHERE id = $1 AND status = 'completed'::transaction_status
            RETURNING id, job_id, bid_id, milestone_id, payer_id, payee_id,
                amount, fee_amount, currency, status, reference,
                chip_transaction_id, chip_send_instruction_id,
                escrow_released_at, disbursed_at, created_at, updated_at
            "#,
        )
        .bind(transaction_id)
        .bind(new_status.to_str())
        .bind(chip_send_instruction_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(transaction) = transaction else {
            tx.commit().await?;
            return Ok(None);
        };

        match milestone_id {
            Some(milestone_id) => {
                sqlx::query(
                    r#"
                    UPDATE milestones
                    SET status = 'completed'::milestone_status
                    WHERE id = $1
                    "#,
                )
                .bind(milestone_id)
                .execute(&mut *tx)
                .await?;

                // The job is fully released once every milestone has a
                // released or disbursed transaction.
                let remaining: i64 = sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*) FROM milestones m
                    WHERE m.job_id = $1
                      AND NOT EXISTS (
                          SELECT 1 FROM transactions t
                          WHERE t.milestone_id = m.id
                            AND t.status IN ('released'::transaction_status,
                                             'disbursed'::transaction_status)
                      )
                    "#,
                )
                .bind(job_id)
                .fetch_one(&mut *tx)
                .await?;

                if remaining == 0 {
                    sqlx::query(
                        r#"
                        UPDATE jobs
                        SET status = 'complete'::job_status,
                            payment_status = 'released'::job_payment_status,
                            updated_at = NOW()
                        WHERE id = $1
                        "#,
                    )
                    .bind(job_id)
                    .execute(&mut *tx)
                    .await?;
                }
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'complete'::job_status,
                        payment_status = 'released'::job_payment_status,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(Some(transaction))
    }

    async fn get_stuck_disbursements(&self, limit: i64) -> Result<Vec<Transaction>, Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, job_id, bid_id, milestone_id, payer_id, payee_id,
                amount, fee_amount, currency, status, reference,
                chip_transaction_id, chip_send_instruction_id,
                escrow_released_at, disbursed_at, created_at, updated_at
            FROM transactions
            WHERE status = 'released'::transaction_status
            ORDER BY escrow_released_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn mark_disbursed(
        &self,
        transaction_id: Uuid,
        chip_send_instruction_id: String,
    ) -> Result<Option<Transaction>, Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = 'disbursed'::transaction_status,
                chip_send_instruction_id = $2,
                disbursed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'released'::transaction_status
            RETURNING id, job_id, bid_id, milestone_id, payer_id, payee_id,
                amount, fee_amount, currency, status, reference,
                chip_transaction_id, chip_send_instruction_id,
                escrow_released_at, disbursed_at, created_at, updated_at
            "#,
        )
        .bind(transaction_id)
        .bind(chip_send_instruction_id)
        .fetch_optional(&self.pool)
        .await
    }
}
