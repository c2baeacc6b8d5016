// db/marketdb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::marketmodel::*;
use crate::utils::currency;

#[async_trait]
pub trait MarketExt {
    // Jobs
    async fn create_job(
        &self,
        owner_id: Uuid,
        title: String,
        description: String,
        budget: f64,
        currency: String,
        uses_milestones: bool,
    ) -> Result<Job, Error>;

    async fn get_job_by_id(&self, job_id: Uuid) -> Result<Option<Job>, Error>;

    async fn get_open_jobs(&self) -> Result<Vec<Job>, Error>;

    // Bids
    async fn create_bid(
        &self,
        job_id: Uuid,
        bidder_id: Uuid,
        amount: f64,
        message: String,
    ) -> Result<Bid, Error>;

    async fn get_bid_by_id(&self, bid_id: Uuid) -> Result<Option<Bid>, Error>;

    async fn get_bids_for_job(&self, job_id: Uuid) -> Result<Vec<Bid>, Error>;

    async fn get_bid_by_job_and_bidder(
        &self,
        job_id: Uuid,
        bidder_id: Uuid,
    ) -> Result<Option<Bid>, Error>;

    async fn get_accepted_bid(&self, job_id: Uuid) -> Result<Option<Bid>, Error>;

    async fn accept_bid(&self, job_id: Uuid, bid_id: Uuid) -> Result<Bid, Error>;

    // Milestones
    async fn create_milestone(
        &self,
        job_id: Uuid,
        title: String,
        amount: f64,
        order_index: i32,
    ) -> Result<Milestone, Error>;

    async fn get_milestone_by_id(&self, milestone_id: Uuid) -> Result<Option<Milestone>, Error>;

    async fn get_milestones_for_job(&self, job_id: Uuid) -> Result<Vec<Milestone>, Error>;

    // Work submissions
    async fn create_submission(
        &self,
        job_id: Uuid,
        bid_id: Uuid,
        note: String,
    ) -> Result<WorkSubmission, Error>;

    async fn get_submission_by_id(
        &self,
        submission_id: Uuid,
    ) -> Result<Option<WorkSubmission>, Error>;

    async fn get_submissions_for_job(&self, job_id: Uuid) -> Result<Vec<WorkSubmission>, Error>;

    async fn get_pending_submission(&self, job_id: Uuid) -> Result<Option<WorkSubmission>, Error>;

    async fn review_submission(
        &self,
        submission_id: Uuid,
        job_id: Uuid,
        status: SubmissionStatus,
        review_note: Option<String>,
    ) -> Result<WorkSubmission, Error>;
}

#[async_trait]
impl MarketExt for DBClient {
    async fn create_job(
        &self,
        owner_id: Uuid,
        title: String,
        description: String,
        budget: f64,
        currency: String,
        uses_milestones: bool,
    ) -> Result<Job, Error> {
        let budget_bd = currency::amount_from_f64(budget)
            .map_err(|_| Error::Decode("Invalid budget".into()))?;

        sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (owner_id, title, description, budget, currency, uses_milestones)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, owner_id, title, description, budget, currency,
                status, payment_status, uses_milestones, created_at, updated_at
            "#,
        )
        .bind(owner_id)
        .bind(title)
        .bind(description)
        .bind(budget_bd)
        .bind(currency)
        .bind(uses_milestones)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_job_by_id(&self, job_id: Uuid) -> Result<Option<Job>, Error> {
        sqlx::query_as::<_, Job>(
            r#"
            SELECT id, owner_id, title, description, budget, currency,
                status, payment_status, uses_milestones, created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_open_jobs(&self) -> Result<Vec<Job>, Error> {
        sqlx::query_as::<_, Job>(
            r#"
            SELECT id, owner_id, title, description, budget, currency,
                status, payment_status, uses_milestones, created_at, updated_at
            FROM jobs
            WHERE status IN ('open'::job_status, 'bidding'::job_status)
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn create_bid(
        &self,
        job_id: Uuid,
        bidder_id: Uuid,
        amount: f64,
        message: String,
    ) -> Result<Bid, Error> {
        let amount_bd = currency::amount_from_f64(amount)
            .map_err(|_| Error::Decode("Invalid bid amount".into()))?;

        let mut tx = self.pool.begin().await?;

        let bid = sqlx::query_as::<_, Bid>(
            r#"
            INSERT INTO bids (job_id, bidder_id, amount, message)
            VALUES ($1, $2, $3, $4)
            RETURNING id, job_id, bidder_id, amount, message, status, created_at
            "#,
        )
        .bind(job_id)
        .bind(bidder_id)
        .bind(amount_bd)
        .bind(message)
        .fetch_one(&mut *tx)
        .await?;

        // First bid moves the job out of 'open'
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'bidding'::job_status, updated_at = NOW()
            WHERE id = $1 AND status = 'open'::job_status
            "#,
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(bid)
    }

    async fn get_bid_by_id(&self, bid_id: Uuid) -> Result<Option<Bid>, Error> {
        sqlx::query_as::<_, Bid>(
            r#"
            SELECT id, job_id, bidder_id, amount, message, status, created_at
            FROM bids
            WHERE id = $1
            "#,
        )
        .bind(bid_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_bids_for_job(&self, job_id: Uuid) -> Result<Vec<Bid>, Error> {
        sqlx::query_as::<_, Bid>(
            r#"
            SELECT id, job_id, bidder_id, amount, message, status, created_at
            FROM bids
            WHERE job_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_bid_by_job_and_bidder(
        &self,
        job_id: Uuid,
        bidder_id: Uuid,
    ) -> Result<Option<Bid>, Error> {
        sqlx::query_as::<_, Bid>(
            r#"
            SELECT id, job_id, bidder_id, amount, message, status, created_at
            FROM bids
            WHERE job_id = $1 AND bidder_id = $2
            "#,
        )
        .bind(job_id)
        .bind(bidder_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_accepted_bid(&self, job_id: Uuid) -> Result<Option<Bid>, Error> {
        sqlx::query_as::<_, Bid>(
            r#"
            SELECT id, job_id, bidder_id, amount, message, status, created_at
            FROM bids
            WHERE job_id = $1 AND status = 'accepted'::bid_status
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn accept_bid(&self, job_id: Uuid, bid_id: Uuid) -> Result<Bid, Error> {
        let mut tx = self.pool.begin().await?;

        // Lock the job row so concurrent accepts serialize
        let _job = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE id = $1 AND status IN ('open'::job_status, 'bidding'::job_status)
            FOR UPDATE
            "#,
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(Error::RowNotFound)?;

        let accepted = sqlx::query_as::<_, Bid>(
            r#"
            UPDATE bids
            SET status = 'accepted'::bid_status
            WHERE id = $1 AND job_id = $2 AND status = 'pending'::bid_status
            RETURNING id, job_id, bidder_id, amount, message, status, created_at
            "#,
        )
        .bind(bid_id)
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(Error::RowNotFound)?;

        sqlx::query(
            r#"
            UPDATE bids
            SET status = 'rejected'::bid_status
            WHERE job_id = $1 AND id <> $2 AND status = 'pending'::bid_status
            "#,
        )
        .bind(job_id)
        .bind(bid_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'in_progress'::job_status, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(accepted)
    }

    async fn create_milestone(
        &self,
        job_id: Uuid,
        title: String,
        amount: f64,
        order_index: i32,
    ) -> Result<Milestone, Error> {
        let amount_bd = currency::amount_from_f64(amount)
            .map_err(|_| Error::Decode("Invalid milestone amount".into()))?;

        sqlx::query_as::<_, Milestone>(
            r#"
            INSERT INTO milestones (job_id, title, amount, order_index)
            VALUES ($1, $2, $3, $4)
            RETURNING id, job_id, title, amount, order_index, status, created_at
            "#,
        )
        .bind(job_id)
        .bind(title)
        .bind(amount_bd)
        .bind(order_index)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_milestone_by_id(&self, milestone_id: Uuid) -> Result<Option<Milestone>, Error> {
        sqlx::query_as::<_, Milestone>(
            r#"
            SELECT id, job_id, title, amount, order_index, status, created_at
            FROM milestones
            WHERE id = $1
            "#,
        )
        .bind(milestone_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_milestones_for_job(&self, job_id: Uuid) -> Result<Vec<Milestone>, Error> {
        sqlx::query_as::<_, Milestone>(
            r#"
            SELECT id, job_id, title, amount, order_index, status, created_at
            FROM milestones
            WHERE job_id = $1
            ORDER BY order_index ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn create_submission(
        &self,
        job_id: Uuid,
        bid_id: Uuid,
        note: String,
    ) -> Result<WorkSubmission, Error> {
        sqlx::query_as::<_, WorkSubmission>(
            r#"
            INSERT INTO work_submissions (job_id, bid_id, note)
            VALUES ($1, $2, $3)
            RETURNING id, job_id, bid_id, note, status, review_note, created_at, reviewed_at
            "#,
        )
        .bind(job_id)
        .bind(bid_id)
        .bind(note)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_submission_by_id(
        &self,
        submission_id: Uuid,
    ) -> Result<Option<WorkSubmission>, Error> {
        sqlx::query_as::<_, WorkSubmission>(
            r#"
            SELECT id, job_id, bid_id, note, status, review_note, created_at, reviewed_at
            FROM work_submissions
            WHERE id = $1
            "#,
        )
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_submissions_for_job(&self, job_id: Uuid) -> Result<Vec<WorkSubmission>, Error> {
        sqlx::query_as::<_, WorkSubmission>(
            r#"
            SELECT id, job_id, bid_id, note, status, review_note, created_at, reviewed_at
            FROM work_submissions
            WHERE job_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_pending_submission(&self, job_id: Uuid) -> Result<Option<WorkSubmission>, Error> {
        sqlx::query_as::<_, WorkSubmission>(
            r#"
            SELECT id, job_id, bid_id, note, status, review_note, created_at, reviewed_at
            FROM work_submissions
            WHERE job_id = $1 AND status = 'pending_review'::submission_status
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn review_submission(
        &self,
        submission_id: Uuid,
        job_id: Uuid,
        status: SubmissionStatus,
        review_note: Option<String>,
    ) -> Result<WorkSubmission, Error> {
        let mut tx = self.pool.begin().await?;

        let submission = sqlx::query_as::<_, WorkSubmission>(
            r#"
            UPDATE work_submissions
            SET status = $2, review_note = $3, reviewed_at = NOW()
            WHERE id = $1 AND status = 'pending_review'::submission_status
            RETURNING id, job_id, bid_id, note, status, review_note, created_at, reviewed_at
            "#,
        )
        .bind(submission_id)
        .bind(status)
        .bind(review_note)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(Error::RowNotFound)?;

        if status == SubmissionStatus::Approved {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'complete'::job_status, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(submission)
    }
}
