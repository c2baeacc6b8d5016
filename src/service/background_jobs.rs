// service/background_jobs.rs
use chrono::Utc;
use std::sync::Arc;
use tokio::time::{interval, Duration};

use crate::{db::paymentdb::PaymentExt, AppState};

/// Start background job that retries payouts for transactions whose escrow
/// left the platform but whose CHIP send instruction was never confirmed.
pub async fn start_disbursement_retry_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(3600)); // Run every hour

    loop {
        interval.tick().await;

        tracing::info!("Running disbursement retry job at {}", Utc::now());

        let stuck = match app_state.db_client.get_stuck_disbursements(50).await {
            Ok(stuck) => stuck,
            Err(e) => {
                tracing::error!("Failed to fetch unconfirmed disbursements: {}", e);
                continue;
            }
        };

        if stuck.is_empty() {
            continue;
        }

        tracing::info!("Retrying {} unconfirmed disbursements", stuck.len());

        let mut confirmed = 0usize;
        for transaction in &stuck {
            match app_state
                .payment_service
                .retry_disbursement(transaction)
                .await
            {
                Ok(Some(_)) => confirmed += 1,
                Ok(None) => {}
                Err(e) => tracing::error!(
                    "Disbursement retry errored for transaction {}: {}",
                    transaction.id,
                    e
                ),
            }
        }

        tracing::info!(
            "Disbursement retry job completed: {}/{} confirmed",
            confirmed,
            stuck.len()
        );
    }
}
