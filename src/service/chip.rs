// service/chip.rs
//
// CHIP gateway client. Collection goes through the Purchases API with the
// brand secret key; payouts go through the Send API, which signs every
// request with an epoch + HMAC-SHA512 checksum header pair.
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use thiserror::Error;

use crate::{config::Config, service::error::ServiceError};

#[derive(Error, Debug)]
pub enum ChipError {
    #[error("CHIP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CHIP API error ({status}): {body}")]
    Api { status: u16, body: String },
}

impl From<ChipError> for ServiceError {
    fn from(error: ChipError) -> Self {
        ServiceError::Gateway(error.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreatePurchaseRequest {
    pub client_email: String,
    pub client_full_name: String,
    pub product_name: String,
    pub amount_cents: i64,
    pub currency: String,
    pub reference: String,
    pub success_redirect: Option<String>,
    pub failure_redirect: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChipPurchase {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub checkout_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChipSendAccount {
    pub id: i64,
    #[serde(default)]
    pub balance: String,
    #[serde(default)]
    pub currency: String,
}

/// Send account listing. The release flow only needs the call to succeed,
/// but the typed fields keep the step log meaningful.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChipSendBalance {
    pub accounts: Vec<ChipSendAccount>,
}

#[derive(Debug, Clone)]
pub struct CreateBankAccountRequest {
    pub account_number: String,
    pub bank_code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChipBankAccount {
    pub id: i64,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct CreateSendInstructionRequest {
    pub bank_account_id: i64,
    pub amount_cents: i64,
    pub description: String,
    pub email: String,
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChipSendInstruction {
    pub id: i64,
    #[serde(default)]
    pub state: String,
}

/// The payment gateway surface the escrow flows depend on. A trait so the
/// payment service can be exercised against a scripted gateway in tests.
#[async_trait]
pub trait ChipApi: Send + Sync {
    async fn create_purchase(
        &self,
        request: CreatePurchaseRequest,
    ) -> Result<ChipPurchase, ChipError>;

    async fn get_purchase(&self, purchase_id: &str) -> Result<ChipPurchase, ChipError>;

    async fn send_balance(&self) -> Result<ChipSendBalance, ChipError>;

    async fn create_bank_account(
        &self,
        request: CreateBankAccountRequest,
    ) -> Result<ChipBankAccount, ChipError>;

    async fn create_send_instruction(
        &self,
        request: CreateSendInstructionRequest,
    ) -> Result<ChipSendInstruction, ChipError>;
}

type HmacSha512 = Hmac<Sha512>;

/// Send API request signature: hex-encoded HMAC-SHA512 of the epoch string
/// under the Send API secret.
fn send_checksum(epoch: &str, api_secret: &str) -> String {
    let mut mac =
        HmacSha512::new_from_slice(api_secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(epoch.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Debug, Clone)]
pub struct ChipClient {
    api_base_url: String,
    brand_id: String,
    secret_key: String,
    send_base_url: String,
    send_api_key: String,
    send_api_secret: String,
    client: reqwest::Client,
}

impl ChipClient {
    pub fn new(config: &Config) -> Self {
        Self {
            api_base_url: config.chip_api_base_url.clone(),
            brand_id: config.chip_brand_id.clone(),
            secret_key: config.chip_secret_key.clone(),
            send_base_url: config.chip_send_base_url.clone(),
            send_api_key: config.chip_send_api_key.clone(),
            send_api_secret: config.chip_send_api_secret.clone(),
            client: reqwest::Client::new(),
        }
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ChipError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChipError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ChipApi for ChipClient {
    // Create a hosted checkout the payer is redirected to.
    async fn create_purchase(
        &self,
        request: CreatePurchaseRequest,
    ) -> Result<ChipPurchase, ChipError> {
        let payload = serde_json::json!({
            "brand_id": self.brand_id,
            "client": {
                "email": request.client_email,
                "full_name": request.client_full_name,
            },
            "purchase": {
                "currency": request.currency,
                "products": [{
                    "name": request.product_name,
                    "price": request.amount_cents,
                }],
            },
            "reference": request.reference,
            "success_redirect": request.success_redirect,
            "failure_redirect": request.failure_redirect,
        });

        let response = self
            .client
            .post(format!("{}/purchases/", self.api_base_url))
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn get_purchase(&self, purchase_id: &str) -> Result<ChipPurchase, ChipError> {
        let response = self
            .client
            .get(format!("{}/purchases/{}/", self.api_base_url, purchase_id))
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn send_balance(&self) -> Result<ChipSendBalance, ChipError> {
        let epoch = Utc::now().timestamp().to_string();
        let checksum = send_checksum(&epoch, &self.send_api_secret);

        let response = self
            .client
            .get(format!("{}/send/accounts", self.send_base_url))
            .header("Authorization", format!("Bearer {}", self.send_api_key))
            .header("epoch", &epoch)
            .header("checksum", &checksum)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // Register the payee's bank destination before a send instruction can
    // target it.
    async fn create_bank_account(
        &self,
        request: CreateBankAccountRequest,
    ) -> Result<ChipBankAccount, ChipError> {
        let epoch = Utc::now().timestamp().to_string();
        let checksum = send_checksum(&epoch, &self.send_api_secret);

        let payload = serde_json::json!({
            "account_number": request.account_number,
            "bank_code": request.bank_code,
            "name": request.name,
        });

        let response = self
            .client
            .post(format!("{}/send/bank_accounts", self.send_base_url))
            .header("Authorization", format!("Bearer {}", self.send_api_key))
            .header("epoch", &epoch)
            .header("checksum", &checksum)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn create_send_instruction(
        &self,
        request: CreateSendInstructionRequest,
    ) -> Result<ChipSendInstruction, ChipError> {
        let epoch = Utc::now().timestamp().to_string();
        let checksum = send_checksum(&epoch, &self.send_api_secret);

        let payload = serde_json::json!({
            "bank_account_id": request.bank_account_id,
            "amount": request.amount_cents,
            "description": request.description,
            "email": request.email,
            "reference": request.reference,
        });

        let response = self
            .client
            .post(format!("{}/send/send_instructions", self.send_base_url))
            .header("Authorization", format!("Bearer {}", self.send_api_key))
            .header("epoch", &epoch)
            .header("checksum", &checksum)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        Self::parse_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_checksum_is_deterministic() {
        let a = send_checksum("1700000000", "send_secret");
        let b = send_checksum("1700000000", "send_secret");
        assert_eq!(a, b);
        // SHA-512 digest, hex encoded.
        assert_eq!(a.len(), 128);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_send_checksum_varies_with_epoch_and_key() {
        let base = send_checksum("1700000000", "send_secret");
        assert_ne!(base, send_checksum("1700000001", "send_secret"));
        assert_ne!(base, send_checksum("1700000000", "other_secret"));
    }

    #[test]
    fn test_purchase_response_deserializes() {
        let body = serde_json::json!({
            "id": "b1f2c9d0-5c4a-4f2e-9d8a-1a2b3c4d5e6f",
            "status": "created",
            "checkout_url": "https://gate.chip-in.asia/p/b1f2c9d0/",
            "brand_id": "ignored-extra-field"
        });

        let purchase: ChipPurchase = serde_json::from_value(body).unwrap();
        assert_eq!(purchase.status, "created");
        assert!(purchase.checkout_url.ends_with("/p/b1f2c9d0/"));
    }

    #[test]
    fn test_purchase_response_tolerates_missing_checkout_url() {
        let body = serde_json::json!({ "id": "abc123" });
        let purchase: ChipPurchase = serde_json::from_value(body).unwrap();
        assert_eq!(purchase.checkout_url, "");
        assert_eq!(purchase.status, "");
    }

    #[test]
    fn test_send_balance_deserializes_account_listing() {
        let body = serde_json::json!([
            { "id": 42, "balance": "1250.00", "currency": "MYR" },
            { "id": 43, "currency": "SGD" }
        ]);

        let balance: ChipSendBalance = serde_json::from_value(body).unwrap();
        assert_eq!(balance.accounts.len(), 2);
        assert_eq!(balance.accounts[0].balance, "1250.00");
        assert_eq!(balance.accounts[1].balance, "");
    }
}
