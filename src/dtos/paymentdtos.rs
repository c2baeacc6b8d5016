use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// The chip-payment endpoints accept camelCase bodies (frontend contract)
// and answer in snake_case like the rest of the API.

#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequestDto {
    pub job_id: Uuid,

    pub bid_id: Uuid,

    pub milestone_id: Option<Uuid>,

    #[validate(range(min = 0.01, message = "Amount must be positive"))]
    pub amount: f64,

    #[validate(length(min = 3, max = 3, message = "Currency must be a 3-letter code"))]
    pub currency: String,

    #[validate(length(min = 1, max = 100, message = "Buyer name is required"))]
    pub buyer_name: String,

    #[validate(
        length(min = 1, message = "Buyer email is required"),
        email(message = "Buyer email is invalid")
    )]
    pub buyer_email: String,

    pub payee_id: Uuid,

    #[validate(length(min = 4, max = 128, message = "Reference must be between 4 and 128 characters"))]
    pub reference: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePaymentResponseDto {
    pub payment_url: String,
    pub transaction_id: Uuid,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckPaymentStatusRequestDto {
    #[validate(length(min = 1, message = "Chip transaction id is required"))]
    pub chip_transaction_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckPaymentStatusResponseDto {
    pub payment_status: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReleasePaymentRequestDto {
    pub transaction_id: Uuid,

    pub job_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReleasePaymentResponseDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_instruction_id: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}
