use std::sync::Arc;

use axum::{response::IntoResponse, routing::post, Extension, Json, Router};
use validator::Validate;

use crate::{
    dtos::paymentdtos::{
        CheckPaymentStatusRequestDto, CheckPaymentStatusResponseDto, CreatePaymentRequestDto,
        CreatePaymentResponseDto, ReleasePaymentRequestDto, ReleasePaymentResponseDto,
    },
    error::HttpError,
    middleware::main_middleware::JWTAuthMiddleware,
    models::marketmodel::TransactionStatus,
    AppState,
};

pub fn chip_payment_handler() -> Router {
    Router::new()
        .route("/create-payment", post(create_payment))
        .route("/check-payment-status", post(check_payment_status))
        .route("/release-payment", post(release_payment))
}

/// Opens an escrow charge: creates a CHIP purchase and records the pending
/// transaction, returning the hosted checkout URL the buyer is redirected to.
pub async fn create_payment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Json(body): Json<CreatePaymentRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state
        .payment_service
        .create_charge(
            auth.user.id,
            body.job_id,
            body.bid_id,
            body.milestone_id,
            body.amount,
            body.currency,
            body.buyer_name,
            body.buyer_email,
            body.payee_id,
            body.reference,
        )
        .await?;

    Ok(Json(CreatePaymentResponseDto {
        payment_url: outcome.checkout_url,
        transaction_id: outcome.transaction.id,
    }))
}

/// Polls CHIP for the purchase status and settles the local transaction
/// accordingly. Safe to call repeatedly; a settled transaction is returned
/// as-is without another gateway round trip.
pub async fn check_payment_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<CheckPaymentStatusRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let status = app_state
        .payment_service
        .check_status(&body.chip_transaction_id)
        .await?;

    Ok(Json(CheckPaymentStatusResponseDto {
        payment_status: status.to_str().to_string(),
    }))
}

/// Releases escrowed funds to the worker. The disbursement is attempted
/// immediately; if the payout leg fails the release still stands and the
/// response carries a warning while the retry job finishes the transfer.
pub async fn release_payment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Json(body): Json<ReleasePaymentRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state
        .payment_service
        .release_funds(auth.user.id, body.transaction_id, body.job_id)
        .await?;

    let status = outcome
        .transaction
        .status
        .unwrap_or(TransactionStatus::Released);

    Ok(Json(ReleasePaymentResponseDto {
        send_instruction_id: outcome.send_instruction_id,
        status: status.to_str().to_string(),
        warning: outcome.warning,
    }))
}
