// handler/users.rs
use std::sync::Arc;

use axum::{
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use validator::Validate;

use crate::{
    db::userdb::UserExt,
    dtos::userdtos::{FilterUserDto, UpdateBankAccountDto, UserData, UserResponseDto},
    error::HttpError,
    middleware::main_middleware::JWTAuthMiddleware,
    AppState,
};

pub fn users_handler() -> Router {
    Router::new()
        .route("/me", get(get_me))
        .route("/bank-account", put(update_bank_account))
}

pub async fn get_me(
    Extension(_app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let filtered_user = FilterUserDto::filter_user(&user.user);

    let response_data = UserResponseDto {
        status: "success".to_string(),
        data: UserData {
            user: filtered_user,
        },
    };

    Ok(Json(response_data))
}

/// Workers register the bank destination their escrow releases are paid to.
pub async fn update_bank_account(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddleware>,
    Json(body): Json<UpdateBankAccountDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let result = app_state
        .db_client
        .update_bank_account(
            user.user.id,
            body.bank_account_name,
            body.bank_account_number,
            body.bank_code,
        )
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let filtered_user = FilterUserDto::filter_user(&result);

    let response = UserResponseDto {
        data: UserData {
            user: filtered_user,
        },
        status: "success".to_string(),
    };

    Ok(Json(response))
}
