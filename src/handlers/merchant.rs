use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};

use crate::error::{ApiResponse, Result};
use crate::models::{
    CurrentMerchant, MerchantAuthResponse, MerchantLoginRequest, MerchantResponse, SignupRequest,
};
use crate::services::MerchantAuthService;
use crate::PaymentsState;

/// Register a new merchant
/// POST /api/auth/signup
pub async fn signup(
    State(state): State<PaymentsState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse> {
    let auth = MerchantAuthService::signup(&state.db, &state.config, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            "Merchant created successfully",
            auth,
        )),
    ))
}

/// Merchant login
/// POST /api/auth/login
pub async fn login(
    State(state): State<PaymentsState>,
    Json(req): Json<MerchantLoginRequest>,
) -> Result<Json<ApiResponse<MerchantAuthResponse>>> {
    let auth = MerchantAuthService::login(&state.db, &state.config, req).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Login successful",
        auth,
    )))
}

/// Current merchant profile
/// GET /api/auth/me
pub async fn me(
    State(state): State<PaymentsState>,
    Extension(current_merchant): Extension<CurrentMerchant>,
) -> Result<Json<ApiResponse<MerchantResponse>>> {
    let merchant = MerchantAuthService::profile(&state.db, &current_merchant.id).await?;
    Ok(Json(ApiResponse::success(merchant)))
}
