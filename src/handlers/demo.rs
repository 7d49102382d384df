use axum::{extract::State, response::IntoResponse, Extension, Json};

use crate::error::{ApiResponse, Result};
use crate::models::{
    ClaimResponse, CurrentUser, SessionRequest, SessionResponse, UserClaimRequest, UserResponse,
};
use crate::services::{ClaimService, UserAuthService};
use crate::DemoState;

/// Establish a session from a verified provider profile
/// POST /api/auth/session
pub async fn session(
    State(state): State<DemoState>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<ApiResponse<SessionResponse>>> {
    let session = UserAuthService::session(&state.db, &state.config, req).await?;
    Ok(Json(ApiResponse::success(session)))
}

/// Consume a nonce and complete the purchase
/// POST /api/claim
pub async fn claim(
    State(state): State<DemoState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<UserClaimRequest>,
) -> Result<Json<ApiResponse<ClaimResponse>>> {
    let outcome = ClaimService::complete_purchase(
        &state.db,
        &state.config,
        state.payments.as_ref(),
        &current_user.id,
        &req.nonce,
    )
    .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Payment completed successfully",
        outcome,
    )))
}

/// Current user profile
/// GET /api/user
pub async fn get_user(
    State(state): State<DemoState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    let user = UserAuthService::profile(&state.db, &current_user.id).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// Mark the purchase directly (demo shortcut)
/// POST /api/purchase
pub async fn purchase(
    State(state): State<DemoState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    let user = UserAuthService::mark_purchased(&state.db, &current_user.id).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Purchase recorded successfully",
        user,
    )))
}

/// Clear the purchase state
/// POST /api/reset
pub async fn reset(
    State(state): State<DemoState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    let user = UserAuthService::reset_purchase(&state.db, &current_user.id).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Purchase state reset",
        user,
    )))
}

/// Stateless logout acknowledgment
/// GET /api/logout
pub async fn logout() -> impl IntoResponse {
    Json(ApiResponse::<()>::success_message("Logged out successfully"))
}
