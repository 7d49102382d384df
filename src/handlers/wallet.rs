use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use webauthn_rs::prelude::*;

use crate::error::{ApiResponse, AppError, Result};
use crate::models::{
    CurrentWalletUser, UsernameAvailability, WalletSessionResponse, WalletSessionUser,
    WalletUserResponse,
};
use crate::services::WalletPasskeyService;
use crate::WalletState;

#[derive(Debug, Deserialize)]
pub struct RegisterStartRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterFinishRequest {
    pub username: String,
    pub credential: RegisterPublicKeyCredential,
}

#[derive(Debug, Deserialize)]
pub struct LoginStartRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginFinishRequest {
    pub username: String,
    pub credential: PublicKeyCredential,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub amount: f64,
    pub to_address: String,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub txn: String,
    pub is_success: bool,
}

/// Start WebAuthn registration
/// POST /api/users/register/start
pub async fn register_start(
    State(state): State<WalletState>,
    Json(req): Json<RegisterStartRequest>,
) -> Result<Json<ApiResponse<CreationChallengeResponse>>> {
    let options =
        WalletPasskeyService::register_start(&state.db, &state.config, &req.username).await?;
    Ok(Json(ApiResponse::success(options)))
}

/// Complete WebAuthn registration: wallet issued only after verification
/// POST /api/users/register/finish
pub async fn register_finish(
    State(state): State<WalletState>,
    Json(req): Json<RegisterFinishRequest>,
) -> Result<Json<ApiResponse<WalletSessionResponse>>> {
    let user = WalletPasskeyService::register_finish(
        &state.db,
        &state.config,
        &req.username,
        req.credential,
    )
    .await?;

    let token = WalletPasskeyService::generate_token(&user, &state.config)?;

    Ok(Json(ApiResponse::success(WalletSessionResponse {
        token,
        user: WalletSessionUser {
            id: user.id,
            username: user.username,
            wallet_address: user.wallet_address,
            balance: user.balance,
        },
    })))
}

/// Start WebAuthn authentication
/// POST /api/users/login/start
pub async fn login_start(
    State(state): State<WalletState>,
    Json(req): Json<LoginStartRequest>,
) -> Result<Json<ApiResponse<RequestChallengeResponse>>> {
    let options = WalletPasskeyService::login_start(&state.db, &state.config, &req.username).await?;
    Ok(Json(ApiResponse::success(options)))
}

/// Complete WebAuthn authentication
/// POST /api/users/login/finish
pub async fn login_finish(
    State(state): State<WalletState>,
    Json(req): Json<LoginFinishRequest>,
) -> Result<Json<ApiResponse<WalletSessionResponse>>> {
    let user =
        WalletPasskeyService::login_finish(&state.db, &state.config, &req.username, req.credential)
            .await?;

    let token = WalletPasskeyService::generate_token(&user, &state.config)?;

    Ok(Json(ApiResponse::success(WalletSessionResponse {
        token,
        user: WalletSessionUser {
            id: user.id,
            username: user.username,
            wallet_address: user.wallet_address,
            balance: user.balance,
        },
    })))
}

/// Current wallet user profile
/// GET /api/users/profile
pub async fn profile(
    State(state): State<WalletState>,
    Extension(current_user): Extension<CurrentWalletUser>,
) -> Result<Json<ApiResponse<WalletUserResponse>>> {
    let user = WalletPasskeyService::profile(&state.db, &current_user.id).await?;
    Ok(Json(ApiResponse::success(WalletUserResponse::from(user))))
}

/// Username availability check
/// GET /api/users/check-username/:username
pub async fn check_username(
    State(state): State<WalletState>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<UsernameAvailability>>> {
    let available = WalletPasskeyService::check_username(&state.db, &username).await?;
    let message = if available {
        "Username is available"
    } else {
        "Username is already taken"
    };
    Ok(Json(ApiResponse::success(UsernameAvailability {
        available,
        message: message.to_string(),
    })))
}

/// Stubbed transfer; no chain interaction yet
/// POST /api/users/transfer
pub async fn transfer(
    State(state): State<WalletState>,
    Extension(current_user): Extension<CurrentWalletUser>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<ApiResponse<TransferResponse>>> {
    if req.username.is_empty() || req.username == current_user.username {
        return Err(AppError::BadRequest("Invalid username".to_string()));
    }

    let user = WalletPasskeyService::profile(&state.db, &current_user.id).await?;
    tracing::info!(
        "Transfer of {} from {:?} to {} requested",
        req.amount,
        user.wallet_address,
        req.to_address
    );

    // TODO: check balance and submit the transaction once an RPC endpoint
    // is wired in; until then the demo reports a fixed txn id.
    Ok(Json(ApiResponse::success(TransferResponse {
        txn: "0x123".to_string(),
        is_success: true,
    })))
}

/// Admin: delete a user by username
/// DELETE /api/users/:username
pub async fn delete_user(
    State(state): State<WalletState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    let provided = headers
        .get("x-admin-key")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("No admin key provided".to_string()))?;

    let expected = state
        .config
        .wallet
        .admin_key
        .as_deref()
        .ok_or_else(|| AppError::Forbidden("Admin access is not configured".to_string()))?;

    if provided != expected {
        return Err(AppError::Unauthorized("Invalid admin key".to_string()));
    }

    WalletPasskeyService::delete_user(&state.db, &username).await?;
    Ok(Json(ApiResponse::<()>::success_message(
        "User deleted successfully",
    )))
}
