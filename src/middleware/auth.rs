use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::models::{CurrentMerchant, CurrentUser, CurrentWalletUser};
use crate::services::{MerchantAuthService, UserAuthService, WalletPasskeyService};
use crate::{DemoState, PaymentsState, WalletState};

fn bearer_token(request: &Request) -> Result<&str, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    match auth_header {
        Some(header) if header.starts_with("Bearer ") => Ok(&header[7..]),
        _ => Err(AppError::Unauthorized(
            "Missing or invalid Authorization header".to_string(),
        )),
    }
}

/// Merchant authentication middleware (payments service)
pub async fn merchant_auth_middleware(
    State(state): State<PaymentsState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)?;
    let claims = MerchantAuthService::validate_token(token, &state.config)?;

    let (is_active,): (bool,) = sqlx::query_as("SELECT is_active FROM merchants WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(state.db.pool())
        .await
        .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))?
        .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))?;

    if !is_active {
        return Err(AppError::Forbidden("Account is deactivated".to_string()));
    }

    request.extensions_mut().insert(CurrentMerchant {
        id: claims.sub,
        username: claims.username,
    });

    Ok(next.run(request).await)
}

/// Storefront user authentication middleware (demo service)
pub async fn user_auth_middleware(
    State(state): State<DemoState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)?;
    let claims = UserAuthService::validate_token(token, &state.config)?;

    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(state.db.pool())
        .await
        .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))?;
    if exists.is_none() {
        return Err(AppError::Unauthorized("Invalid token".to_string()));
    }

    request.extensions_mut().insert(CurrentUser {
        id: claims.sub,
        email: claims.email,
    });

    Ok(next.run(request).await)
}

/// Wallet user authentication middleware (wallet service)
pub async fn wallet_auth_middleware(
    State(state): State<WalletState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)?;
    let claims = WalletPasskeyService::validate_token(token, &state.config)?;

    let exists: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM wallet_users WHERE id = ? AND has_completed_registration = 1",
    )
    .bind(&claims.sub)
    .fetch_optional(state.db.pool())
    .await
    .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))?;
    if exists.is_none() {
        return Err(AppError::Unauthorized("Invalid token".to_string()));
    }

    request.extensions_mut().insert(CurrentWalletUser {
        id: claims.sub,
        username: claims.username,
    });

    Ok(next.run(request).await)
}
