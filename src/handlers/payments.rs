use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};

use crate::error::{ApiResponse, Result};
use crate::models::{
    BalanceResponse, ClaimPaymentRequest, ClaimedPage, ClaimedPaymentResponse,
    CreatePaymentRequest, CurrentMerchant, PageQuery, PaymentRequestResponse,
};
use crate::services::PaymentService;
use crate::PaymentsState;

/// Create a payment request (public)
/// POST /api/payments/create
pub async fn create(
    State(state): State<PaymentsState>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse> {
    let payment = PaymentService::create_request(&state.db, &req.nonce).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            "Payment request created successfully",
            payment,
        )),
    ))
}

/// Claim a payment request (merchant only)
/// POST /api/payments/claim
pub async fn claim(
    State(state): State<PaymentsState>,
    Extension(current_merchant): Extension<CurrentMerchant>,
    Json(req): Json<ClaimPaymentRequest>,
) -> Result<Json<ApiResponse<ClaimedPaymentResponse>>> {
    let (payment, was_claimed) = PaymentService::claim(
        &state.db,
        state.amounts.as_ref(),
        &current_merchant.id,
        &req.nonce,
    )
    .await?;

    let message = if was_claimed {
        "Payment request amount updated successfully"
    } else {
        "Payment request claimed successfully"
    };

    Ok(Json(ApiResponse::success_with_message(message, payment)))
}

/// Merchant balance over claimed requests
/// GET /api/payments/balance
pub async fn balance(
    State(state): State<PaymentsState>,
    Extension(current_merchant): Extension<CurrentMerchant>,
) -> Result<Json<ApiResponse<BalanceResponse>>> {
    let balance = PaymentService::balance(&state.db, &current_merchant.id).await?;
    Ok(Json(ApiResponse::success(balance)))
}

/// Claimed requests, paginated, most recently updated first
/// GET /api/payments/claimed
pub async fn claimed(
    State(state): State<PaymentsState>,
    Extension(current_merchant): Extension<CurrentMerchant>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<ClaimedPage>>> {
    let page = PaymentService::claimed_page(&state.db, &current_merchant.id, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// Public lookup by nonce
/// GET /api/payments/:nonce
pub async fn get_by_nonce(
    State(state): State<PaymentsState>,
    Path(nonce): Path<String>,
) -> Result<Json<ApiResponse<PaymentRequestResponse>>> {
    let payment = PaymentService::get_by_nonce(&state.db, &nonce).await?;
    Ok(Json(ApiResponse::success(payment)))
}
