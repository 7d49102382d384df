use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Payment request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Claimed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Claimed => "claimed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "claimed" => PaymentStatus::Claimed,
            _ => PaymentStatus::Pending,
        }
    }
}

/// Payment request row
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRequest {
    pub id: String,
    pub nonce: String,
    pub wallet_address: String,
    pub wallet_private_key: String,
    pub amount: f64,
    pub status: String,
    pub merchant_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl PaymentRequest {
    pub fn get_status(&self) -> PaymentStatus {
        PaymentStatus::from_str(&self.status)
    }
}

/// Public view of a payment request. The private key never leaves the service.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequestResponse {
    pub id: String,
    pub nonce: String,
    pub wallet_address: String,
    pub amount: f64,
    pub status: String,
    pub created_at: String,
}

impl From<PaymentRequest> for PaymentRequestResponse {
    fn from(req: PaymentRequest) -> Self {
        Self {
            id: req.id,
            nonce: req.nonce,
            wallet_address: req.wallet_address,
            amount: req.amount,
            status: req.status,
            created_at: req.created_at,
        }
    }
}

/// Merchant view of a claimed payment request
#[derive(Debug, Clone, Serialize)]
pub struct ClaimedPaymentResponse {
    pub id: String,
    pub nonce: String,
    pub wallet_address: String,
    pub amount: f64,
    pub status: String,
    pub merchant_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PaymentRequest> for ClaimedPaymentResponse {
    fn from(req: PaymentRequest) -> Self {
        Self {
            id: req.id,
            nonce: req.nonce,
            wallet_address: req.wallet_address,
            amount: req.amount,
            status: req.status,
            merchant_id: req.merchant_id,
            created_at: req.created_at,
            updated_at: req.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub nonce: String,
}

#[derive(Debug, Deserialize)]
pub struct ClaimPaymentRequest {
    pub nonce: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub merchant_id: String,
    pub total_balance: f64,
    pub claimed_requests_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total_count: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Serialize)]
pub struct ClaimedPage {
    pub claimed_requests: Vec<ClaimedPaymentResponse>,
    pub pagination: Pagination,
}
