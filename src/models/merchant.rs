use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Merchant row
#[derive(Debug, Clone, FromRow)]
pub struct Merchant {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub name: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Merchant response (without the password hash)
#[derive(Debug, Clone, Serialize)]
pub struct MerchantResponse {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub name: String,
    pub is_active: bool,
    pub created_at: String,
}

impl From<Merchant> for MerchantResponse {
    fn from(merchant: Merchant) -> Self {
        Self {
            id: merchant.id,
            username: merchant.username,
            email: merchant.email,
            name: merchant.name,
            is_active: merchant.is_active,
            created_at: merchant.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MerchantLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct MerchantAuthResponse {
    pub merchant: MerchantResponse,
    pub token: String,
}

/// Claims for the merchant token space
#[derive(Debug, Serialize, Deserialize)]
pub struct MerchantClaims {
    pub sub: String, // merchant id
    pub username: String,
    pub typ: String, // "merchant"
    pub exp: usize,
    pub iat: usize,
}

/// Current authenticated merchant (extracted from JWT)
#[derive(Debug, Clone)]
pub struct CurrentMerchant {
    pub id: String,
    pub username: String,
}
