use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Wallet user row. A row with has_completed_registration = 0 is a pending
/// registration and must be deleted if its ceremony fails.
#[derive(Debug, Clone, FromRow)]
pub struct WalletUser {
    pub id: String,
    pub username: String,
    pub wallet_address: Option<String>,
    pub wallet_private_key: Option<String>,
    pub balance: f64,
    pub has_completed_registration: bool,
    pub current_challenge: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Wallet user profile (without the private key)
#[derive(Debug, Clone, Serialize)]
pub struct WalletUserResponse {
    pub id: String,
    pub username: String,
    pub wallet_address: Option<String>,
    pub balance: f64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<WalletUser> for WalletUserResponse {
    fn from(user: WalletUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
            wallet_address: user.wallet_address,
            balance: user.balance,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Authenticator row binding one WebAuthn credential to one user. The
/// serialized passkey carries the public key and signature counter.
#[derive(Debug, Clone, FromRow)]
pub struct Authenticator {
    pub id: String,
    pub user_id: String,
    pub credential_id: String,
    pub passkey_json: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

/// Session payload returned after a successful ceremony
#[derive(Debug, Serialize)]
pub struct WalletSessionUser {
    pub id: String,
    pub username: String,
    pub wallet_address: Option<String>,
    pub balance: f64,
}

#[derive(Debug, Serialize)]
pub struct WalletSessionResponse {
    pub token: String,
    pub user: WalletSessionUser,
}

/// Claims for the wallet token space
#[derive(Debug, Serialize, Deserialize)]
pub struct WalletClaims {
    pub sub: String, // wallet user id
    pub username: String,
    pub typ: String, // "wallet"
    pub exp: usize,
    pub iat: usize,
}

/// Current authenticated wallet user (extracted from JWT)
#[derive(Debug, Clone)]
pub struct CurrentWalletUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct UsernameAvailability {
    pub available: bool,
    pub message: String,
}
