use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Storefront user row
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub google_id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub has_purchased: bool,
    pub purchased_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// User response (never exposes the provider id)
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub has_purchased: bool,
    pub purchased_at: Option<String>,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            picture: user.picture,
            has_purchased: user.has_purchased,
            purchased_at: user.purchased_at,
            created_at: user.created_at,
        }
    }
}

/// Post-OAuth session handoff: the verified profile the provider callback
/// produced. The provider dance itself happens upstream.
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub google_id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct UserClaimRequest {
    pub nonce: String,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub amount: f64,
    pub user: UserResponse,
}

/// Claims for the storefront user token space
#[derive(Debug, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String, // user id
    pub email: String,
    pub typ: String, // "user"
    pub exp: usize,
    pub iat: usize,
}

/// Current authenticated storefront user (extracted from JWT)
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
}
