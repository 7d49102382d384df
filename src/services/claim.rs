use chrono::Utc;

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{ClaimResponse, User};
use crate::services::payments_client::PaymentsApi;
use crate::services::user_auth::UserAuthService;

/// End-user purchase completion: consume a nonce exactly once per end user.
pub struct ClaimService;

impl ClaimService {
    /// Complete a purchase for an authenticated end user.
    ///
    /// The consumed_nonces insert is the durable commit point; nothing before
    /// it mutates purchase state, and a lost race on the nonce primary key
    /// surfaces as Conflict without marking the user as purchased.
    pub async fn complete_purchase(
        db: &Database,
        config: &Config,
        payments: &dyn PaymentsApi,
        user_id: &str,
        nonce: &str,
    ) -> Result<ClaimResponse> {
        if nonce.is_empty() {
            return Err(AppError::BadRequest("Nonce is required".to_string()));
        }

        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::Unauthorized("User not authenticated".to_string()))?;

        let consumed: Option<(String,)> =
            sqlx::query_as("SELECT nonce FROM consumed_nonces WHERE nonce = ?")
                .bind(nonce)
                .fetch_optional(db.pool())
                .await?;
        if consumed.is_some() {
            return Err(AppError::Conflict("Nonce already consumed".to_string()));
        }

        // Login + claim against the payments server form one unit; the token
        // is stateless, so a failed claim just discards it.
        let token = payments
            .merchant_login(&config.demo.merchant_username, &config.demo.merchant_password)
            .await?;
        let claimed = payments.claim_payment(&token, nonce).await?;

        if claimed.amount < config.demo.min_price {
            return Err(AppError::BadRequest(format!(
                "Insufficient payment amount: required {}, received {}",
                config.demo.min_price, claimed.amount
            )));
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO consumed_nonces (nonce, user_id, amount, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(nonce)
        .bind(&user.id)
        .bind(claimed.amount)
        .bind(&now)
        .execute(db.pool())
        .await
        .map_err(|e| AppError::or_conflict(e, "Nonce already consumed"))?;

        let updated = UserAuthService::mark_purchased(db, &user.id).await?;

        Ok(ClaimResponse {
            amount: claimed.amount,
            user: updated,
        })
    }
}
