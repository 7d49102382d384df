use chrono::Utc;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, FieldError, Result};
use crate::models::{
    BalanceResponse, ClaimedPage, ClaimedPaymentResponse, Pagination, PaymentRequest,
    PaymentRequestResponse, PaymentStatus,
};
use crate::services::ethereum;

/// Strategy deciding the amount credited when a merchant claims a request.
/// Real pricing plugs in here without touching the claim state machine.
pub trait AmountPolicy: Send + Sync {
    fn amount_for(&self, wallet_address: &str) -> f64;
}

/// Default policy: a flat configured amount for every claim
pub struct FlatAmountPolicy {
    amount: f64,
}

impl FlatAmountPolicy {
    pub fn new(amount: f64) -> Self {
        Self { amount }
    }
}

impl AmountPolicy for FlatAmountPolicy {
    fn amount_for(&self, _wallet_address: &str) -> f64 {
        self.amount
    }
}

/// Payment request store operations
pub struct PaymentService;

impl PaymentService {
    /// Create a payment request for a caller-supplied nonce. A fresh wallet
    /// is allocated per request; only public fields are returned.
    pub async fn create_request(db: &Database, nonce: &str) -> Result<PaymentRequestResponse> {
        if nonce.is_empty() {
            return Err(AppError::Validation(vec![FieldError::new(
                "nonce",
                "Nonce is required",
            )]));
        }

        let existing: Option<PaymentRequest> =
            sqlx::query_as("SELECT * FROM payment_requests WHERE nonce = ?")
                .bind(nonce)
                .fetch_optional(db.pool())
                .await?;

        if existing.is_some() {
            return Err(AppError::Conflict(
                "Payment request with this nonce already exists".to_string(),
            ));
        }

        let wallet = ethereum::generate_wallet();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        // The UNIQUE constraint decides the winner if two creates race past
        // the pre-check.
        sqlx::query(
            r#"
            INSERT INTO payment_requests
                (id, nonce, wallet_address, wallet_private_key, amount, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(nonce)
        .bind(&wallet.address)
        .bind(&wallet.private_key)
        .bind(PaymentStatus::Pending.as_str())
        .bind(&now)
        .bind(&now)
        .execute(db.pool())
        .await
        .map_err(|e| AppError::or_conflict(e, "Payment request with this nonce already exists"))?;

        let request: PaymentRequest = sqlx::query_as("SELECT * FROM payment_requests WHERE id = ?")
            .bind(&id)
            .fetch_one(db.pool())
            .await?;

        Ok(PaymentRequestResponse::from(request))
    }

    /// Claim a payment request for a merchant. First claim and re-claim by
    /// the same merchant both recompute the amount; a request claimed by a
    /// different merchant conflicts. Returns the updated record and whether
    /// this was a re-claim.
    pub async fn claim(
        db: &Database,
        policy: &dyn AmountPolicy,
        merchant_id: &str,
        nonce: &str,
    ) -> Result<(ClaimedPaymentResponse, bool)> {
        if nonce.is_empty() {
            return Err(AppError::Validation(vec![FieldError::new(
                "nonce",
                "Nonce is required",
            )]));
        }

        let request: PaymentRequest =
            sqlx::query_as("SELECT * FROM payment_requests WHERE nonce = ?")
                .bind(nonce)
                .fetch_optional(db.pool())
                .await?
                .ok_or_else(|| AppError::NotFound("Payment request not found".to_string()))?;

        let already_claimed = request.get_status() == PaymentStatus::Claimed;
        if already_claimed && request.merchant_id.as_deref() != Some(merchant_id) {
            return Err(AppError::Conflict(
                "Payment request already claimed by another merchant".to_string(),
            ));
        }

        let amount = policy.amount_for(&request.wallet_address);
        let now = Utc::now().to_rfc3339();

        // Guarded update: of two racing claims only one can flip the row out
        // of pending; the loser sees zero affected rows.
        let affected = sqlx::query(
            r#"
            UPDATE payment_requests
            SET status = ?, merchant_id = ?, amount = ?, updated_at = ?
            WHERE nonce = ? AND (status = ? OR merchant_id = ?)
            "#,
        )
        .bind(PaymentStatus::Claimed.as_str())
        .bind(merchant_id)
        .bind(amount)
        .bind(&now)
        .bind(nonce)
        .bind(PaymentStatus::Pending.as_str())
        .bind(merchant_id)
        .execute(db.pool())
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(AppError::Conflict(
                "Payment request already claimed by another merchant".to_string(),
            ));
        }

        let updated: PaymentRequest =
            sqlx::query_as("SELECT * FROM payment_requests WHERE nonce = ?")
                .bind(nonce)
                .fetch_one(db.pool())
                .await?;

        Ok((ClaimedPaymentResponse::from(updated), already_claimed))
    }

    /// Sum of claimed amounts for a merchant
    pub async fn balance(db: &Database, merchant_id: &str) -> Result<BalanceResponse> {
        let (total_balance, claimed_requests_count): (f64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0.0), COUNT(*)
            FROM payment_requests
            WHERE merchant_id = ? AND status = ?
            "#,
        )
        .bind(merchant_id)
        .bind(PaymentStatus::Claimed.as_str())
        .fetch_one(db.pool())
        .await?;

        Ok(BalanceResponse {
            merchant_id: merchant_id.to_string(),
            total_balance,
            claimed_requests_count,
        })
    }

    /// Claimed requests for a merchant, most recently updated first
    pub async fn claimed_page(
        db: &Database,
        merchant_id: &str,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<ClaimedPage> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(10).clamp(1, 100);
        let offset = (page - 1) * limit;

        let (total_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM payment_requests WHERE merchant_id = ? AND status = ?",
        )
        .bind(merchant_id)
        .bind(PaymentStatus::Claimed.as_str())
        .fetch_one(db.pool())
        .await?;

        let rows: Vec<PaymentRequest> = sqlx::query_as(
            r#"
            SELECT * FROM payment_requests
            WHERE merchant_id = ? AND status = ?
            ORDER BY updated_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(merchant_id)
        .bind(PaymentStatus::Claimed.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(db.pool())
        .await?;

        let total_pages = if total_count == 0 {
            0
        } else {
            (total_count + limit - 1) / limit
        };

        Ok(ClaimedPage {
            claimed_requests: rows.into_iter().map(ClaimedPaymentResponse::from).collect(),
            pagination: Pagination {
                page,
                limit,
                total_count,
                total_pages,
                has_next: page < total_pages,
                has_prev: page > 1,
            },
        })
    }

    /// Public lookup by nonce
    pub async fn get_by_nonce(db: &Database, nonce: &str) -> Result<PaymentRequestResponse> {
        let request: PaymentRequest =
            sqlx::query_as("SELECT * FROM payment_requests WHERE nonce = ?")
                .bind(nonce)
                .fetch_optional(db.pool())
                .await?
                .ok_or_else(|| AppError::NotFound("Payment request not found".to_string()))?;

        Ok(PaymentRequestResponse::from(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        let db = Database::new_in_memory().await.unwrap();
        db.run_payments_migrations().await.unwrap();
        db
    }

    async fn insert_merchant(db: &Database, id: &str, username: &str) {
        sqlx::query(
            "INSERT INTO merchants (id, username, password_hash, name) VALUES (?, ?, 'x', '')",
        )
        .bind(id)
        .bind(username)
        .execute(db.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn create_rejects_empty_nonce() {
        let db = test_db().await;
        let err = PaymentService::create_request(&db, "").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn create_allocates_wallet_and_hides_private_key() {
        let db = test_db().await;
        let created = PaymentService::create_request(&db, "abc123").await.unwrap();

        assert_eq!(created.nonce, "abc123");
        assert_eq!(created.status, "pending");
        assert_eq!(created.amount, 0.0);
        assert!(ethereum::is_valid_address(&created.wallet_address));

        // The stored row carries the key, the response type cannot.
        let (key,): (String,) =
            sqlx::query_as("SELECT wallet_private_key FROM payment_requests WHERE nonce = 'abc123'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert!(key.starts_with("0x"));
    }

    #[tokio::test]
    async fn duplicate_nonce_creates_exactly_once() {
        let db = test_db().await;
        PaymentService::create_request(&db, "abc123").await.unwrap();

        let err = PaymentService::create_request(&db, "abc123").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM payment_requests")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn claim_of_unknown_nonce_is_not_found() {
        let db = test_db().await;
        insert_merchant(&db, "m1", "alpha").await;

        let policy = FlatAmountPolicy::new(1.0);
        let err = PaymentService::claim(&db, &policy, "m1", "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn claim_reclaim_and_cross_merchant_conflict() {
        let db = test_db().await;
        insert_merchant(&db, "m1", "alpha").await;
        insert_merchant(&db, "m2", "beta").await;
        PaymentService::create_request(&db, "abc123").await.unwrap();

        // First claim by m1.
        let policy = FlatAmountPolicy::new(25.0);
        let (claimed, was_claimed) = PaymentService::claim(&db, &policy, "m1", "abc123")
            .await
            .unwrap();
        assert!(!was_claimed);
        assert_eq!(claimed.status, "claimed");
        assert_eq!(claimed.merchant_id.as_deref(), Some("m1"));
        assert_eq!(claimed.amount, 25.0);

        // Re-claim by the same merchant recomputes the amount, no error.
        let refresh = FlatAmountPolicy::new(40.0);
        let (reclaimed, was_claimed) = PaymentService::claim(&db, &refresh, "m1", "abc123")
            .await
            .unwrap();
        assert!(was_claimed);
        assert_eq!(reclaimed.status, "claimed");
        assert_eq!(reclaimed.amount, 40.0);

        // A different merchant always conflicts.
        let err = PaymentService::claim(&db, &policy, "m2", "abc123")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let (merchant_id,): (String,) =
            sqlx::query_as("SELECT merchant_id FROM payment_requests WHERE nonce = 'abc123'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(merchant_id, "m1");
    }

    #[tokio::test]
    async fn balance_sums_only_own_claimed_requests() {
        let db = test_db().await;
        insert_merchant(&db, "m1", "alpha").await;
        insert_merchant(&db, "m2", "beta").await;

        for nonce in ["n1", "n2", "n3"] {
            PaymentService::create_request(&db, nonce).await.unwrap();
        }
        let policy = FlatAmountPolicy::new(10.0);
        PaymentService::claim(&db, &policy, "m1", "n1").await.unwrap();
        PaymentService::claim(&db, &policy, "m1", "n2").await.unwrap();
        PaymentService::claim(&db, &policy, "m2", "n3").await.unwrap();

        let balance = PaymentService::balance(&db, "m1").await.unwrap();
        assert_eq!(balance.total_balance, 20.0);
        assert_eq!(balance.claimed_requests_count, 2);

        let empty = PaymentService::balance(&db, "nobody").await.unwrap();
        assert_eq!(empty.total_balance, 0.0);
        assert_eq!(empty.claimed_requests_count, 0);
    }

    #[tokio::test]
    async fn claimed_page_orders_and_paginates() {
        let db = test_db().await;
        insert_merchant(&db, "m1", "alpha").await;

        let policy = FlatAmountPolicy::new(1.0);
        for i in 0..5 {
            let nonce = format!("n{}", i);
            PaymentService::create_request(&db, &nonce).await.unwrap();
            // Distinct updated_at values so the ordering is deterministic.
            PaymentService::claim(&db, &policy, "m1", &nonce).await.unwrap();
            let stamp = format!("2026-01-01T00:00:0{}Z", i);
            sqlx::query("UPDATE payment_requests SET updated_at = ? WHERE nonce = ?")
                .bind(&stamp)
                .bind(&nonce)
                .execute(db.pool())
                .await
                .unwrap();
        }

        let page = PaymentService::claimed_page(&db, "m1", Some(1), Some(2))
            .await
            .unwrap();
        assert_eq!(page.claimed_requests.len(), 2);
        assert_eq!(page.claimed_requests[0].nonce, "n4");
        assert_eq!(page.claimed_requests[1].nonce, "n3");
        assert_eq!(page.pagination.total_count, 5);
        assert_eq!(page.pagination.total_pages, 3);
        assert!(page.pagination.has_next);
        assert!(!page.pagination.has_prev);

        let last = PaymentService::claimed_page(&db, "m1", Some(3), Some(2))
            .await
            .unwrap();
        assert_eq!(last.claimed_requests.len(), 1);
        assert_eq!(last.claimed_requests[0].nonce, "n0");
        assert!(!last.pagination.has_next);
        assert!(last.pagination.has_prev);
    }
}
