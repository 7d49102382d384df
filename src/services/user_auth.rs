use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, FieldError, Result};
use crate::models::{SessionRequest, SessionResponse, User, UserClaims, UserResponse};

pub const USER_TOKEN_TYPE: &str = "user";

/// Storefront user authentication and profile service
pub struct UserAuthService;

impl UserAuthService {
    /// Establish a session from a verified provider profile: reuse the user
    /// bound to the provider id or create one, then issue a bearer token.
    pub async fn session(
        db: &Database,
        config: &Config,
        req: SessionRequest,
    ) -> Result<SessionResponse> {
        let mut errors = Vec::new();
        if req.google_id.is_empty() {
            errors.push(FieldError::new("google_id", "Provider id is required"));
        }
        if req.email.is_empty() {
            errors.push(FieldError::new("email", "Email is required"));
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let existing: Option<User> = sqlx::query_as("SELECT * FROM users WHERE google_id = ?")
            .bind(&req.google_id)
            .fetch_optional(db.pool())
            .await?;

        let user = match existing {
            Some(user) => user,
            None => {
                let id = Uuid::new_v4().to_string();
                let now = Utc::now().to_rfc3339();
                sqlx::query(
                    r#"
                    INSERT INTO users (id, google_id, email, name, picture, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&id)
                .bind(&req.google_id)
                .bind(&req.email)
                .bind(&req.name)
                .bind(req.picture.as_deref())
                .bind(&now)
                .bind(&now)
                .execute(db.pool())
                .await?;

                sqlx::query_as("SELECT * FROM users WHERE id = ?")
                    .bind(&id)
                    .fetch_one(db.pool())
                    .await?
            }
        };

        let token = Self::generate_token(&user, config)?;

        Ok(SessionResponse {
            token,
            user: UserResponse::from(user),
        })
    }

    /// Fetch user profile
    pub async fn profile(db: &Database, user_id: &str) -> Result<UserResponse> {
        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        Ok(UserResponse::from(user))
    }

    /// Mark the user as having purchased
    pub async fn mark_purchased(db: &Database, user_id: &str) -> Result<UserResponse> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE users SET has_purchased = 1, purchased_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(user_id)
        .execute(db.pool())
        .await?;

        Self::profile(db, user_id).await
    }

    /// Clear the purchase state
    pub async fn reset_purchase(db: &Database, user_id: &str) -> Result<UserResponse> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE users SET has_purchased = 0, purchased_at = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(&now)
        .bind(user_id)
        .execute(db.pool())
        .await?;

        Self::profile(db, user_id).await
    }

    /// Generate a storefront user bearer token
    pub fn generate_token(user: &User, config: &Config) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(config.jwt.user_token_expire_hours as i64);

        let claims = UserClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            typ: USER_TOKEN_TYPE.to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt.user_secret.as_bytes()),
        )?;

        Ok(token)
    }

    /// Validate a storefront user token and extract claims
    pub fn validate_token(token: &str, config: &Config) -> Result<UserClaims> {
        let claims = decode::<UserClaims>(
            token,
            &DecodingKey::from_secret(config.jwt.user_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))?
        .claims;

        if claims.typ != USER_TOKEN_TYPE {
            return Err(AppError::Forbidden("User access required".to_string()));
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        let db = Database::new_in_memory().await.unwrap();
        db.run_demo_migrations().await.unwrap();
        db
    }

    fn profile_req(google_id: &str) -> SessionRequest {
        SessionRequest {
            google_id: google_id.to_string(),
            email: format!("{}@example.com", google_id),
            name: "Ada".to_string(),
            picture: None,
        }
    }

    #[tokio::test]
    async fn session_upserts_by_provider_id() {
        let db = test_db().await;
        let mut config = Config::default();
        config.jwt.user_secret = "user-secret".to_string();

        let first = UserAuthService::session(&db, &config, profile_req("g-1"))
            .await
            .unwrap();
        let second = UserAuthService::session(&db, &config, profile_req("g-1"))
            .await
            .unwrap();
        assert_eq!(first.user.id, second.user.id);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        let claims = UserAuthService::validate_token(&second.token, &config).unwrap();
        assert_eq!(claims.sub, first.user.id);
        assert_eq!(claims.typ, USER_TOKEN_TYPE);
    }

    #[tokio::test]
    async fn purchase_state_can_be_set_and_reset() {
        let db = test_db().await;
        let config = Config::default();

        let session = UserAuthService::session(&db, &config, profile_req("g-1"))
            .await
            .unwrap();
        assert!(!session.user.has_purchased);

        let purchased = UserAuthService::mark_purchased(&db, &session.user.id)
            .await
            .unwrap();
        assert!(purchased.has_purchased);
        assert!(purchased.purchased_at.is_some());

        let reset = UserAuthService::reset_purchase(&db, &session.user.id)
            .await
            .unwrap();
        assert!(!reset.has_purchased);
        assert!(reset.purchased_at.is_none());
    }
}
