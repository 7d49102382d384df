use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use uuid::Uuid;

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, FieldError, Result};
use crate::models::{
    Merchant, MerchantAuthResponse, MerchantClaims, MerchantLoginRequest, MerchantResponse,
    SignupRequest,
};

pub const MERCHANT_TOKEN_TYPE: &str = "merchant";

/// Merchant authentication service
pub struct MerchantAuthService;

impl MerchantAuthService {
    /// Register a new merchant
    pub async fn signup(
        db: &Database,
        config: &Config,
        req: SignupRequest,
    ) -> Result<MerchantAuthResponse> {
        Self::validate_signup(&req)?;

        let existing: Option<Merchant> =
            sqlx::query_as("SELECT * FROM merchants WHERE username = ?")
                .bind(&req.username)
                .fetch_optional(db.pool())
                .await?;

        if existing.is_some() {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }

        if let Some(email) = req.email.as_deref() {
            let existing_email: Option<Merchant> =
                sqlx::query_as("SELECT * FROM merchants WHERE email = ?")
                    .bind(email)
                    .fetch_optional(db.pool())
                    .await?;

            if existing_email.is_some() {
                return Err(AppError::Conflict("Email already exists".to_string()));
            }
        }

        let password_hash = Self::hash_password(&req.password)?;

        let merchant_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO merchants (id, username, password_hash, email, name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&merchant_id)
        .bind(&req.username)
        .bind(&password_hash)
        .bind(req.email.as_deref())
        .bind(req.name.as_deref().unwrap_or(""))
        .bind(&now)
        .bind(&now)
        .execute(db.pool())
        .await
        .map_err(|e| AppError::or_conflict(e, "Username already exists"))?;

        let merchant: Merchant = sqlx::query_as("SELECT * FROM merchants WHERE id = ?")
            .bind(&merchant_id)
            .fetch_one(db.pool())
            .await?;

        let token = Self::generate_token(&merchant, config)?;

        Ok(MerchantAuthResponse {
            merchant: MerchantResponse::from(merchant),
            token,
        })
    }

    /// Login merchant
    pub async fn login(
        db: &Database,
        config: &Config,
        req: MerchantLoginRequest,
    ) -> Result<MerchantAuthResponse> {
        if req.username.is_empty() || req.password.is_empty() {
            return Err(AppError::Unauthorized("Invalid credentials".to_string()));
        }

        let merchant: Merchant = sqlx::query_as("SELECT * FROM merchants WHERE username = ?")
            .bind(&req.username)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

        if !merchant.is_active {
            return Err(AppError::Forbidden("Account is deactivated".to_string()));
        }

        if !Self::verify_password(&req.password, &merchant.password_hash)? {
            return Err(AppError::Unauthorized("Invalid credentials".to_string()));
        }

        let token = Self::generate_token(&merchant, config)?;

        Ok(MerchantAuthResponse {
            merchant: MerchantResponse::from(merchant),
            token,
        })
    }

    /// Fetch merchant profile
    pub async fn profile(db: &Database, merchant_id: &str) -> Result<MerchantResponse> {
        let merchant: Merchant = sqlx::query_as("SELECT * FROM merchants WHERE id = ?")
            .bind(merchant_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Merchant not found".to_string()))?;

        Ok(MerchantResponse::from(merchant))
    }

    /// Generate a merchant bearer token
    pub fn generate_token(merchant: &Merchant, config: &Config) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(config.jwt.merchant_token_expire_hours as i64);

        let claims = MerchantClaims {
            sub: merchant.id.clone(),
            username: merchant.username.clone(),
            typ: MERCHANT_TOKEN_TYPE.to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt.merchant_secret.as_bytes()),
        )?;

        Ok(token)
    }

    /// Validate a merchant token and extract claims. Tokens signed for another
    /// principal type carry a different typ and are rejected with Forbidden.
    pub fn validate_token(token: &str, config: &Config) -> Result<MerchantClaims> {
        let claims = decode::<MerchantClaims>(
            token,
            &DecodingKey::from_secret(config.jwt.merchant_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?
        .claims;

        if claims.typ != MERCHANT_TOKEN_TYPE {
            return Err(AppError::Forbidden("Merchant access required".to_string()));
        }

        Ok(claims)
    }

    fn validate_signup(req: &SignupRequest) -> Result<()> {
        let mut errors = Vec::new();

        if req.username.len() < 3 || req.username.len() > 50 {
            errors.push(FieldError::new(
                "username",
                "Username must be between 3 and 50 characters",
            ));
        } else if !req
            .username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            errors.push(FieldError::new(
                "username",
                "Username must contain only letters, numbers, and underscores",
            ));
        }

        if req.password.len() < 8 {
            errors.push(FieldError::new(
                "password",
                "Password must be at least 8 characters long",
            ));
        }

        if let Some(email) = req.email.as_deref() {
            if !email.contains('@') {
                errors.push(FieldError::new("email", "Invalid email format"));
            }
        }

        if let Some(name) = req.name.as_deref() {
            if name.is_empty() || name.len() > 100 {
                errors.push(FieldError::new(
                    "name",
                    "Name must be between 1 and 100 characters",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }

    /// Hash password using Argon2
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?
            .to_string();

        Ok(password_hash)
    }

    /// Verify password against hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::UserAuthService;

    async fn test_db() -> Database {
        let db = Database::new_in_memory().await.unwrap();
        db.run_payments_migrations().await.unwrap();
        db
    }

    fn signup_request(username: &str) -> SignupRequest {
        SignupRequest {
            username: username.to_string(),
            password: "correct-horse".to_string(),
            email: None,
            name: Some("Shop".to_string()),
        }
    }

    #[tokio::test]
    async fn signup_rejects_malformed_input_with_field_details() {
        let db = test_db().await;
        let config = Config::default();

        let req = SignupRequest {
            username: "a!".to_string(),
            password: "short".to_string(),
            email: Some("not-an-email".to_string()),
            name: None,
        };

        let err = MerchantAuthService::signup(&db, &config, req)
            .await
            .unwrap_err();
        match err {
            AppError::Validation(fields) => {
                let named: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
                assert!(named.contains(&"username"));
                assert!(named.contains(&"password"));
                assert!(named.contains(&"email"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let db = test_db().await;
        let config = Config::default();

        MerchantAuthService::signup(&db, &config, signup_request("acme"))
            .await
            .unwrap();
        let err = MerchantAuthService::signup(&db, &config, signup_request("acme"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_verifies_credentials() {
        let db = test_db().await;
        let config = Config::default();

        MerchantAuthService::signup(&db, &config, signup_request("acme"))
            .await
            .unwrap();

        let ok = MerchantAuthService::login(
            &db,
            &config,
            MerchantLoginRequest {
                username: "acme".to_string(),
                password: "correct-horse".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(ok.merchant.username, "acme");

        let err = MerchantAuthService::login(
            &db,
            &config,
            MerchantLoginRequest {
                username: "acme".to_string(),
                password: "wrong".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn deactivated_merchant_cannot_login() {
        let db = test_db().await;
        let config = Config::default();

        MerchantAuthService::signup(&db, &config, signup_request("acme"))
            .await
            .unwrap();
        sqlx::query("UPDATE merchants SET is_active = 0 WHERE username = 'acme'")
            .execute(db.pool())
            .await
            .unwrap();

        let err = MerchantAuthService::login(
            &db,
            &config,
            MerchantLoginRequest {
                username: "acme".to_string(),
                password: "correct-horse".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn token_roundtrip_and_space_separation() {
        let db = test_db().await;
        let mut config = Config::default();
        config.jwt.merchant_secret = "merchant-secret".to_string();
        config.jwt.user_secret = "user-secret".to_string();

        let auth = MerchantAuthService::signup(&db, &config, signup_request("acme"))
            .await
            .unwrap();

        let claims = MerchantAuthService::validate_token(&auth.token, &config).unwrap();
        assert_eq!(claims.username, "acme");
        assert_eq!(claims.typ, MERCHANT_TOKEN_TYPE);

        // A merchant token must not pass as a storefront user token.
        assert!(UserAuthService::validate_token(&auth.token, &config).is_err());
        assert!(MerchantAuthService::validate_token("garbage", &config).is_err());
    }
}
