use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webauthn_rs::prelude::*;

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, FieldError, Result};
use crate::models::{Authenticator, WalletClaims, WalletUser};
use crate::services::ethereum;

pub const WALLET_TOKEN_TYPE: &str = "wallet";

/// Serialized ceremony state stored on the user row between start and finish
#[derive(Serialize, Deserialize)]
#[serde(tag = "flow", content = "state", rename_all = "snake_case")]
enum CeremonyState {
    Register(Box<PasskeyRegistration>),
    Authenticate(Box<PasskeyAuthentication>),
}

/// Passkey registration/login for the wallet service.
///
/// Usernames move no-record -> pending (row without the completed flag) ->
/// registered; a pending row whose ceremony fails is deleted so the
/// username stays registrable.
pub struct WalletPasskeyService;

impl WalletPasskeyService {
    fn webauthn_from_config(config: &Config) -> Result<Webauthn> {
        let rp_origin_raw = config.webauthn.rp_origin.trim();
        let rp_origin = url::Url::parse(rp_origin_raw).or_else(|_| {
            if rp_origin_raw.contains("://") {
                Err(url::ParseError::RelativeUrlWithoutBase)
            } else {
                url::Url::parse(&format!("http://{}", rp_origin_raw))
            }
        });
        let rp_origin = rp_origin.map_err(|_| {
            AppError::BadRequest(format!(
                "Invalid rp_origin: {} (expected like http://localhost:5004)",
                rp_origin_raw
            ))
        })?;
        let builder = WebauthnBuilder::new(&config.webauthn.rp_id, &rp_origin).map_err(|_| {
            AppError::BadRequest(format!(
                "Invalid WebAuthn config (rp_id={}, rp_origin={})",
                config.webauthn.rp_id, rp_origin
            ))
        })?;
        let builder = builder.rp_name(&config.webauthn.rp_name);
        let webauthn = builder
            .build()
            .map_err(|e| AppError::Internal(format!("WebAuthn build error: {:?}", e)))?;
        Ok(webauthn)
    }

    fn normalize_username(username: &str) -> Result<String> {
        let username = username.trim().to_lowercase();
        if username.len() < 3 {
            return Err(AppError::Validation(vec![FieldError::new(
                "username",
                "Username must be at least 3 characters long",
            )]));
        }
        Ok(username)
    }

    async fn find_by_username(db: &Database, username: &str) -> Result<Option<WalletUser>> {
        let user = sqlx::query_as("SELECT * FROM wallet_users WHERE username = ?")
            .bind(username)
            .fetch_optional(db.pool())
            .await?;
        Ok(user)
    }

    async fn store_challenge(db: &Database, user_id: &str, state: &CeremonyState) -> Result<()> {
        let state_json = serde_json::to_string(state)
            .map_err(|_| AppError::Internal("Serialize ceremony state failed".to_string()))?;
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE wallet_users SET current_challenge = ?, updated_at = ? WHERE id = ?")
            .bind(&state_json)
            .bind(&now)
            .bind(user_id)
            .execute(db.pool())
            .await?;
        Ok(())
    }

    /// Begin registration for a username. A completed username conflicts;
    /// a pending one is reused with a fresh challenge.
    pub async fn register_start(
        db: &Database,
        config: &Config,
        username: &str,
    ) -> Result<CreationChallengeResponse> {
        let username = Self::normalize_username(username)?;
        let webauthn = Self::webauthn_from_config(config)?;

        let existing = Self::find_by_username(db, &username).await?;
        if let Some(user) = &existing {
            if user.has_completed_registration {
                return Err(AppError::Conflict("User already exists".to_string()));
            }
        }

        let user = match existing {
            Some(user) => user,
            None => {
                let id = Uuid::new_v4().to_string();
                let now = Utc::now().to_rfc3339();
                sqlx::query(
                    r#"
                    INSERT INTO wallet_users (id, username, has_completed_registration, created_at, updated_at)
                    VALUES (?, ?, 0, ?, ?)
                    "#,
                )
                .bind(&id)
                .bind(&username)
                .bind(&now)
                .bind(&now)
                .execute(db.pool())
                .await
                .map_err(|e| AppError::or_conflict(e, "User already exists"))?;

                sqlx::query_as("SELECT * FROM wallet_users WHERE id = ?")
                    .bind(&id)
                    .fetch_one(db.pool())
                    .await?
            }
        };

        let uid = Uuid::parse_str(&user.id).unwrap_or_else(|_| Uuid::new_v4());
        let (ccr, reg_state) = webauthn
            .start_passkey_registration(uid, &user.username, &user.username, None)
            .map_err(|e| AppError::BadRequest(format!("start registration failed: {:?}", e)))?;

        Self::store_challenge(db, &user.id, &CeremonyState::Register(Box::new(reg_state))).await?;

        Ok(ccr)
    }

    /// Finish registration. On success the wallet is generated and the
    /// authenticator stored; on any failure a never-completed row is
    /// deleted so the username does not get stuck.
    pub async fn register_finish(
        db: &Database,
        config: &Config,
        username: &str,
        credential: RegisterPublicKeyCredential,
    ) -> Result<WalletUser> {
        let username = Self::normalize_username(username)?;
        let user = Self::find_by_username(db, &username)
            .await?
            .ok_or_else(|| AppError::BadRequest("User not found".to_string()))?;
        if user.has_completed_registration {
            return Err(AppError::Conflict("User already exists".to_string()));
        }

        match Self::try_finish_registration(db, config, &user, credential).await {
            Ok(user) => Ok(user),
            Err(err) => {
                let cleanup = sqlx::query(
                    "DELETE FROM wallet_users WHERE id = ? AND has_completed_registration = 0",
                )
                .bind(&user.id)
                .execute(db.pool())
                .await;
                if let Err(cleanup_err) = cleanup {
                    tracing::error!(
                        "Failed to clean up pending registration for {}: {:?}",
                        user.username,
                        cleanup_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn try_finish_registration(
        db: &Database,
        config: &Config,
        user: &WalletUser,
        credential: RegisterPublicKeyCredential,
    ) -> Result<WalletUser> {
        let challenge_json = user
            .current_challenge
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("No registration in progress".to_string()))?;
        let reg_state = match serde_json::from_str::<CeremonyState>(challenge_json) {
            Ok(CeremonyState::Register(state)) => *state,
            _ => return Err(AppError::BadRequest("Challenge flow mismatch".to_string())),
        };

        let webauthn = Self::webauthn_from_config(config)?;
        let passkey = webauthn
            .finish_passkey_registration(&credential, &reg_state)
            .map_err(|e| {
                tracing::warn!("Registration verification failed for {}: {:?}", user.username, e);
                AppError::BadRequest("Registration verification failed".to_string())
            })?;

        // Only after successful verification does the user get a wallet.
        let wallet = ethereum::generate_wallet();
        let cred_id = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(passkey.cred_id());
        let passkey_json = serde_json::to_string(&passkey)
            .map_err(|_| AppError::Internal("Serialize passkey failed".to_string()))?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO authenticators (id, user_id, credential_id, passkey_json, created_at, last_used_at)
            VALUES (?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user.id)
        .bind(&cred_id)
        .bind(&passkey_json)
        .bind(&now)
        .execute(db.pool())
        .await
        .map_err(|e| AppError::or_conflict(e, "Credential already registered"))?;

        sqlx::query(
            r#"
            UPDATE wallet_users
            SET has_completed_registration = 1,
                wallet_address = ?,
                wallet_private_key = ?,
                current_challenge = NULL,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&wallet.address)
        .bind(&wallet.private_key)
        .bind(&now)
        .bind(&user.id)
        .execute(db.pool())
        .await?;

        let updated: WalletUser = sqlx::query_as("SELECT * FROM wallet_users WHERE id = ?")
            .bind(&user.id)
            .fetch_one(db.pool())
            .await?;

        Ok(updated)
    }

    /// Begin authentication against a registered user's passkeys
    pub async fn login_start(
        db: &Database,
        config: &Config,
        username: &str,
    ) -> Result<RequestChallengeResponse> {
        let username = Self::normalize_username(username)?;
        let user = Self::find_by_username(db, &username)
            .await?
            .filter(|u| u.has_completed_registration)
            .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

        let creds: Vec<Authenticator> =
            sqlx::query_as("SELECT * FROM authenticators WHERE user_id = ?")
                .bind(&user.id)
                .fetch_all(db.pool())
                .await?;

        let mut passkeys: Vec<Passkey> = Vec::with_capacity(creds.len());
        for cred in &creds {
            let passkey: Passkey = serde_json::from_str(&cred.passkey_json)
                .map_err(|_| AppError::Internal("Deserialize passkey failed".to_string()))?;
            passkeys.push(passkey);
        }
        if passkeys.is_empty() {
            return Err(AppError::BadRequest("No passkeys registered".to_string()));
        }

        let webauthn = Self::webauthn_from_config(config)?;
        let (rcr, auth_state) = webauthn
            .start_passkey_authentication(&passkeys)
            .map_err(|e| AppError::BadRequest(format!("start authentication failed: {:?}", e)))?;

        Self::store_challenge(db, &user.id, &CeremonyState::Authenticate(Box::new(auth_state)))
            .await?;

        Ok(rcr)
    }

    /// Finish authentication: verify the assertion, persist the updated
    /// signature counter, stamp last_used_at.
    pub async fn login_finish(
        db: &Database,
        config: &Config,
        username: &str,
        credential: PublicKeyCredential,
    ) -> Result<WalletUser> {
        let username = Self::normalize_username(username)?;
        let user = Self::find_by_username(db, &username)
            .await?
            .filter(|u| u.has_completed_registration)
            .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

        let challenge_json = user
            .current_challenge
            .clone()
            .ok_or_else(|| AppError::BadRequest("No authentication in progress".to_string()))?;

        // The challenge is consumed by this attempt, pass or fail.
        sqlx::query("UPDATE wallet_users SET current_challenge = NULL WHERE id = ?")
            .bind(&user.id)
            .execute(db.pool())
            .await?;

        let auth_state = match serde_json::from_str::<CeremonyState>(&challenge_json) {
            Ok(CeremonyState::Authenticate(state)) => *state,
            _ => return Err(AppError::BadRequest("Challenge flow mismatch".to_string())),
        };

        let webauthn = Self::webauthn_from_config(config)?;
        let result = webauthn
            .finish_passkey_authentication(&credential, &auth_state)
            .map_err(|e| {
                tracing::warn!("Authentication verification failed for {}: {:?}", username, e);
                AppError::Unauthorized("Authentication verification failed".to_string())
            })?;

        let cred_id = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(result.cred_id());
        let mut stored: Authenticator =
            sqlx::query_as("SELECT * FROM authenticators WHERE credential_id = ? AND user_id = ?")
                .bind(&cred_id)
                .bind(&user.id)
                .fetch_optional(db.pool())
                .await?
                .ok_or_else(|| AppError::Unauthorized("Authenticator not found".to_string()))?;

        let mut passkey: Passkey = serde_json::from_str(&stored.passkey_json)
            .map_err(|_| AppError::Internal("Deserialize passkey failed".to_string()))?;
        if let Some(true) = passkey.update_credential(&result) {
            stored.passkey_json = serde_json::to_string(&passkey)
                .map_err(|_| AppError::Internal("Serialize passkey failed".to_string()))?;
            sqlx::query("UPDATE authenticators SET passkey_json = ? WHERE id = ?")
                .bind(&stored.passkey_json)
                .bind(&stored.id)
                .execute(db.pool())
                .await?;
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE authenticators SET last_used_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&stored.id)
            .execute(db.pool())
            .await?;

        Ok(user)
    }

    /// Fetch wallet user profile
    pub async fn profile(db: &Database, user_id: &str) -> Result<WalletUser> {
        let user: WalletUser = sqlx::query_as("SELECT * FROM wallet_users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        Ok(user)
    }

    /// Username availability for completed registrations
    pub async fn check_username(db: &Database, username: &str) -> Result<bool> {
        let username = Self::normalize_username(username)?;
        let existing: Option<WalletUser> = sqlx::query_as(
            "SELECT * FROM wallet_users WHERE username = ? AND has_completed_registration = 1",
        )
        .bind(&username)
        .fetch_optional(db.pool())
        .await?;
        Ok(existing.is_none())
    }

    /// Admin removal of a user and (via cascade) their authenticators
    pub async fn delete_user(db: &Database, username: &str) -> Result<()> {
        let username = Self::normalize_username(username)?;
        let affected = sqlx::query("DELETE FROM wallet_users WHERE username = ?")
            .bind(&username)
            .execute(db.pool())
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    /// Generate a wallet bearer token
    pub fn generate_token(user: &WalletUser, config: &Config) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(config.jwt.wallet_token_expire_hours as i64);

        let claims = WalletClaims {
            sub: user.id.clone(),
            username: user.username.clone(),
            typ: WALLET_TOKEN_TYPE.to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt.wallet_secret.as_bytes()),
        )?;

        Ok(token)
    }

    /// Validate a wallet token and extract claims
    pub fn validate_token(token: &str, config: &Config) -> Result<WalletClaims> {
        let claims = decode::<WalletClaims>(
            token,
            &DecodingKey::from_secret(config.jwt.wallet_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))?
        .claims;

        if claims.typ != WALLET_TOKEN_TYPE {
            return Err(AppError::Forbidden("Wallet access required".to_string()));
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        let db = Database::new_in_memory().await.unwrap();
        db.run_wallet_migrations().await.unwrap();
        db
    }

    /// Structurally valid credential that can never verify
    fn bogus_register_credential() -> RegisterPublicKeyCredential {
        serde_json::from_value(serde_json::json!({
            "id": "AAAA",
            "rawId": "AAAA",
            "response": {
                "attestationObject": "AAAA",
                "clientDataJSON": "AAAA"
            },
            "extensions": {},
            "type": "public-key"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn register_start_creates_pending_row_with_challenge() {
        let db = test_db().await;
        let config = Config::default();

        let ccr = WalletPasskeyService::register_start(&db, &config, "Alice")
            .await
            .unwrap();
        let challenge: &[u8] = ccr.public_key.challenge.as_ref();
        assert!(!challenge.is_empty());

        let user: WalletUser = sqlx::query_as("SELECT * FROM wallet_users WHERE username = 'alice'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert!(!user.has_completed_registration);
        assert!(user.current_challenge.is_some());
        assert!(user.wallet_address.is_none());
    }

    #[tokio::test]
    async fn register_start_rejects_short_usernames() {
        let db = test_db().await;
        let config = Config::default();

        let err = WalletPasskeyService::register_start(&db, &config, " ab ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn register_start_conflicts_for_completed_user() {
        let db = test_db().await;
        let config = Config::default();

        sqlx::query(
            "INSERT INTO wallet_users (id, username, has_completed_registration) VALUES ('u1', 'alice', 1)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let err = WalletPasskeyService::register_start(&db, &config, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn register_start_reuses_pending_row_on_retry() {
        let db = test_db().await;
        let config = Config::default();

        WalletPasskeyService::register_start(&db, &config, "alice")
            .await
            .unwrap();
        WalletPasskeyService::register_start(&db, &config, "alice")
            .await
            .unwrap();

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM wallet_users WHERE username = 'alice'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn failed_verification_rolls_back_pending_registration() {
        let db = test_db().await;
        let config = Config::default();

        WalletPasskeyService::register_start(&db, &config, "alice")
            .await
            .unwrap();

        let err = WalletPasskeyService::register_finish(
            &db,
            &config,
            "alice",
            bogus_register_credential(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        // The username must remain absent, hence registrable.
        let gone: Option<WalletUser> =
            sqlx::query_as("SELECT * FROM wallet_users WHERE username = 'alice'")
                .fetch_optional(db.pool())
                .await
                .unwrap();
        assert!(gone.is_none());

        let available = WalletPasskeyService::check_username(&db, "alice").await.unwrap();
        assert!(available);
    }

    #[tokio::test]
    async fn register_finish_without_start_is_rejected() {
        let db = test_db().await;
        let config = Config::default();

        let err = WalletPasskeyService::register_finish(
            &db,
            &config,
            "alice",
            bogus_register_credential(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn pending_user_cannot_begin_login() {
        let db = test_db().await;
        let config = Config::default();

        WalletPasskeyService::register_start(&db, &config, "alice")
            .await
            .unwrap();

        let err = WalletPasskeyService::login_start(&db, &config, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn login_start_rejects_unknown_user() {
        let db = test_db().await;
        let config = Config::default();

        let err = WalletPasskeyService::login_start(&db, &config, "nobody")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn check_username_only_counts_completed_registrations() {
        let db = test_db().await;
        let config = Config::default();

        assert!(WalletPasskeyService::check_username(&db, "alice").await.unwrap());

        WalletPasskeyService::register_start(&db, &config, "alice")
            .await
            .unwrap();
        assert!(WalletPasskeyService::check_username(&db, "alice").await.unwrap());

        sqlx::query("UPDATE wallet_users SET has_completed_registration = 1 WHERE username = 'alice'")
            .execute(db.pool())
            .await
            .unwrap();
        assert!(!WalletPasskeyService::check_username(&db, "alice").await.unwrap());
    }

    #[tokio::test]
    async fn wallet_token_roundtrip() {
        let db = test_db().await;
        let mut config = Config::default();
        config.jwt.wallet_secret = "wallet-secret".to_string();
        config.jwt.merchant_secret = "merchant-secret".to_string();

        sqlx::query(
            "INSERT INTO wallet_users (id, username, has_completed_registration) VALUES ('u1', 'alice', 1)",
        )
        .execute(db.pool())
        .await
        .unwrap();
        let user = WalletPasskeyService::profile(&db, "u1").await.unwrap();

        let token = WalletPasskeyService::generate_token(&user, &config).unwrap();
        let claims = WalletPasskeyService::validate_token(&token, &config).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.typ, WALLET_TOKEN_TYPE);

        // Rejected outside its token space.
        assert!(crate::services::MerchantAuthService::validate_token(&token, &config).is_err());
    }

    #[tokio::test]
    async fn delete_user_removes_row_or_reports_not_found() {
        let db = test_db().await;

        sqlx::query(
            "INSERT INTO wallet_users (id, username, has_completed_registration) VALUES ('u1', 'alice', 1)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        WalletPasskeyService::delete_user(&db, "alice").await.unwrap();
        let err = WalletPasskeyService::delete_user(&db, "alice").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
