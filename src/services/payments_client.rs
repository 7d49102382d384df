use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{AppError, Result};

/// The subset of a claimed payment request the storefront backend needs
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimedPayment {
    pub nonce: String,
    pub amount: f64,
    pub status: String,
    pub merchant_id: Option<String>,
}

/// Typed client for the merchant-facing payments service. The end-user claim
/// handler talks to this trait, never to raw HTTP.
#[async_trait]
pub trait PaymentsApi: Send + Sync {
    /// Service-to-service merchant login; returns a bearer token
    async fn merchant_login(&self, username: &str, password: &str) -> Result<String>;

    /// Claim a payment request with a merchant token
    async fn claim_payment(&self, token: &str, nonce: &str) -> Result<ClaimedPayment>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[allow(dead_code)]
    code: i32,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

/// reqwest-backed implementation with a fixed request timeout
pub struct HttpPaymentsClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpPaymentsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PaymentsApi for HttpPaymentsClient {
    async fn merchant_login(&self, username: &str, password: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/api/auth/login", self.base_url))
            .json(&serde_json::json!({
                "username": username,
                "password": password,
            }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Payments server login request failed: {:?}", e);
                AppError::Internal("Failed to authenticate with payment server".to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!("Payments server login failed: {}", response.status());
            return Err(AppError::Internal(
                "Failed to authenticate with payment server".to_string(),
            ));
        }

        let body: Envelope<LoginData> = response.json().await.map_err(|_| {
            AppError::Internal("Failed to authenticate with payment server".to_string())
        })?;

        body.data.map(|d| d.token).ok_or_else(|| {
            AppError::Internal("Failed to authenticate with payment server".to_string())
        })
    }

    async fn claim_payment(&self, token: &str, nonce: &str) -> Result<ClaimedPayment> {
        let response = self
            .http
            .post(format!("{}/api/payments/claim", self.base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({ "nonce": nonce }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Payments server claim request failed: {:?}", e);
                AppError::Internal("Payment server claim failed".to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            let body: Envelope<ClaimedPayment> = response
                .json()
                .await
                .map_err(|_| AppError::Internal("Payment server claim failed".to_string()))?;
            return body
                .data
                .ok_or_else(|| AppError::Internal("Payment server claim failed".to_string()));
        }

        // Upstream 404/409 keep their meaning across the trust boundary;
        // anything else is an internal failure of the claim unit.
        let message = response
            .json::<Envelope<serde_json::Value>>()
            .await
            .map(|e| e.message)
            .unwrap_or_else(|_| "Payment server claim failed".to_string());

        match status.as_u16() {
            404 => Err(AppError::NotFound(message)),
            409 => Err(AppError::Conflict(message)),
            _ => {
                tracing::error!("Payments server claim failed: {} {}", status, message);
                Err(AppError::Internal("Payment server claim failed".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> HttpPaymentsClient {
        HttpPaymentsClient::new(&server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn merchant_login_extracts_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_partial_json(json!({"username": "demo_merchant"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "success",
                "data": {"merchant": {"id": "m1", "username": "demo_merchant"}, "token": "tok-1"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let token = client
            .merchant_login("demo_merchant", "pw")
            .await
            .unwrap();
        assert_eq!(token, "tok-1");
    }

    #[tokio::test]
    async fn merchant_login_failure_is_internal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": 401,
                "message": "Invalid credentials"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.merchant_login("demo_merchant", "pw").await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn claim_parses_claimed_payment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/payments/claim"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "Payment request claimed successfully",
                "data": {
                    "id": "p1",
                    "nonce": "abc123",
                    "wallet_address": "0x0000000000000000000000000000000000000001",
                    "amount": 12.5,
                    "status": "claimed",
                    "merchant_id": "m1",
                    "created_at": "2026-01-01T00:00:00Z",
                    "updated_at": "2026-01-01T00:00:01Z"
                }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let claimed = client.claim_payment("tok-1", "abc123").await.unwrap();
        assert_eq!(claimed.nonce, "abc123");
        assert_eq!(claimed.amount, 12.5);
        assert_eq!(claimed.status, "claimed");
    }

    #[tokio::test]
    async fn claim_maps_upstream_conflict_and_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/payments/claim"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": 409,
                "message": "Payment request already claimed by another merchant"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.claim_payment("tok-1", "abc123").await.unwrap_err();
        match err {
            AppError::Conflict(msg) => {
                assert_eq!(msg, "Payment request already claimed by another merchant")
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        server.reset().await;
        Mock::given(method("POST"))
            .and(path("/api/payments/claim"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": 404,
                "message": "Payment request not found"
            })))
            .mount(&server)
            .await;

        let err = client.claim_payment("tok-1", "abc123").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn claim_maps_unexpected_upstream_errors_to_internal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/payments/claim"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.claim_payment("tok-1", "abc123").await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
