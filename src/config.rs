use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration shared by all three services
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub payments: PaymentsServerConfig,
    #[serde(default)]
    pub demo: DemoServerConfig,
    #[serde(default)]
    pub wallet: WalletServerConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub webauthn: WebAuthnConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_payments_port")]
    pub port: u16,
    #[serde(default = "default_payments_db_path")]
    pub database_path: String,
    /// Flat amount credited on claim until real pricing exists
    #[serde(default)]
    pub claim_amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemoServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_demo_port")]
    pub port: u16,
    #[serde(default = "default_demo_db_path")]
    pub database_path: String,
    /// Minimum claimed amount required to complete a purchase
    #[serde(default)]
    pub min_price: f64,
    #[serde(default = "default_payments_base_url")]
    pub payments_base_url: String,
    #[serde(default = "default_payments_timeout_secs")]
    pub payments_timeout_secs: u64,
    #[serde(default = "default_merchant_username")]
    pub merchant_username: String,
    #[serde(default = "default_merchant_password")]
    pub merchant_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_wallet_port")]
    pub port: u16,
    #[serde(default = "default_wallet_db_path")]
    pub database_path: String,
    /// Fixed key expected in the x-admin-key header for admin endpoints
    #[serde(default)]
    pub admin_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    #[serde(default)]
    pub merchant_secret: String,
    #[serde(default)]
    pub user_secret: String,
    #[serde(default)]
    pub wallet_secret: String,
    #[serde(default = "default_merchant_token_expire")]
    pub merchant_token_expire_hours: u64,
    #[serde(default = "default_user_token_expire")]
    pub user_token_expire_hours: u64,
    #[serde(default = "default_wallet_token_expire")]
    pub wallet_token_expire_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebAuthnConfig {
    #[serde(default = "default_rp_id")]
    pub rp_id: String,
    #[serde(default = "default_rp_name")]
    pub rp_name: String,
    #[serde(default = "default_rp_origin")]
    pub rp_origin: String,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_payments_port() -> u16 {
    5001
}

fn default_demo_port() -> u16 {
    3001
}

fn default_wallet_port() -> u16 {
    5003
}

fn default_payments_db_path() -> String {
    "data/payments.db".to_string()
}

fn default_demo_db_path() -> String {
    "data/demo.db".to_string()
}

fn default_wallet_db_path() -> String {
    "data/wallet.db".to_string()
}

fn default_payments_base_url() -> String {
    "http://localhost:5001".to_string()
}

fn default_payments_timeout_secs() -> u64 {
    10
}

fn default_merchant_username() -> String {
    "demo_merchant".to_string()
}

fn default_merchant_password() -> String {
    "demo-merchant-password".to_string()
}

fn default_merchant_token_expire() -> u64 {
    168 // 7 days
}

fn default_user_token_expire() -> u64 {
    24
}

fn default_wallet_token_expire() -> u64 {
    24
}

fn default_rp_id() -> String {
    "localhost".to_string()
}

fn default_rp_name() -> String {
    "NoncePay Wallet".to_string()
}

fn default_rp_origin() -> String {
    "http://localhost:5004".to_string()
}

impl Default for PaymentsServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_payments_port(),
            database_path: default_payments_db_path(),
            claim_amount: 0.0,
        }
    }
}

impl Default for DemoServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_demo_port(),
            database_path: default_demo_db_path(),
            min_price: 0.0,
            payments_base_url: default_payments_base_url(),
            payments_timeout_secs: default_payments_timeout_secs(),
            merchant_username: default_merchant_username(),
            merchant_password: default_merchant_password(),
        }
    }
}

impl Default for WalletServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_wallet_port(),
            database_path: default_wallet_db_path(),
            admin_key: None,
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            merchant_secret: String::new(),
            user_secret: String::new(),
            wallet_secret: String::new(),
            merchant_token_expire_hours: default_merchant_token_expire(),
            user_token_expire_hours: default_user_token_expire(),
            wallet_token_expire_hours: default_wallet_token_expire(),
        }
    }
}

impl Default for WebAuthnConfig {
    fn default() -> Self {
        Self {
            rp_id: default_rp_id(),
            rp_name: default_rp_name(),
            rp_origin: default_rp_origin(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            payments: PaymentsServerConfig::default(),
            demo: DemoServerConfig::default(),
            wallet: WalletServerConfig::default(),
            jwt: JwtConfig::default(),
            webauthn: WebAuthnConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        config.ensure_jwt_secrets()?;
        config.ensure_webauthn_defaults();
        tracing::info!(
            "WebAuthn config: rp_id={}, rp_origin={}, rp_name={}",
            config.webauthn.rp_id,
            config.webauthn.rp_origin,
            config.webauthn.rp_name
        );
        Ok(config)
    }

    /// Load configuration from config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["config.toml", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Ensure each token space has a persisted secret
    fn ensure_jwt_secrets(&mut self) -> anyhow::Result<()> {
        self.jwt.merchant_secret =
            Self::ensure_secret(&self.jwt.merchant_secret, "data/.jwt_secret_merchant")?;
        self.jwt.user_secret = Self::ensure_secret(&self.jwt.user_secret, "data/.jwt_secret_user")?;
        self.jwt.wallet_secret =
            Self::ensure_secret(&self.jwt.wallet_secret, "data/.jwt_secret_wallet")?;
        Ok(())
    }

    fn ensure_secret(current: &str, path: &str) -> anyhow::Result<String> {
        if !current.is_empty() {
            return Ok(current.to_string());
        }

        let secret_path = Path::new(path);
        if secret_path.exists() {
            let secret = fs::read_to_string(secret_path)?;
            tracing::info!("Loaded persisted JWT secret from {}", path);
            return Ok(secret.trim().to_string());
        }

        let secret = uuid::Uuid::new_v4().to_string();
        if let Some(parent) = secret_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(secret_path, &secret)?;
        tracing::info!("Generated and persisted new JWT secret to {}", path);
        Ok(secret)
    }

    /// Apply environment variable overrides
    /// Format: NP_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        // Payments server overrides
        if let Ok(val) = env::var("NP_CONF_PAYMENTS_HOST") {
            self.payments.host = val;
        }
        if let Ok(val) = env::var("NP_CONF_PAYMENTS_PORT") {
            if let Ok(port) = val.parse() {
                self.payments.port = port;
            }
        }
        if let Ok(val) = env::var("NP_CONF_PAYMENTS_DATABASE_PATH") {
            self.payments.database_path = val;
        }
        if let Ok(val) = env::var("NP_CONF_PAYMENTS_CLAIM_AMOUNT") {
            if let Ok(amount) = val.parse() {
                self.payments.claim_amount = amount;
            }
        }

        // Demo server overrides
        if let Ok(val) = env::var("NP_CONF_DEMO_HOST") {
            self.demo.host = val;
        }
        if let Ok(val) = env::var("NP_CONF_DEMO_PORT") {
            if let Ok(port) = val.parse() {
                self.demo.port = port;
            }
        }
        if let Ok(val) = env::var("NP_CONF_DEMO_DATABASE_PATH") {
            self.demo.database_path = val;
        }
        if let Ok(val) = env::var("NP_CONF_DEMO_MIN_PRICE") {
            if let Ok(price) = val.parse() {
                self.demo.min_price = price;
            }
        }
        if let Ok(val) = env::var("NP_CONF_DEMO_PAYMENTS_BASE_URL") {
            self.demo.payments_base_url = val;
        }
        if let Ok(val) = env::var("NP_CONF_DEMO_MERCHANT_USERNAME") {
            self.demo.merchant_username = val;
        }
        if let Ok(val) = env::var("NP_CONF_DEMO_MERCHANT_PASSWORD") {
            self.demo.merchant_password = val;
        }

        // Wallet server overrides
        if let Ok(val) = env::var("NP_CONF_WALLET_HOST") {
            self.wallet.host = val;
        }
        if let Ok(val) = env::var("NP_CONF_WALLET_PORT") {
            if let Ok(port) = val.parse() {
                self.wallet.port = port;
            }
        }
        if let Ok(val) = env::var("NP_CONF_WALLET_DATABASE_PATH") {
            self.wallet.database_path = val;
        }
        if let Ok(val) = env::var("NP_CONF_WALLET_ADMIN_KEY") {
            if !val.trim().is_empty() {
                self.wallet.admin_key = Some(val);
            }
        }

        // JWT overrides
        if let Ok(val) = env::var("NP_CONF_JWT_MERCHANT_SECRET") {
            self.jwt.merchant_secret = val;
        }
        if let Ok(val) = env::var("NP_CONF_JWT_USER_SECRET") {
            self.jwt.user_secret = val;
        }
        if let Ok(val) = env::var("NP_CONF_JWT_WALLET_SECRET") {
            self.jwt.wallet_secret = val;
        }

        // WebAuthn overrides
        if let Ok(val) = env::var("NP_CONF_WEBAUTHN_RP_ID") {
            if !val.trim().is_empty() {
                self.webauthn.rp_id = val;
            }
        }
        if let Ok(val) = env::var("NP_CONF_WEBAUTHN_RP_NAME") {
            if !val.trim().is_empty() {
                self.webauthn.rp_name = val;
            }
        }
        if let Ok(val) = env::var("NP_CONF_WEBAUTHN_RP_ORIGIN") {
            if !val.trim().is_empty() {
                self.webauthn.rp_origin = val;
            }
        }
    }

    fn ensure_webauthn_defaults(&mut self) {
        if self.webauthn.rp_id.trim().is_empty() {
            self.webauthn.rp_id = default_rp_id();
        }
        if self.webauthn.rp_name.trim().is_empty() {
            self.webauthn.rp_name = default_rp_name();
        }
        if self.webauthn.rp_origin.trim().is_empty() {
            self.webauthn.rp_origin = default_rp_origin();
        }
    }

    /// Ensure database directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        for path in [
            &self.payments.database_path,
            &self.demo.database_path,
            &self.wallet.database_path,
        ] {
            if let Some(parent) = Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
