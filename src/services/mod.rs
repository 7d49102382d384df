pub mod claim;
pub mod ethereum;
pub mod merchant_auth;
pub mod passkey;
pub mod payments;
pub mod payments_client;
pub mod user_auth;

pub use claim::ClaimService;
pub use merchant_auth::MerchantAuthService;
pub use passkey::WalletPasskeyService;
pub use payments::PaymentService;
pub use payments_client::HttpPaymentsClient;
pub use user_auth::UserAuthService;
