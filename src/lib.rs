pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::services::payments::AmountPolicy;
use crate::services::payments_client::PaymentsApi;

/// State shared by the merchant-facing payments service handlers
#[derive(Clone)]
pub struct PaymentsState {
    pub db: Database,
    pub config: Arc<Config>,
    pub amounts: Arc<dyn AmountPolicy>,
}

/// State shared by the storefront demo backend handlers
#[derive(Clone)]
pub struct DemoState {
    pub db: Database,
    pub config: Arc<Config>,
    pub payments: Arc<dyn PaymentsApi>,
}

/// State shared by the passkey wallet service handlers
#[derive(Clone)]
pub struct WalletState {
    pub db: Database,
    pub config: Arc<Config>,
}
