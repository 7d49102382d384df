use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use noncepay::config::Config;
use noncepay::db::Database;
use noncepay::{handlers, middleware, WalletState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "noncepay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting wallet server...");

    // Load configuration
    let config = Config::load()?;
    let config = Arc::new(config);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.wallet.database_path).await?;
    db.run_wallet_migrations().await?;
    tracing::info!("Database initialized");

    // Create app state
    let state = WalletState {
        db,
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.wallet.host, config.wallet.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Wallet server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: WalletState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (ceremonies and availability checks)
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/users/register/start", post(handlers::wallet::register_start))
        .route("/api/users/register/finish", post(handlers::wallet::register_finish))
        .route("/api/users/login/start", post(handlers::wallet::login_start))
        .route("/api/users/login/finish", post(handlers::wallet::login_finish))
        .route(
            "/api/users/check-username/:username",
            get(handlers::wallet::check_username),
        )
        // Admin-key protected, not bearer protected
        .route("/api/users/:username", delete(handlers::wallet::delete_user));

    // Protected routes (wallet auth required)
    let protected_routes = Router::new()
        .route("/api/users/profile", get(handlers::wallet::profile))
        .route("/api/users/transfer", post(handlers::wallet::transfer))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::wallet_auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
