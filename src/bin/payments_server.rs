use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use noncepay::config::Config;
use noncepay::db::Database;
use noncepay::services::payments::FlatAmountPolicy;
use noncepay::{handlers, middleware, PaymentsState};

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

    tracing::info!("Starting payments server...");

    // Load configuration
    let config = Config::load()?;
    let config = Arc::new(config);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.payments.database_path).await?;
    db.run_payments_migrations().await?;
    tracing::info!("Database initialized");

    // Create app state
    let state = PaymentsState {
        db,
        amounts: Arc::new(FlatAmountPolicy::new(config.payments.claim_amount)),
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.payments.host, config.payments.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Payments server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: PaymentsState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/auth/signup", post(handlers::merchant::signup))
        .route("/api/auth/login", post(handlers::merchant::login))
        .route("/api/payments/create", post(handlers::payments::create))
        .route("/api/payments/:nonce", get(handlers::payments::get_by_nonce));

    // Protected routes (merchant auth required)
    let protected_routes = Router::new()
        .route("/api/auth/me", get(handlers::merchant::me))
        .route("/api/payments/claim", post(handlers::payments::claim))
        .route("/api/payments/balance", get(handlers::payments::balance))
        .route("/api/payments/claimed", get(handlers::payments::claimed))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::merchant_auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
