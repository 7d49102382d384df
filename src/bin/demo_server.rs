use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use noncepay::config::Config;
use noncepay::db::Database;
use noncepay::services::HttpPaymentsClient;
use noncepay::{handlers, middleware, DemoState};

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

    tracing::info!("Starting demo storefront backend...");

    // Load configuration
    let config = Config::load()?;
    let config = Arc::new(config);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.demo.database_path).await?;
    db.run_demo_migrations().await?;
    tracing::info!("Database initialized");

    // Typed client for the payments server trust boundary
    let payments = HttpPaymentsClient::new(
        &config.demo.payments_base_url,
        Duration::from_secs(config.demo.payments_timeout_secs),
    )?;

    // Create app state
    let state = DemoState {
        db,
        payments: Arc::new(payments),
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.demo.host, config.demo.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Demo backend listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: DemoState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/auth/session", post(handlers::demo::session))
        .route("/api/logout", get(handlers::demo::logout));

    // Protected routes (user auth required)
    let protected_routes = Router::new()
        .route("/api/claim", post(handlers::demo::claim))
        .route("/api/user", get(handlers::demo::get_user))
        .route("/api/purchase", post(handlers::demo::purchase))
        .route("/api/reset", post(handlers::demo::reset))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::user_auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
