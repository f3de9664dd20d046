//! Carta API server
//!
//! The single entry point for all external requests.
//! Handles:
//! - Account registration and sessions
//! - Restaurant, category and product management
//! - Premium upgrades through the billing provider
//! - The public menu, QR codes and uploaded images
//! - Observability (logging, metrics, tracing)

mod extractors;
mod handlers;
mod middleware;
mod uploads;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use carta_core::{
    auth::{self, JwtManager},
    billing::{self, BillingBridge},
    config::AppConfig,
    db::DbPool,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub jwt: JwtManager,
    pub billing: BillingBridge,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .json()
        .init();

    info!("Starting Carta API server v{}", carta_core::VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;

    let config = Arc::new(config);

    // Initialize metrics
    carta_core::metrics::register_metrics();

    if config.observability.metrics_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                carta_core::metrics::LATENCY_BUCKETS,
            )?
            .install()?;
        info!("Prometheus exporter listening on {}", addr);
    }

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    if config.database.auto_migrate {
        db.migrate().await?;
    }

    // Uploaded images live on local disk, served under the uploads path
    tokio::fs::create_dir_all(&config.uploads.dir).await?;

    let jwt_secret = match config.auth.jwt_secret.clone() {
        Some(secret) => secret,
        None => {
            tracing::warn!("No session secret configured; sessions will not survive a restart");
            auth::generate_session_secret()
        }
    };
    let jwt = JwtManager::new(&jwt_secret, config.auth.session_ttl_secs);

    let billing = BillingBridge::new(
        billing::create_provider(&config.billing),
        config.billing.clone(),
    );

    // Create app state
    let state = AppState {
        config: config.clone(),
        db,
        jwt,
        billing,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Multipart framing overhead on top of the file size limit
    let upload_limit = state.config.uploads.max_bytes + 1024;

    // API routes (session-guarded except auth)
    let api_routes = Router::new()
        // Account endpoints
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        // Restaurant profile endpoints
        .route("/restaurant", get(handlers::restaurant::get_restaurant))
        .route("/restaurant", put(handlers::restaurant::update_restaurant))
        .route(
            "/restaurant/logo",
            post(handlers::restaurant::upload_logo).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/restaurant/qr.svg", get(handlers::restaurant::qr_svg))
        .route("/restaurant/stats", get(handlers::restaurant::stats))
        // Category endpoints
        .route("/categories", get(handlers::categories::list_categories))
        .route("/categories", post(handlers::categories::create_category))
        .route("/categories/{id}", put(handlers::categories::update_category))
        .route("/categories/{id}", delete(handlers::categories::delete_category))
        // Product endpoints
        .route("/products", get(handlers::products::list_products))
        .route("/products", post(handlers::products::create_product))
        .route("/products/{id}", put(handlers::products::update_product))
        .route("/products/{id}", delete(handlers::products::delete_product))
        .route(
            "/products/{id}/image",
            post(handlers::products::upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Billing endpoints
        .route("/billing/upgrade", post(handlers::billing::upgrade))
        .route("/billing/confirm", post(handlers::billing::confirm));

    // The public menu gets rate limiting and compression
    let mut menu_routes = Router::new().route("/menu/{slug}", get(handlers::public::get_menu));

    if state.config.rate_limit.enabled {
        let limit = state.config.rate_limit.requests_per_second;
        let limiter =
            middleware::rate_limit::create_rate_limiter(limit, state.config.rate_limit.burst);

        menu_routes = menu_routes.layer(axum::middleware::from_fn(
            move |request: axum::extract::Request, next: axum::middleware::Next| {
                let limiter = limiter.clone();
                async move {
                    middleware::rate_limit::rate_limit_middleware(request, next, limiter, limit)
                        .await
                }
            },
        ));
    }

    let menu_routes = menu_routes.layer(CompressionLayer::new());

    // Compose the app
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .merge(menu_routes)
        .nest("/api", api_routes)
        .nest_service(
            state.config.uploads.base_url.as_str(),
            ServeDir::new(&state.config.uploads.dir),
        )
        .layer(axum::middleware::from_fn(middleware::metrics::track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
