use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use sda_portal::auth::{AdminGuard, ParticipantGuard};

mod context;
mod error;
mod handlers;
mod middleware;

use context::AppContext;
use middleware::require_guard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up BACKEND_URL, BACKEND_ANON_KEY, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = sda_portal::config::config().clone();
    tracing::info!("Starting SDA portal in {:?} mode", config.environment);

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let app = app(AppContext::new(config)?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("SDA portal listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn app(ctx: AppContext) -> Router {
    Router::new()
        // Public
        .route("/", get(handlers::public::root))
        .route("/health", get(handlers::public::health))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/signup", post(handlers::auth::signup))
        // Guarded
        .merge(admin_routes(ctx.clone()))
        .merge(participant_routes(ctx.clone()))
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

fn admin_routes(ctx: AppContext) -> Router<AppContext> {
    use handlers::admin;

    Router::new()
        .route("/api/admin/investors", get(admin::investors))
        .route("/api/admin/properties", get(admin::properties))
        .route_layer(from_fn_with_state(ctx, require_guard::<AdminGuard>))
}

fn participant_routes(ctx: AppContext) -> Router<AppContext> {
    use handlers::participant;

    Router::new()
        .route("/api/participant/properties", get(participant::properties))
        .route("/api/participant/properties/:id", get(participant::property_show))
        .route_layer(from_fn_with_state(ctx, require_guard::<ParticipantGuard>))
}
