use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use bookline::config::AppConfig;
use bookline::db;
use bookline::handlers;
use bookline::services::calendar::google::GoogleCalendarClient;
use bookline::services::messaging::gateway::HttpGatewayProvider;
use bookline::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let calendar = GoogleCalendarClient::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
        config.calendar_timeout_secs,
    );
    let messaging = HttpGatewayProvider::new(
        config.messaging_gateway_url.clone(),
        config.messaging_gateway_key.clone(),
    );

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        calendar: Box::new(calendar),
        messaging: Box::new(messaging),
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/availability", get(handlers::availability::get_availability))
        .route("/appointments", post(handlers::appointments::create_appointment))
        .route(
            "/cancel",
            get(handlers::cancel::lookup_cancellation).post(handlers::cancel::cancel_appointment),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
