//! Walletgate application entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Connect to Redis
//! 3. Spawn the background login recorder
//! 4. Build router with CORS allow-list and security headers
//! 5. Start Axum server

use axum::http::{HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use walletgate::{
    auth::middleware::AppState, auth::token::TokenSigner, config::Config,
    middleware::security_headers, recorder::LoginRecorder, routes,
};

#[tokio::main]
async fn main() {
    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config from environment
    let config = Config::from_env().expect("Failed to load config");
    tracing::info!("Starting walletgate on {}", config.bind_addr);

    // Connect to Redis and verify the connection up front
    let redis_client = redis::Client::open(config.redis_url.as_str()).expect("Invalid Redis URL");
    redis_client
        .get_multiplexed_async_connection()
        .await
        .expect("Failed to connect to Redis");

    let signer = Arc::new(TokenSigner::new(config.jwt_secret.as_bytes()));
    let recorder = LoginRecorder::spawn(
        redis_client.clone(),
        config.login_queue_capacity,
        config.session_default_minutes,
    );

    // Explicit CORS allow-list from config; anything else is rejected.
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .unwrap_or_else(|_| panic!("Invalid CORS origin: {}", origin))
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let state = AppState {
        redis: redis_client,
        config: Arc::new(config.clone()),
        signer,
        recorder,
    };

    let app = routes::api_router()
        .layer(cors)
        .layer(axum::middleware::from_fn(security_headers))
        .with_state(state);

    // Bind to configured address
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", config.bind_addr);

    // Start server (with_connect_info required for ConnectInfo<SocketAddr> extractors)
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
