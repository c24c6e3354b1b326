use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Query, State, WebSocketUpgrade},
    http::{HeaderValue, Method, header::{AUTHORIZATION, CONTENT_TYPE}},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use konnect_api::auth::{self, AppState, AppStateInner};
use konnect_api::middleware::{decode_claims, require_auth};
use konnect_api::otp::{self, Mailer};
use konnect_api::payments::{self, PaymentClient};
use konnect_api::storage::Storage;
use konnect_api::{chat, newsletter, oauth, orders, promotions, users};
use konnect_gateway::connection;
use konnect_gateway::dispatcher::Dispatcher;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// Order attachments are capped at 50 MB.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "konnect=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret = std::env::var("KONNECT_JWT_SECRET").unwrap_or_default();
    if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        eprintln!("FATAL: KONNECT_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    let host = std::env::var("KONNECT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("KONNECT_PORT")
        .unwrap_or_else(|_| "4000".into())
        .parse()?;
    let db_path = std::env::var("KONNECT_DB_PATH").unwrap_or_else(|_| "konnect.db".into());
    let upload_dir: PathBuf = std::env::var("KONNECT_UPLOAD_DIR")
        .unwrap_or_else(|_| "./uploads".into())
        .into();
    let promo_base_url = std::env::var("KONNECT_PROMO_BASE_URL")
        .unwrap_or_else(|_| format!("http://localhost:{port}"));
    let promo_target_url = std::env::var("KONNECT_PROMO_TARGET_URL")
        .unwrap_or_else(|_| "https://konnect.example.com".into());

    // Init database, storage and shared state
    let db = Arc::new(konnect_db::Database::open(&PathBuf::from(&db_path))?);
    let storage = Storage::new(upload_dir.clone()).await?;
    let dispatcher = Dispatcher::new();

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        dispatcher,
        storage,
        payments: PaymentClient::from_env()?,
        mailer: Mailer::from_env()?,
        http: reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?,
        promo_base_url,
        promo_target_url,
    });

    // Routes
    let public_routes = Router::new()
        .route("/api/signup", post(auth::signup))
        .route("/api/login", post(auth::login))
        .route("/api/send-otp", post(otp::send_otp))
        .route("/api/verify-otp", post(otp::verify_otp))
        .route("/api/reset-password", post(otp::reset_password))
        .route("/api/subscribe", post(newsletter::subscribe))
        .route("/api/unsubscribe", post(newsletter::unsubscribe))
        .route("/api/service-request", post(users::service_request))
        .route("/api/influencers", get(users::list_influencers))
        .route(
            "/api/promo/{user_id}/{campaign_id}/{code}",
            get(promotions::track_click),
        )
        .route(
            "/api/connect/{provider}/callback",
            get(oauth::connect_callback),
        );

    let protected_routes = Router::new()
        .route("/api/send", post(chat::send_message))
        .route("/api/chat/{user_id}", get(chat::get_chat))
        .route("/api/chats", get(chat::list_chats))
        .route("/api/users", get(chat::list_users))
        .route("/api/place-order", post(orders::place_order))
        .route("/api/orders", get(orders::list_orders))
        .route("/api/orders/{id}", delete(orders::delete_order))
        .route(
            "/api/create-payment-order",
            post(payments::create_payment_order),
        )
        .route("/api/verify-payment", post(payments::verify_payment))
        .route("/api/generate-url", post(promotions::generate_url))
        .route("/api/promotions", get(promotions::list_promotions))
        .route("/api/wishlist/{target_id}", post(users::toggle_wishlist))
        .route("/api/wishlist", get(users::get_wishlist))
        .route("/api/connect/{provider}", get(oauth::connect_start))
        .route("/api/connections", get(oauth::list_connections))
        .layer(middleware::from_fn(require_auth));

    let app = Router::new()
        .route("/", get(health))
        .merge(public_routes)
        .merge(protected_routes)
        .route("/gateway", get(ws_upgrade))
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Konnect server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn health() -> &'static str {
    "Server is up"
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// The credential is checked at the upgrade; a bad token still upgrades so
/// the client receives an error event before the close.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let claims = query
        .token
        .as_deref()
        .and_then(|token| decode_claims(token, &state.jwt_secret));

    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, db, claims))
}

/// Restrict CORS to the configured frontend origins; without configuration
/// stay permissive for local development.
fn cors_layer() -> CorsLayer {
    match std::env::var("KONNECT_ALLOWED_ORIGINS") {
        Ok(raw) if !raw.trim().is_empty() => {
            let origins: Vec<HeaderValue> = raw
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_credentials(true)
        }
        _ => CorsLayer::permissive(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
