//! Backend of a student appliance-rental site.
//!
//! Two public forms land here: the order request and the general contact form. The rest
//! of the site is static and never talks to this server.
//!
//!
//!
//! # Order Flow
//!
//! - Client posts the order JSON, including both document uploads as base64
//! - Per-address rate limit, then field validation in a fixed order, first failure wins
//! - Requested appliances are resolved against the plan catalog, in catalog order
//! - A reference like `RNT-260115-1A2B` is generated and the record is written
//! - Only then do the emails go out: customer copy, then admin copy with the uploads attached
//! - The response always carries the reference once the record exists, `emailed` says
//!   whether the customer copy made it
//!
//!
//!
//! # Contact Flow
//!
//! - Same-origin check, rate limit, honeypot and minimum dwell time
//! - Admin email with reply-to set to the sender, then an acknowledgment to the sender
//! - Nothing is stored, so if mail fails the request fails
//!
//!
//!
//! # Reconciliation
//!
//! Mail is best-effort. Staff close the gap from the admin routes or the `rental-admin` CLI:
//! - toggle the `emailed` flag after confirming contact out-of-band
//! - resend the confirmation for an existing record
//! - list and export to CSV
//!
//!
//!
//! # Notes
//!
//! ## Redis
//! Orders live in Redis when `REDIS_URL` is set, otherwise in process memory. The memory
//! store is fine for development and tests, not for production.
//!
//! ## Rate limits
//! Counters are per process and reset on restart. Behind a proxy make sure
//! `X-Forwarded-For` is set, otherwise every client shares the `unknown` bucket.
//!
//!
//!
//! # Setup
//!
//! Run locally with in-memory storage and mail disabled.
//! ```sh
//! RUST_LOG=info cargo run -p rental
//! ```
//!
//! With Redis and mail.
//! ```sh
//! REDIS_URL=redis://127.0.0.1:6379 MAIL_API_KEY=re_xxx ADMIN_EMAIL=staff@example.com cargo run -p rental
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    middleware,
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod admin;
pub mod config;
pub mod database;
pub mod error;
pub mod intake;
pub mod mailer;
pub mod notify;
pub mod rate_limit;
pub mod redis_store;
pub mod reference;
pub mod routes;
pub mod state;
pub mod utils;
pub mod validation;

use config::Config;
use routes::{
    ADMIN_ORDERS_PATH, contact_handler, export_handler, health_handler, list_handler,
    order_handler, require_admin, resend_handler, stats_handler, toggle_handler,
};
use state::AppState;

pub fn init_tracing() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    if !origins.is_empty() {
        cors = cors.allow_origin(AllowOrigin::list(origins));
    }

    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/orders", post(order_handler))
        .route("/api/contact", post(contact_handler));

    if state.config.admin_token.is_some() {
        let admin = Router::new()
            .route(ADMIN_ORDERS_PATH, get(list_handler))
            .route("/admin/orders.csv", get(export_handler))
            .route("/admin/stats", get(stats_handler))
            .route("/admin/orders/{key}/toggle", post(toggle_handler))
            .route("/admin/orders/{key}/resend", post(resend_handler))
            .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

        app = app.merge(admin);
    } else {
        info!("ADMIN_TOKEN not set, admin routes disabled");
    }

    app.layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    init_tracing();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = AppState::new(config).await?;

    info!("Starting server...");
    let address = format!("0.0.0.0:{}", state.config.port);
    let app = build_router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
