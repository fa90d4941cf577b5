//! Ordering backend for a small food stand.
//!
//! Public storefront endpoints serve the product catalog and take purchase
//! orders (cash at the table, or transfer with an uploaded proof-of-payment
//! image). Authenticated vendor endpoints manage the catalog and work
//! through the incoming orders.
//!
//!
//!
//! # General Infrastructure
//! - Single container running this server plus a SQLite file on a mounted
//!   volume
//! - The frontend is static and talks to this API directly, so CORS is
//!   locked to the storefront origin in deployed environments
//! - Deploy targets have ephemeral filesystems; uploaded images therefore
//!   live inside the database as base64 data URIs rather than on disk
//!
//!
//!
//! # Notes
//!
//! ## Auth
//! Vendor sessions are HMAC-signed bearer tokens checked on every request.
//! No session table, nothing to sync; revocation is rotating the secret.
//!
//! ## Orders
//! Order placement is the only multi-table write. It runs as one
//! transaction: validate, snapshot prices, insert order + items, decrement
//! stock conditionally. See `orders` for the details.
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, patch, post, put},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod orders;
pub mod state;
pub mod utils;

use auth::login_handler;
use catalog::{
    create_product_handler, delete_product_handler, list_all_products_handler,
    list_products_handler, update_product_handler,
};
use orders::{
    create_order_handler, delete_order_handler, list_orders_handler, replace_items_handler,
    update_buyer_handler, update_status_handler,
};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    cors = match &state.config.cors_origin {
        Some(origin) => cors.allow_origin(
            origin
                .parse::<HeaderValue>()
                .expect("CORS origin misconfigured!"),
        ),
        None => cors.allow_origin(Any),
    };

    let app = Router::new()
        .route("/products", get(list_products_handler).post(create_product_handler))
        .route("/products/all", get(list_all_products_handler))
        .route(
            "/products/:id",
            put(update_product_handler).delete(delete_product_handler),
        )
        .route("/orders", get(list_orders_handler).post(create_order_handler))
        .route(
            "/orders/:id",
            put(update_buyer_handler).delete(delete_order_handler),
        )
        .route("/orders/:id/status", patch(update_status_handler))
        .route("/orders/:id/items", put(replace_items_handler))
        .route("/auth/login", post(login_handler))
        .layer(DefaultBodyLimit::max(state.config.max_receipt_bytes))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
