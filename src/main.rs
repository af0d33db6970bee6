use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;

use crate::config::Config;
use crate::db::DatabasePool;
use crate::services::{
    CartSessions, CheckoutService, DataService, OrderService, SimulatedPayment, SqlDataService,
    WardrobeService,
};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

pub type AppState = (
    Arc<dyn DataService>,
    Arc<CartSessions>,
    Arc<CheckoutService>,
    Arc<OrderService>,
    Arc<WardrobeService>,
);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tripcart_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting TripCart server...");

    // Layered files and TRIPCART_ variables first, plain environment otherwise.
    let config = match Config::new() {
        Ok(config) => config,
        Err(e) => {
            info!("No layered configuration ({}), reading environment", e);
            Config::from_env()?
        }
    };
    info!("Configuration loaded: {:?}", config);

    let db_pool = DatabasePool::new(&config).await?;
    info!("Database connection established");

    db_pool.migrate().await?;
    info!("Database migrations completed");

    let data_service: Arc<dyn DataService> = Arc::new(SqlDataService::new(db_pool.clone()));
    let payments = Arc::new(SimulatedPayment::new(config.checkout.payment_delay()));
    let checkout_service = Arc::new(CheckoutService::new(
        data_service.clone(),
        payments,
        config.checkout.notification_policy,
    ));
    info!(
        "Checkout ready (payment delay {}ms, notifications {:?})",
        config.checkout.payment_delay_ms, config.checkout.notification_policy
    );

    let sessions = Arc::new(CartSessions::new());
    spawn_session_sweeper(sessions.clone());

    let app_state: AppState = (
        data_service,
        sessions,
        checkout_service,
        Arc::new(OrderService::new(db_pool.clone())),
        Arc::new(WardrobeService::new(db_pool)),
    );

    let app = Router::new()
        .route("/", get(root))
        .route("/api/v1/health", get(health_check))
        .nest("/api/v1", api_routes(app_state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .allow_credentials(false),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically forgets cart sessions that hold nothing.
fn spawn_session_sweeper(sessions: Arc<CartSessions>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let pruned = sessions.prune_idle().await;
            if pruned > 0 {
                debug!("Pruned {} idle cart sessions", pruned);
            }
        }
    });
}

fn api_routes(app_state: AppState) -> Router {
    Router::new()
        // Cart
        .route(
            "/cart",
            get(handlers::get_cart).delete(handlers::clear_cart),
        )
        .route("/cart/trip", put(handlers::update_trip))
        .route("/cart/items", post(handlers::add_cart_item))
        .route(
            "/cart/items/:item_id",
            get(handlers::check_cart_item).delete(handlers::remove_cart_item),
        )
        .route("/checkout", post(handlers::submit_checkout))
        // Borrower orders
        .route("/orders", get(handlers::list_orders))
        .route("/orders/:id", get(handlers::get_order))
        .route("/orders/:id/cancel", post(handlers::cancel_order))
        // Lender side
        .route("/lender/requests", get(handlers::list_lender_requests))
        .route(
            "/lender/requests/:order_id/respond",
            post(handlers::respond_to_request),
        )
        .route("/orders/:id/checklist", get(handlers::get_checklist))
        .route(
            "/orders/:id/checklist/:step_key/toggle",
            post(handlers::toggle_checklist_step),
        )
        .route("/orders/:id/ready", post(handlers::mark_order_ready))
        .route("/notifications", get(handlers::list_notifications))
        .with_state(app_state)
}

async fn root() -> &'static str {
    "TripCart Server"
}

async fn health_check() -> &'static str {
    "OK"
}
