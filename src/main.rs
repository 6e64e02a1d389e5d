//! swapflow server entry point.
//!
//! Composition root: loads configuration, wires the process-scoped
//! services (store, queue, venues, hub, audit bus), starts the worker
//! pool, and serves the Axum HTTP/WebSocket API.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use chrono::Utc;
use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use swapflow::api;
use swapflow::app_state::AppState;
use swapflow::audit::{AuditBus, AuditLogListener};
use swapflow::config::EngineConfig;
use swapflow::execution::Orchestrator;
use swapflow::notify::NotificationHub;
use swapflow::queue::{JobQueue, QueueOptions, RedisJobQueue};
use swapflow::service::OrderService;
use swapflow::store::{OrderStore, PgOrderStore};
use swapflow::venue::{MockVenue, VenueAdapter, VenueRegistry};
use swapflow::worker::{WorkerPool, WorkerPoolConfig};
use swapflow::ws::handler::ws_handler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration first: invalid settings fail before anything binds.
    let config = EngineConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .init();
    tracing::info!(addr = %config.listen_addr, "starting swapflow");

    // Persistence.
    let pg_pool = PgPoolOptions::new()
        .min_connections(config.database.pool_min)
        .max_connections(config.database.pool_max)
        .connect(&config.database.connection_url())
        .await?;
    let store: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(pg_pool));

    // Job queue.
    let queue_options = QueueOptions {
        max_attempts: config.queue_max_attempts,
        ..QueueOptions::default()
    };
    let queue: Arc<dyn JobQueue> = Arc::new(
        RedisJobQueue::connect(&config.redis.connection_url(), queue_options).await?,
    );

    // Venues. The DEX integrations are mock adapters behind the uniform
    // contract; swap them for real protocol clients per deployment.
    let registry = Arc::new(VenueRegistry::new(vec![
        Arc::new(MockVenue::new("meteora", dec!(96.2)).with_fee(dec!(0.05)))
            as Arc<dyn VenueAdapter>,
        Arc::new(MockVenue::new("raydium", dec!(95.5)).with_fee(dec!(0.04)))
            as Arc<dyn VenueAdapter>,
    ]));

    // Audit bus with the persisting listener.
    let mut bus = AuditBus::new();
    bus.register(Arc::new(AuditLogListener::new(Arc::clone(&store))));

    // Notification hub shared by workers and the WS transport.
    let hub = Arc::new(NotificationHub::new());

    // Execution pipeline.
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&hub),
        bus.clone(),
        config.wallet_address.clone(),
    ));
    let mut pool = WorkerPool::new(
        Arc::clone(&queue),
        orchestrator,
        WorkerPoolConfig {
            concurrency: config.queue_concurrency,
            ..WorkerPoolConfig::default()
        },
    );
    pool.start();

    // HTTP/WS surface.
    let order_service = Arc::new(OrderService::new(
        Arc::clone(&store),
        Arc::clone(&queue),
        bus,
    ));
    let app_state = AppState {
        order_service,
        hub,
        started_at: Utc::now(),
    };
    let app = Router::new()
        .merge(api::build_router())
        .route("/api/orders/execute", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    // Drain in-flight executions before exiting.
    pool.shutdown().await;

    Ok(())
}
