//! recibot - menu-driven WhatsApp assistant for Recife municipal services.
//!
//! Citizens text a number and navigate a numbered menu: medicine stock
//! lookups, tourism suggestions and public-service unit listings, all
//! backed by flat CSV datasets. Replies are plain text plus, on request, a
//! static map image composed from slippy-map tiles.
//!
//! ## Architecture
//!
//! ```text
//! gateway webhook → channel::routes → mpsc → router (per-sender serial)
//!                                              ↓ data / map / session
//!                       gateway HTTP API ← ChatTransport
//! ```
//!
//! The WhatsApp connection itself (pairing, delivery) is an external
//! gateway process; this crate is the conversation engine behind it.

#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod map;
pub mod router;
pub mod session;

pub use channel::routes::{build_router, create_state};
pub use channel::whatsapp::WhatsAppGateway;
pub use channel::{ChannelMessage, ChatTransport, OutgoingContent};
pub use config::BotConfig;
pub use error::{BotError, Result};
pub use map::StaticMapRenderer;
pub use router::{spawn_router_loop, Router};
pub use session::{FlowState, Session, SessionStore, SubState};

use std::sync::Arc;
use std::time::Duration;

/// Wire everything up and serve until the webhook listener stops.
pub async fn run(config: BotConfig) -> anyhow::Result<()> {
    let store = Arc::new(SessionStore::new());
    let gateway = Arc::new(WhatsAppGateway::new(&config.gateway));
    let router = Arc::new(Router::new(gateway, store.clone(), &config)?);

    let sweeper = session::spawn_sweeper(
        store,
        Duration::from_secs(config.session.idle_ttl_secs),
        Duration::from_secs(config.session.sweep_interval_secs),
    );

    let (state, rx) = create_state(64);
    let router_loop = spawn_router_loop(router, rx);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.gateway.listen_addr).await?;
    tracing::info!(addr = %config.gateway.listen_addr, "webhook listener started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    sweeper.abort();
    router_loop.abort();
    Ok(())
}
