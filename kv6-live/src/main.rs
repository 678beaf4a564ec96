use std::sync::Arc;

use kv6_live::config::AppConfig;
use kv6_live::feed::ZmqTransport;
use kv6_live::pipeline::Pipeline;
use kv6_live::web::{AppState, create_router};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kv6_live=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    let feed = &config.pipeline.feed;
    let transport = ZmqTransport::new(feed.poll_interval, feed.channel_capacity);
    info!(endpoint = %feed.endpoint, topic = feed.topic.as_str(), "starting feed");

    let pipeline = Pipeline::new(transport, config.pipeline.clone());
    pipeline.start();

    let app = create_router(AppState::new(pipeline.handle()));

    let listener = match tokio::net::TcpListener::bind(config.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %config.bind, error = %e, "failed to bind");
            pipeline.shutdown().await;
            std::process::exit(1);
        }
    };
    info!(addr = %config.bind, "listening");
    info!("  GET /health             - Health check");
    info!("  GET /api/vehicles       - Current vehicles (?line=&operator=&limit=)");
    info!("  GET /api/vehicles/:id   - One vehicle");
    info!("  GET /api/status         - Feed and store status");
    info!("  GET /api/stream         - Live updates (server-sent events)");

    // Open event streams never finish on their own; end them so the server
    // can drain.
    let hub = Arc::clone(pipeline.hub());
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            hub.detach_all();
        })
        .await;
    if let Err(e) = served {
        error!(error = %e, "server error");
    }

    pipeline.shutdown().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
