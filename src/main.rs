use anyhow::Context;
use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use imagegen_gateway::config::{Args, HandlerMode};
use imagegen_gateway::fallback::FallbackPool;
use imagegen_gateway::handlers;
use imagegen_gateway::rate_limit::RateLimiter;
use imagegen_gateway::state::{AppState, Responder};
use imagegen_gateway::store::{self, CounterStore, MemoryStore};
use imagegen_gateway::upstream::StabilityClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // parse cli arguments
    let args = Args::parse();
    args.validate()?;

    let spec = args.window_spec();
    let store = build_store(&args, spec.window).await?;

    // one limiter for the whole process
    let limiter = RateLimiter::new(store, spec, args.key_prefix.clone());

    let responder = match args.mode {
        HandlerMode::Forward => {
            let client = StabilityClient::new(
                args.upstream_url.clone(),
                args.api_key.clone().unwrap_or_default(),
                Duration::from_secs(args.upstream_timeout),
            )?;
            info!("Forwarding to {}", args.upstream_url);
            Responder::Forward(Arc::new(client))
        }
        HandlerMode::Fallback => {
            let pool = match &args.fallback_file {
                Some(path) => FallbackPool::from_file(path)
                    .with_context(|| format!("loading fallback images from {}", path.display()))?,
                None => FallbackPool::default(),
            };
            info!("Serving fallback images ({} in pool)", pool.len());
            Responder::Fallback(pool)
        }
    };

    // creating shared state
    let state = Arc::new(AppState {
        limiter,
        on_store_failure: args.on_store_failure,
        responder,
        answer_preflight: args.answer_preflight,
        trust_forwarded_for: args.trust_forwarded_for,
        max_body_bytes: args.max_body_bytes,
    });

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    info!("Gateway running on http://localhost:{}", args.port);
    info!(
        "Rate limit: {} requests per {} seconds ({:?} on store failure)",
        args.rate_limit, args.rate_window, args.on_store_failure
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn build_store(args: &Args, window: Duration) -> anyhow::Result<Arc<dyn CounterStore>> {
    if let Some(url) = &args.redis_url {
        return connect_redis(url).await;
    }

    // no shared store: count in-process and sweep idle clients
    let memory = Arc::new(MemoryStore::new());
    tokio::spawn(store::sweeper(
        Arc::clone(&memory),
        window,
        Duration::from_secs(args.sweep_interval),
    ));
    info!("Using in-memory counter store");

    let store: Arc<dyn CounterStore> = memory;
    Ok(store)
}

#[cfg(feature = "redis-store")]
async fn connect_redis(url: &str) -> anyhow::Result<Arc<dyn CounterStore>> {
    let redis = store::RedisStore::connect(url)
        .await
        .context("connecting to the redis counter store")?;
    info!("Using redis counter store");
    Ok(Arc::new(redis))
}

#[cfg(not(feature = "redis-store"))]
async fn connect_redis(_url: &str) -> anyhow::Result<Arc<dyn CounterStore>> {
    anyhow::bail!("--redis-url given but this build has no redis-store feature")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
