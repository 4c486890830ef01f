//! Socialnet API Server
//! Mission: Serve the social network REST API behind the access-control pipeline

use anyhow::{Context, Result};
use dotenv::dotenv;
use socialnet_backend::{
    build_router,
    cache::{MemoryUserCache, RedisUserCache, UserCache},
    config::CacheBackend,
    store::{SqliteStore, Storage},
    AppState, Config,
};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tokio::{net::TcpListener, time::interval};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Config::from_env();
    info!(env = %config.env, "🚀 Socialnet API starting");

    let sqlite = SqliteStore::new(&config.db.path, config.db.query_timeout)
        .with_context(|| format!("Failed to open database at {}", config.db.path))?;
    let store = Storage::sqlite(sqlite);
    info!("💾 System of record ready at: {}", config.db.path);

    let cache = build_cache(&config).await?;

    let state = AppState::new(config.clone(), store, cache);

    if config.rate_limit.enabled {
        info!(
            max_requests = config.rate_limit.max_requests,
            window_secs = config.rate_limit.window.as_secs(),
            "🚦 Rate limiter enabled"
        );
        // Idle clients are evicted once their window has fully elapsed.
        let limiter = state.rate_limiter.clone();
        let every = config.rate_limit.window.max(std::time::Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;
                limiter.cleanup();
            }
        });
    } else {
        warn!("⚠️  Rate limiter disabled");
    }

    let app = build_router(state);

    let listener = TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.addr))?;
    info!("🎯 API server listening on {}", config.addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("👋 Server stopped");
    Ok(())
}

async fn build_cache(config: &Config) -> Result<Option<Arc<dyn UserCache>>> {
    if !config.cache.enabled {
        info!("🧊 Identity cache disabled");
        return Ok(None);
    }

    let cache: Arc<dyn UserCache> = match config.cache.backend {
        CacheBackend::Redis => {
            let redis = RedisUserCache::connect(
                &config.cache.redis_addr,
                config.cache.ttl,
                config.cache.timeout,
            )
            .await
            .with_context(|| format!("Failed to connect to redis at {}", config.cache.redis_addr))?;
            info!("🧠 Identity cache: redis at {}", config.cache.redis_addr);
            Arc::new(redis)
        }
        CacheBackend::Memory => {
            info!("🧠 Identity cache: in-process");
            Arc::new(MemoryUserCache::new(config.cache.ttl))
        }
    };
    Ok(Some(cache))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutdown signal received");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "socialnet_backend=debug,socialnet=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents), then the crate root.
    let _ = dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
