//! Application entry point.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::{ExposeSecret, SecretString};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use coria_backend::api::{
    JwtAuthenticator, RateLimitConfig, create_router, create_router_with_rate_limit,
};
use coria_backend::app::{AppSettings, AppState, WorkerConfig, spawn_worker};
use coria_backend::domain::types::is_valid_solana_address;
use coria_backend::domain::{PoolConfig, SolanaNetwork};
use coria_backend::infra::{PostgresClient, PostgresConfig, RedisClient, RpcBlockchainClient};

/// Application configuration
struct Config {
    database_url: String,
    redis_url: String,
    rpc_endpoint: String,
    solana_network: SolanaNetwork,
    environment: String,
    webhook_secret: SecretString,
    jwt_secret: SecretString,
    pools: PoolConfig,
    host: String,
    port: u16,
    cors_origins: Vec<String>,
    enable_rate_limiting: bool,
    rate_limit_config: RateLimitConfig,
    worker_config: WorkerConfig,
    health_check_timeout: Duration,
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn required_secret(key: &str) -> Result<SecretString> {
    let value = env::var(key).with_context(|| format!("{} not set", key))?;
    if value.trim().is_empty() {
        anyhow::bail!("{} is empty", key);
    }
    Ok(SecretString::from(value))
}

fn pool_address(key: &str) -> Result<String> {
    let address = env::var(key).with_context(|| format!("{} not set", key))?;
    if !is_valid_solana_address(&address) {
        anyhow::bail!("{} is not a valid Solana public key", key);
    }
    Ok(address)
}

impl Config {
    fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string());

        let solana_network = match env::var("SOLANA_NETWORK") {
            Ok(v) => v
                .parse::<SolanaNetwork>()
                .map_err(|e| anyhow::anyhow!("SOLANA_NETWORK: {}", e))?,
            Err(_) => SolanaNetwork::Devnet,
        };
        let rpc_endpoint = env::var("RPC_ENDPOINT")
            .unwrap_or_else(|_| solana_network.default_rpc_url().to_string());

        let environment = env::var("APP_ENV")
            .or_else(|_| env::var("NODE_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let webhook_secret = required_secret("WEBHOOK_SECRET")?;
        let jwt_secret = required_secret("SUPABASE_JWT_SECRET")?;

        let donation_pool = pool_address("DONATION_POOL_PUBKEY")?;
        let premium_pool = pool_address("PREMIUM_POOL_PUBKEY")?;
        let premium_price_sol: f64 = env_parse("PREMIUM_PRICE_SOL", 1.0);
        if !premium_price_sol.is_finite() || premium_price_sol <= 0.0 {
            anyhow::bail!("PREMIUM_PRICE_SOL must be a positive number");
        }

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let worker_config = WorkerConfig {
            enabled: env_flag("ENABLE_BACKGROUND_WORKER", true),
            poll_interval: Duration::from_secs(env_parse("WORKER_POLL_INTERVAL_SECS", 30u64).max(1)),
            batch_size: env_parse("WORKER_BATCH_SIZE", 20i64).clamp(1, 100),
        };

        Ok(Self {
            database_url,
            redis_url,
            rpc_endpoint,
            solana_network,
            environment,
            webhook_secret,
            jwt_secret,
            pools: PoolConfig {
                donation_pool,
                premium_pool,
                premium_price_sol,
                premium_duration_days: coria_backend::domain::types::PREMIUM_DURATION_DAYS,
            },
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000),
            cors_origins,
            enable_rate_limiting: env_flag("ENABLE_RATE_LIMITING", false),
            rate_limit_config: RateLimitConfig::from_env(),
            worker_config,
            health_check_timeout: Duration::from_secs(
                env_parse("HEALTH_CHECK_TIMEOUT_SECS", 5u64).max(1),
            ),
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("🌱 CORIA backend v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        "🌐 Environment: {} / Solana {}",
        config.environment, config.solana_network
    );

    info!("📦 Initializing infrastructure...");

    let postgres_client = PostgresClient::new(&config.database_url, PostgresConfig::default()).await?;
    postgres_client.run_migrations().await?;
    info!("   ✓ Database connected and migrations applied");

    let blockchain_client = RpcBlockchainClient::with_defaults(&config.rpc_endpoint)?;
    info!("   ✓ Solana RPC client created ({})", config.rpc_endpoint);

    let redis_client = RedisClient::new(&config.redis_url)?;
    info!("   ✓ Redis client created");

    let authenticator = JwtAuthenticator::from_secret(config.jwt_secret.expose_secret().as_bytes());
    info!("   ✓ Supabase token verification configured");

    let mut settings = AppSettings::new(config.webhook_secret, config.pools);
    settings.environment = config.environment;
    settings.solana_network = config.solana_network;
    settings.health_check_timeout = config.health_check_timeout;
    settings.cors_origins = config.cors_origins;

    let app_state = Arc::new(AppState::new(
        Arc::new(postgres_client),
        Arc::new(blockchain_client),
        Arc::new(redis_client),
        Arc::new(authenticator),
        settings,
    ));

    let worker_shutdown_tx = if config.worker_config.enabled {
        let (_worker_handle, shutdown_tx) =
            spawn_worker(Arc::clone(&app_state.service), config.worker_config.clone());
        info!(
            "   ✓ Confirmation worker started (poll: {}s, batch: {})",
            config.worker_config.poll_interval.as_secs(),
            config.worker_config.batch_size
        );
        Some(shutdown_tx)
    } else {
        info!("   ○ Confirmation worker disabled");
        None
    };

    let router = if config.enable_rate_limiting {
        info!(
            "   ✓ Rate limiting enabled ({} rps, burst {})",
            config.rate_limit_config.requests_per_second, config.rate_limit_config.burst_size
        );
        create_router_with_rate_limit(app_state, config.rate_limit_config)
    } else {
        info!("   ○ Rate limiting disabled");
        create_router(app_state)
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🚀 Server starting on http://{}", addr);
    info!("📖 Swagger UI available at http://{}/swagger-ui", addr);
    info!("📄 OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(tx) = worker_shutdown_tx {
        let _ = tx.send(true);
    }

    info!("Server shutdown complete");
    Ok(())
}
