//! Application state management.

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use crate::api::auth::JwtAuthenticator;
use crate::domain::{BlockchainClient, CacheClient, DatabaseClient, PoolConfig, SolanaNetwork};

use super::replay::DEFAULT_REPLAY_WINDOW;
use super::service::AppService;
use super::wallet_service::WalletService;

/// Runtime settings shared by the services
pub struct AppSettings {
    /// Deployment environment name (`development`, `production`, ...)
    pub environment: String,
    pub solana_network: SolanaNetwork,
    /// Shared secret for inbound webhook signatures
    pub webhook_secret: SecretString,
    pub pools: PoolConfig,
    /// Upper bound for each dependency check
    pub health_check_timeout: Duration,
    /// How long an accepted webhook signature is remembered
    pub replay_window: Duration,
    /// Allowed browser origins; empty allows any
    pub cors_origins: Vec<String>,
}

impl AppSettings {
    #[must_use]
    pub fn new(webhook_secret: SecretString, pools: PoolConfig) -> Self {
        Self {
            environment: "development".to_string(),
            solana_network: SolanaNetwork::Devnet,
            webhook_secret,
            pools,
            health_check_timeout: Duration::from_secs(5),
            replay_window: DEFAULT_REPLAY_WINDOW,
            cors_origins: Vec::new(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AppService>,
    pub wallet_service: Arc<WalletService>,
    pub db_client: Arc<dyn DatabaseClient>,
    pub blockchain_client: Arc<dyn BlockchainClient>,
    pub cache_client: Arc<dyn CacheClient>,
    pub authenticator: Arc<JwtAuthenticator>,
}

impl AppState {
    /// Create a new application state
    #[must_use]
    pub fn new(
        db_client: Arc<dyn DatabaseClient>,
        blockchain_client: Arc<dyn BlockchainClient>,
        cache_client: Arc<dyn CacheClient>,
        authenticator: Arc<JwtAuthenticator>,
        settings: AppSettings,
    ) -> Self {
        let service = Arc::new(AppService::new(
            Arc::clone(&db_client),
            Arc::clone(&blockchain_client),
            Arc::clone(&cache_client),
            settings,
        ));
        let wallet_service = Arc::new(WalletService::new(
            Arc::clone(&db_client),
            Arc::clone(&blockchain_client),
        ));
        Self {
            service,
            wallet_service,
            db_client,
            blockchain_client,
            cache_client,
            authenticator,
        }
    }
}
