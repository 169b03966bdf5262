//! Test helpers: in-memory mocks and a ready-made application state.

pub mod mocks;

use std::sync::Arc;

use jsonwebtoken::{EncodingKey, Header, encode};
use secrecy::SecretString;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::api::auth::{JwtAuthenticator, SUPABASE_AUDIENCE};
use crate::app::{AppSettings, AppState};
use crate::domain::{PoolConfig, signature};

pub use mocks::{
    MockBlockchainClient, MockCacheClient, MockConfig, MockDatabaseClient, sample_wallet,
};

pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const TEST_JWT_SECRET: &str = "test-jwt-secret-with-at-least-32-characters";

/// Deterministic base58 public key (32 bytes of `seed`)
#[must_use]
pub fn test_pubkey(seed: u8) -> String {
    bs58::encode([seed; 32]).into_string()
}

/// Deterministic base58 transaction signature (64 bytes of `seed`)
#[must_use]
pub fn test_tx_signature(seed: u8) -> String {
    bs58::encode([seed; 64]).into_string()
}

#[must_use]
pub fn test_pools() -> PoolConfig {
    PoolConfig {
        donation_pool: test_pubkey(201),
        premium_pool: test_pubkey(202),
        premium_price_sol: 1.0,
        premium_duration_days: 30,
    }
}

#[must_use]
pub fn test_settings() -> AppSettings {
    AppSettings::new(SecretString::from(TEST_WEBHOOK_SECRET.to_string()), test_pools())
}

/// Sign a webhook body the way a sender would
#[must_use]
pub fn sign_webhook(payload: &Value) -> String {
    signature::sign(payload, TEST_WEBHOOK_SECRET.as_bytes())
}

/// A Supabase-style access token for `user_id`, valid for an hour
#[must_use]
pub fn issue_test_token(user_id: Uuid) -> String {
    let claims = json!({
        "sub": user_id,
        "aud": SUPABASE_AUDIENCE,
        "role": "authenticated",
        "email": format!("{}@example.com", user_id.simple()),
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("test token encodes")
}

/// Mocks wired into an [`AppState`], kept accessible for assertions
pub struct TestContext {
    pub db: Arc<MockDatabaseClient>,
    pub blockchain: Arc<MockBlockchainClient>,
    pub cache: Arc<MockCacheClient>,
    pub state: Arc<AppState>,
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    #[must_use]
    pub fn with_settings(settings: AppSettings) -> Self {
        Self::with_clients(
            Arc::new(MockDatabaseClient::new()),
            Arc::new(MockBlockchainClient::new()),
            settings,
        )
    }

    #[must_use]
    pub fn with_clients(
        db: Arc<MockDatabaseClient>,
        blockchain: Arc<MockBlockchainClient>,
        settings: AppSettings,
    ) -> Self {
        let cache = Arc::new(MockCacheClient::new());
        let state = Arc::new(AppState::new(
            Arc::clone(&db) as _,
            Arc::clone(&blockchain) as _,
            Arc::clone(&cache) as _,
            Arc::new(JwtAuthenticator::from_secret(TEST_JWT_SECRET.as_bytes())),
            settings,
        ));
        Self {
            db,
            blockchain,
            cache,
            state,
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
