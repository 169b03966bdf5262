//! Redis client, used to ping the shared cache instance.

use async_trait::async_trait;
use tracing::instrument;

use crate::domain::{AppError, CacheClient, ExternalServiceError};

/// Redis client over a multiplexed async connection
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    /// Create a client from a `redis://` URL. No connection is opened yet.
    pub fn new(url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(url).map_err(|e| {
            AppError::ExternalService(ExternalServiceError::Configuration(format!(
                "Invalid Redis URL: {}",
                e
            )))
        })?;
        Ok(Self { client })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, AppError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::ExternalService(ExternalServiceError::Cache(e.to_string())))
    }
}

#[async_trait]
impl CacheClient for RedisClient {
    #[instrument(skip(self))]
    async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.get_connection().await?;
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::ExternalService(ExternalServiceError::Cache(e.to_string())))?;

        if reply == "PONG" {
            Ok(())
        } else {
            Err(AppError::ExternalService(ExternalServiceError::Cache(
                format!("Unexpected PING reply: {}", reply),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_accepts_redis_url() {
        assert!(RedisClient::new("redis://127.0.0.1:6379/0").is_ok());
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        let err = RedisClient::new("not a url").err().unwrap();
        assert!(err.to_string().contains("Invalid Redis URL"));
    }

    #[tokio::test]
    async fn test_ping_unreachable_server_fails() {
        // Port 1 is reserved and never serves Redis
        let client = RedisClient::new("redis://127.0.0.1:1/").unwrap();
        assert!(client.ping().await.is_err());
    }
}
