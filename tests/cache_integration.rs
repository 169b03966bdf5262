//! Redis integration tests using testcontainers.
//!
//! These tests require Docker to be running.

use testcontainers::{GenericImage, core::WaitFor, runners::AsyncRunner};

use coria_backend::domain::CacheClient;
use coria_backend::infra::RedisClient;

#[tokio::test]
async fn test_ping_real_redis() {
    let container = GenericImage::new("redis", "7-alpine")
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
        .start()
        .await
        .expect("Failed to start redis container");

    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to get redis port");

    let client = RedisClient::new(&format!("redis://127.0.0.1:{}/0", port)).unwrap();
    assert!(client.ping().await.is_ok());
}

#[tokio::test]
async fn test_ping_after_server_stops() {
    let container = GenericImage::new("redis", "7-alpine")
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
        .start()
        .await
        .expect("Failed to start redis container");
    let port = container.get_host_port_ipv4(6379).await.unwrap();
    let client = RedisClient::new(&format!("redis://127.0.0.1:{}/0", port)).unwrap();
    assert!(client.ping().await.is_ok());

    container.stop().await.expect("Failed to stop redis container");
    assert!(client.ping().await.is_err());
}
