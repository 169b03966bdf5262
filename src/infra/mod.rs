//! Infrastructure layer implementations.

pub mod blockchain;
pub mod cache;
pub mod database;

pub use blockchain::{RpcBlockchainClient, RpcClientConfig};
pub use cache::RedisClient;
pub use database::{PostgresClient, PostgresConfig};
