//! Cache client implementations.

pub mod redis;

pub use self::redis::RedisClient;
