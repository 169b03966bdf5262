//! CORIA backend: Solana wallets, SOL payments, premium subscriptions and
//! signed webhook ingestion.

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
