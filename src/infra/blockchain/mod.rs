//! Blockchain client implementations.

pub mod solana;

pub use solana::{
    HttpSolanaRpcProvider, RpcBlockchainClient, RpcClientConfig, SolanaRpcProvider,
    parse_confirmed_transaction,
};
