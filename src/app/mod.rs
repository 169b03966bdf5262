//! Application layer containing business logic and shared state.

pub mod replay;
pub mod service;
pub mod state;
pub mod wallet_service;
pub mod worker;

pub use replay::ReplayGuard;
pub use service::{AppService, MaintenanceReport};
pub use state::{AppSettings, AppState};
pub use wallet_service::WalletService;
pub use worker::{ConfirmationWorker, WorkerConfig, spawn_worker};
