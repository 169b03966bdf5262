//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod signature;
pub mod traits;
pub mod types;

pub use error::{
    AppError, BlockchainError, ConfigError, DatabaseError, ExternalServiceError, ValidationError,
    WebhookError,
};
pub use traits::{BlockchainClient, CacheClient, DatabaseClient};
pub use types::{
    ActivityParams, AttachSignatureRequest, Balance, CheckStatus, ConfirmationOutcome,
    ConfirmationRecord, ConfirmedTransaction, ConnectWalletRequest, CreatePaymentRequest,
    DonationTotal, ErrorDetail, ErrorResponse, HealthResponse, HealthServices, HealthStatus, LamportsToSolResponse,
    LedgerEntry, NewActivity, NewPayment, NewWallet, PaginatedResponse, PaymentListParams,
    PaymentConfirmationResult, PaymentKind, PaymentStats, PaymentStatus, PaymentWebhookEvent,
    PaymentWebhookStatus, PoolConfig, PremiumInfo, PremiumStatus, RateLimitResponse, ServiceCheck,
    SignatureState, SolToLamportsResponse, SolanaNetwork, SolanaPayment, SolanaWallet,
    SolanaWebhookEvent, SolanaWebhookPayload, StatsParams, TransferInfo, UpdateWalletRequest,
    UserPaymentStats, UserProfile, WalletActivity, WalletSummary, WalletType, WalletUpdate,
    WebhookAck,
};
