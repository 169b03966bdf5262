//! Domain traits defining contracts for external systems.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::AppError;
use super::types::{
    ConfirmationRecord, ConfirmedTransaction, DonationTotal, NewActivity, NewPayment, NewWallet,
    PaginatedResponse, PaymentKind, PaymentStats, SignatureState, SolanaPayment, SolanaWallet, UserProfile,
    WalletActivity, WalletUpdate,
};

/// Database client trait for persistence operations
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Check database connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    /// Get the premium profile of a user
    async fn get_user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppError>;

    /// End a premium subscription that is still running at `now`.
    ///
    /// The profile becomes `expired` with its expiry moved to `now`.
    /// Returns `None` when no active subscription was running.
    async fn cancel_premium(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<UserProfile>, AppError>;

    // ---- wallets ----

    /// Insert a wallet. A primary wallet clears the flag on the user's others.
    /// Fails with `DatabaseError::Duplicate` when the key is already active.
    async fn create_wallet(&self, wallet: &NewWallet) -> Result<SolanaWallet, AppError>;

    /// Get a wallet by ID, active or not
    async fn get_wallet(&self, id: Uuid) -> Result<Option<SolanaWallet>, AppError>;

    /// Get the active wallet holding a public key
    async fn get_active_wallet_by_public_key(
        &self,
        public_key: &str,
    ) -> Result<Option<SolanaWallet>, AppError>;

    /// List a user's active wallets, primary first then newest first
    async fn list_wallets(&self, user_id: Uuid) -> Result<Vec<SolanaWallet>, AppError>;

    /// Apply a partial update; `None` when the wallet is missing or inactive
    async fn update_wallet(
        &self,
        id: Uuid,
        update: &WalletUpdate,
    ) -> Result<Option<SolanaWallet>, AppError>;

    /// Soft-delete a wallet. Returns `false` when it was already inactive.
    async fn deactivate_wallet(&self, id: Uuid) -> Result<bool, AppError>;

    /// Persist a freshly fetched balance
    async fn update_wallet_balance(&self, id: Uuid, lamports: i64) -> Result<(), AppError>;

    /// Append to the activity log
    async fn record_activity(&self, activity: &NewActivity) -> Result<WalletActivity, AppError>;

    /// Most recent activities of a user
    async fn list_activities(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WalletActivity>, AppError>;

    // ---- payments ----

    /// Find the payment bound to an unexpired idempotency key
    async fn get_payment_by_idempotency_key(
        &self,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<SolanaPayment>, AppError>;

    /// Insert a pending payment and its idempotency record in one transaction
    async fn create_payment(&self, payment: &NewPayment) -> Result<SolanaPayment, AppError>;

    /// Get a payment by ID
    async fn get_payment(&self, id: Uuid) -> Result<Option<SolanaPayment>, AppError>;

    /// Get a payment by its transaction signature
    async fn get_payment_by_signature(
        &self,
        signature: &str,
    ) -> Result<Option<SolanaPayment>, AppError>;

    /// List a user's payments with cursor-based pagination, newest first,
    /// optionally restricted to one kind
    async fn list_payments(
        &self,
        user_id: Uuid,
        kind: Option<PaymentKind>,
        limit: i64,
        cursor: Option<Uuid>,
    ) -> Result<PaginatedResponse<SolanaPayment>, AppError>;

    /// Set the transaction signature of a pending payment
    async fn attach_payment_signature(
        &self,
        id: Uuid,
        signature: &str,
    ) -> Result<Option<SolanaPayment>, AppError>;

    /// Count a confirmation check; returns the new attempt count
    async fn record_confirmation_attempt(&self, id: Uuid) -> Result<i32, AppError>;

    /// Move a pending payment to `failed`. Returns `false` if it was not pending.
    async fn fail_payment(&self, id: Uuid, reason: &str) -> Result<bool, AppError>;

    /// Atomically confirm a pending payment, book the ledger entry and, for
    /// premium payments, extend the subscription by `premium_days`.
    ///
    /// Returns `None` when the payment was no longer pending.
    async fn confirm_payment(
        &self,
        payment: &SolanaPayment,
        premium_days: i32,
    ) -> Result<Option<ConfirmationRecord>, AppError>;

    /// Pending, unexpired payments with a signature, least recently checked first
    async fn get_confirmable_payments(&self, limit: i64) -> Result<Vec<SolanaPayment>, AppError>;

    /// Fail pending payments whose window closed before `now`
    async fn expire_stale_payments(&self, now: DateTime<Utc>) -> Result<u64, AppError>;

    /// Delete idempotency records that expired before `now`
    async fn purge_expired_idempotency_keys(&self, now: DateTime<Utc>) -> Result<u64, AppError>;

    /// Mark active premium profiles whose expiry passed as expired
    async fn expire_premium_profiles(&self, now: DateTime<Utc>) -> Result<u64, AppError>;

    /// Aggregate a user's payments created since `since`
    async fn payment_stats(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<PaymentStats, AppError>;

    /// Sum and count of a user's confirmed donations
    async fn donation_total(&self, user_id: Uuid) -> Result<DonationTotal, AppError>;
}

/// Blockchain client trait for chain reads
#[async_trait]
pub trait BlockchainClient: Send + Sync {
    /// Check blockchain RPC connectivity via `getHealth`
    async fn health_check(&self) -> Result<(), AppError>;

    /// Balance of an address in lamports
    async fn get_balance(&self, address: &str) -> Result<i64, AppError>;

    /// Commitment state of a transaction signature
    async fn get_signature_status(&self, signature: &str) -> Result<SignatureState, AppError>;

    /// Fetch a confirmed transaction; `None` when the node does not have it
    async fn get_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<ConfirmedTransaction>, AppError>;
}

/// Cache client trait, used for liveness probing
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Send `PING` and expect `PONG`
    async fn ping(&self) -> Result<(), AppError>;
}
