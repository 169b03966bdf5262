//! Domain types with validation support.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Lamports in one SOL
pub const LAMPORTS_PER_SOL: i64 = 1_000_000_000;

/// Smallest accepted payment (0.000001 SOL)
pub const MIN_PAYMENT_LAMPORTS: i64 = 1_000;

/// Confirmation checks allowed before a pending payment is failed
pub const MAX_CONFIRMATION_ATTEMPTS: i32 = 20;

/// How long a pending payment and its idempotency key stay valid
pub const PAYMENT_TTL_HOURS: i64 = 24;

/// Length of one premium period bought with a single payment
pub const PREMIUM_DURATION_DAYS: i32 = 30;

/// Convert a SOL amount to lamports, rounding to the nearest lamport.
#[must_use]
pub fn sol_to_lamports(sol: f64) -> i64 {
    (sol * LAMPORTS_PER_SOL as f64).round() as i64
}

/// Convert lamports to SOL.
#[must_use]
pub fn lamports_to_sol(lamports: i64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Whether a string is a base58 Solana public key (32 bytes).
#[must_use]
pub fn is_valid_solana_address(address: &str) -> bool {
    (32..=44).contains(&address.len())
        && bs58::decode(address)
            .into_vec()
            .map(|bytes| bytes.len() == 32)
            .unwrap_or(false)
}

/// Whether a string is a base58 transaction signature (64 bytes).
#[must_use]
pub fn is_valid_tx_signature(signature: &str) -> bool {
    (64..=88).contains(&signature.len())
        && bs58::decode(signature)
            .into_vec()
            .map(|bytes| bytes.len() == 64)
            .unwrap_or(false)
}

fn validate_solana_address(address: &str) -> Result<(), validator::ValidationError> {
    if is_valid_solana_address(address) {
        return Ok(());
    }
    let mut err = validator::ValidationError::new("solana_address");
    err.message = Some("must be a base58 Solana address".into());
    Err(err)
}

fn validate_tx_signature(signature: &str) -> Result<(), validator::ValidationError> {
    if is_valid_tx_signature(signature) {
        return Ok(());
    }
    let mut err = validator::ValidationError::new("tx_signature");
    err.message = Some("must be a base58 transaction signature".into());
    Err(err)
}

fn validate_metadata(metadata: &Value) -> Result<(), validator::ValidationError> {
    if metadata.is_object() {
        return Ok(());
    }
    let mut err = validator::ValidationError::new("metadata");
    err.message = Some("must be a JSON object".into());
    Err(err)
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

// ============================================================================
// ENUMERATIONS
// ============================================================================

/// How the wallet's keys are held
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    /// Keys held by the platform
    Custodial,
    /// User-controlled wallet (Phantom, Backpack, ...)
    External,
}

impl WalletType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Custodial => "custodial",
            Self::External => "external",
        }
    }
}

impl std::str::FromStr for WalletType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "custodial" => Ok(Self::Custodial),
            "external" => Ok(Self::External),
            _ => Err(format!("Invalid wallet type: {}", s)),
        }
    }
}

impl std::fmt::Display for WalletType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a payment pays for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Donation,
    Premium,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Donation => "donation",
            Self::Premium => "premium",
        }
    }

    /// Ledger reason recorded when a payment of this kind is confirmed
    pub fn ledger_reason(&self) -> &'static str {
        match self {
            Self::Donation => "donation_sent",
            Self::Premium => "premium_payment",
        }
    }
}

impl std::str::FromStr for PaymentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "donation" => Ok(Self::Donation),
            "premium" => Ok(Self::Premium),
            _ => Err(format!("Invalid payment kind: {}", s)),
        }
    }
}

impl std::fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a payment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Created, waiting for on-chain confirmation
    #[default]
    Pending,
    /// Verified on-chain and booked to the ledger
    Confirmed,
    /// Rejected, expired, or failed on-chain
    Failed,
    /// Returned to the payer
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Premium subscription state of a user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PremiumStatus {
    #[default]
    None,
    Active,
    Expired,
}

impl PremiumStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Active => "active",
            Self::Expired => "expired",
        }
    }
}

impl std::str::FromStr for PremiumStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Invalid premium status: {}", s)),
        }
    }
}

impl std::fmt::Display for PremiumStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Solana cluster the service talks to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
pub enum SolanaNetwork {
    #[default]
    #[serde(rename = "devnet")]
    Devnet,
    #[serde(rename = "testnet")]
    Testnet,
    #[serde(rename = "mainnet-beta")]
    MainnetBeta,
}

impl SolanaNetwork {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Devnet => "devnet",
            Self::Testnet => "testnet",
            Self::MainnetBeta => "mainnet-beta",
        }
    }

    /// Public RPC endpoint for the cluster
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Self::Devnet => "https://api.devnet.solana.com",
            Self::Testnet => "https://api.testnet.solana.com",
            Self::MainnetBeta => "https://api.mainnet-beta.solana.com",
        }
    }
}

impl std::str::FromStr for SolanaNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "devnet" => Ok(Self::Devnet),
            "testnet" => Ok(Self::Testnet),
            "mainnet-beta" | "mainnet" => Ok(Self::MainnetBeta),
            _ => Err(format!("Invalid Solana network: {}", s)),
        }
    }
}

impl std::fmt::Display for SolanaNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

/// A wallet registered to a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolanaWallet {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Base58 public key
    #[schema(example = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM")]
    pub public_key: String,
    #[serde(rename = "type")]
    pub wallet_type: WalletType,
    #[schema(example = "phantom")]
    pub provider: Option<String>,
    pub is_primary: bool,
    pub name: Option<String>,
    pub balance_lamports: i64,
    pub last_balance_update: DateTime<Utc>,
    pub is_active: bool,
    #[schema(value_type = Object)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A donation or premium payment tracked until it is seen on-chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolanaPayment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    #[serde(rename = "type")]
    pub kind: PaymentKind,
    #[schema(example = 1_000_000_000)]
    pub amount_lamports: i64,
    #[schema(example = 1.0)]
    pub amount_sol: f64,
    pub tx_signature: Option<String>,
    pub status: PaymentStatus,
    /// Pool address the transfer must land in
    pub destination_address: String,
    pub idempotency_key: String,
    pub confirmation_attempts: i32,
    pub last_confirmation_check: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl SolanaPayment {
    /// Whether the payment window has closed
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Premium-related profile of a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: Option<String>,
    pub premium_status: PremiumStatus,
    pub premium_expires_at: Option<DateTime<Utc>>,
    pub premium_activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audit trail entry for wallet and payment actions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletActivity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Option<Uuid>,
    #[schema(example = "wallet_connected")]
    pub activity_type: String,
    pub description: Option<String>,
    pub tx_signature: Option<String>,
    pub amount_lamports: Option<i64>,
    #[schema(value_type = Object)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Booked movement of funds for a confirmed payment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub payment_id: Uuid,
    pub delta_lamports: i64,
    #[schema(example = "donation_sent")]
    pub reason: String,
    pub tx_signature: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// PERSISTENCE INPUTS
// ============================================================================

/// Wallet row to insert
#[derive(Debug, Clone)]
pub struct NewWallet {
    pub user_id: Uuid,
    pub public_key: String,
    pub wallet_type: WalletType,
    pub provider: Option<String>,
    pub name: Option<String>,
    pub is_primary: bool,
    pub metadata: Value,
}

/// Partial wallet update; `None` leaves a column untouched
#[derive(Debug, Clone, Default)]
pub struct WalletUpdate {
    pub name: Option<String>,
    pub is_primary: Option<bool>,
    pub metadata: Option<Value>,
}

/// Payment row to insert together with its idempotency key
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub kind: PaymentKind,
    pub amount_lamports: i64,
    pub destination_address: String,
    pub tx_signature: Option<String>,
    pub idempotency_key: String,
    pub metadata: Value,
    pub expires_at: DateTime<Utc>,
}

/// Activity row to insert
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: Uuid,
    pub wallet_id: Option<Uuid>,
    pub activity_type: String,
    pub description: Option<String>,
    pub tx_signature: Option<String>,
    pub amount_lamports: Option<i64>,
    pub metadata: Value,
}

impl NewActivity {
    #[must_use]
    pub fn new(user_id: Uuid, activity_type: impl Into<String>) -> Self {
        Self {
            user_id,
            wallet_id: None,
            activity_type: activity_type.into(),
            description: None,
            tx_signature: None,
            amount_lamports: None,
            metadata: empty_object(),
        }
    }
}

/// What the store booked when a payment was confirmed
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationRecord {
    pub ledger_entry_id: Uuid,
    pub premium_expires_at: Option<DateTime<Utc>>,
}

// ============================================================================
// ON-CHAIN VIEWS
// ============================================================================

/// Status of a transaction signature on the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    /// The cluster has never seen the signature
    Unknown,
    /// Seen but below `confirmed` commitment
    Pending,
    /// Confirmed or finalized without error
    Confirmed,
    /// Landed with an execution error
    Failed(String),
}

/// A System Program transfer found in a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInfo {
    pub source: String,
    pub destination: String,
    pub lamports: i64,
}

/// The parts of a confirmed transaction needed to verify a payment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfirmedTransaction {
    pub error: Option<String>,
    pub transfers: Vec<TransferInfo>,
}

// ============================================================================
// REQUESTS
// ============================================================================

/// Connect a user-controlled wallet
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectWalletRequest {
    #[validate(custom(function = "validate_solana_address"))]
    #[schema(example = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM")]
    pub public_key: String,
    #[validate(length(min = 1, max = 64, message = "Provider must be 1-64 characters"))]
    #[schema(example = "phantom")]
    pub provider: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    #[schema(example = "My Phantom Wallet")]
    pub name: Option<String>,
    pub is_primary: Option<bool>,
    #[validate(custom(function = "validate_metadata"))]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
}

/// Update wallet attributes
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWalletRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    pub is_primary: Option<bool>,
    #[validate(custom(function = "validate_metadata"))]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
}

impl From<UpdateWalletRequest> for WalletUpdate {
    fn from(req: UpdateWalletRequest) -> Self {
        Self {
            name: req.name,
            is_primary: req.is_primary,
            metadata: req.metadata,
        }
    }
}

/// Create a pending payment
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub wallet_id: Uuid,
    #[serde(rename = "type")]
    pub kind: PaymentKind,
    #[validate(range(
        min = 1000,
        message = "Minimum amount is 1000 lamports (0.000001 SOL)"
    ))]
    #[schema(example = 1_000_000_000)]
    pub amount_lamports: i64,
    #[validate(length(min = 1, max = 255, message = "Idempotency key must be 1-255 characters"))]
    #[schema(example = "2f8c1a60-checkout-1")]
    pub idempotency_key: String,
    #[validate(custom(function = "validate_tx_signature"))]
    pub tx_signature: Option<String>,
    #[validate(custom(function = "validate_metadata"))]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
}

impl CreatePaymentRequest {
    #[must_use]
    pub fn new(
        wallet_id: Uuid,
        kind: PaymentKind,
        amount_lamports: i64,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            wallet_id,
            kind,
            amount_lamports,
            idempotency_key: idempotency_key.into(),
            tx_signature: None,
            metadata: None,
        }
    }
}

/// Attach the transaction that pays a pending payment
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachSignatureRequest {
    #[validate(custom(function = "validate_tx_signature"))]
    pub tx_signature: String,
}

/// Pagination and filter parameters of `GET /payments`
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PaymentListParams {
    /// Maximum number of items to return (1-100, default: 20)
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    #[serde(default = "default_limit")]
    #[schema(example = 20)]
    pub limit: i64,
    /// Cursor for pagination (ID to start after)
    pub cursor: Option<Uuid>,
    /// Only return payments of this kind
    #[serde(rename = "type")]
    pub kind: Option<PaymentKind>,
}

fn default_limit() -> i64 {
    20
}

impl Default for PaymentListParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            cursor: None,
            kind: None,
        }
    }
}

/// Look-back window for payment statistics
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StatsParams {
    /// Days to look back (1-365, default: 30)
    #[serde(default = "default_stats_days")]
    pub days: i64,
}

fn default_stats_days() -> i64 {
    30
}

/// Size of the activity feed
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ActivityParams {
    /// Entries to return (1-100, default: 20)
    #[serde(default = "default_limit")]
    pub limit: i64,
}

// ============================================================================
// RESPONSES
// ============================================================================

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T: ToSchema> {
    /// List of items
    pub items: Vec<T>,
    /// Cursor for next page (null if no more items)
    pub next_cursor: Option<Uuid>,
    /// Whether more items exist
    pub has_more: bool,
}

impl<T: ToSchema> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<Uuid>, has_more: bool) -> Self {
        Self {
            items,
            next_cursor,
            has_more,
        }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }
}

/// Result of a confirmation attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationOutcome {
    Confirmed,
    Failed,
    /// The transaction does not pay what the payment expects
    Mismatch,
    /// Not settled yet; try again later
    Pending,
}

/// Response of `POST /payments/{id}/confirm`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmationResult {
    pub payment_id: Uuid,
    pub status: ConfirmationOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_entry_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub premium_activated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub premium_expires_at: Option<DateTime<Utc>>,
}

impl PaymentConfirmationResult {
    #[must_use]
    pub fn with_reason(
        payment_id: Uuid,
        status: ConfirmationOutcome,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            payment_id,
            status,
            reason: Some(reason.into()),
            ledger_entry_id: None,
            premium_activated: None,
            premium_expires_at: None,
        }
    }
}

/// Pool addresses and pricing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    pub donation_pool: String,
    pub premium_pool: String,
    #[schema(example = 1.0)]
    pub premium_price_sol: f64,
    #[schema(example = 30)]
    pub premium_duration_days: i32,
}

impl PoolConfig {
    /// Pool that receives payments of the given kind
    #[must_use]
    pub fn destination_for(&self, kind: PaymentKind) -> &str {
        match kind {
            PaymentKind::Donation => &self.donation_pool,
            PaymentKind::Premium => &self.premium_pool,
        }
    }

    /// Minimum lamports for a premium payment
    #[must_use]
    pub fn premium_price_lamports(&self) -> i64 {
        sol_to_lamports(self.premium_price_sol)
    }
}

/// A balance in both units
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Balance {
    pub lamports: i64,
    pub sol: f64,
}

impl Balance {
    #[must_use]
    pub fn from_lamports(lamports: i64) -> Self {
        Self {
            lamports,
            sol: lamports_to_sol(lamports),
        }
    }
}

/// Response of `GET /wallets/me`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletSummary {
    pub wallets: Vec<SolanaWallet>,
    pub primary: Option<SolanaWallet>,
    pub total_balance: Balance,
}

/// Aggregated payment counts for a period
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStats {
    pub total_payments: i64,
    pub confirmed_payments: i64,
    pub failed_payments: i64,
    pub pending_payments: i64,
    /// Confirmed volume in lamports
    pub total_amount_lamports: i64,
    pub donation_amount_lamports: i64,
    pub premium_amount_lamports: i64,
}

/// Premium state as shown to the user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PremiumInfo {
    pub premium_status: PremiumStatus,
    pub premium_expires_at: Option<DateTime<Utc>>,
    pub premium_activated_at: Option<DateTime<Utc>>,
    pub is_premium_active: bool,
}

impl PremiumInfo {
    /// Derive the view from a profile; users without a profile have no premium
    #[must_use]
    pub fn from_profile(profile: Option<&UserProfile>, now: DateTime<Utc>) -> Self {
        match profile {
            Some(p) => Self {
                premium_status: p.premium_status,
                premium_expires_at: p.premium_expires_at,
                premium_activated_at: p.premium_activated_at,
                is_premium_active: p.premium_status == PremiumStatus::Active
                    && p.premium_expires_at.is_some_and(|exp| exp > now),
            },
            None => Self {
                premium_status: PremiumStatus::None,
                premium_expires_at: None,
                premium_activated_at: None,
                is_premium_active: false,
            },
        }
    }
}

/// Response of `GET /payments/stats`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserPaymentStats {
    pub user_id: Uuid,
    pub period_days: i64,
    pub period_start: DateTime<Utc>,
    pub total_amount_sol: f64,
    pub donation_amount_sol: f64,
    pub premium_amount_sol: f64,
    pub payment_stats: PaymentStats,
    pub premium_info: PremiumInfo,
}

/// All-time confirmed donations of a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct DonationTotal {
    pub total_sol: f64,
    pub total_lamports: i64,
    pub count: i64,
}

impl DonationTotal {
    #[must_use]
    pub fn new(total_lamports: i64, count: i64) -> Self {
        Self {
            total_sol: lamports_to_sol(total_lamports),
            total_lamports,
            count,
        }
    }
}

/// SOL to lamports conversion result
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SolToLamportsResponse {
    pub sol: f64,
    pub lamports: i64,
}

/// Lamports to SOL conversion result
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LamportsToSolResponse {
    pub lamports: i64,
    pub sol: f64,
}

// ============================================================================
// WEBHOOKS
// ============================================================================

/// Acknowledgement returned to webhook senders
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct WebhookAck {
    pub success: bool,
}

/// A transaction notification from a chain indexer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolanaWebhookEvent {
    /// Transaction signature
    pub signature: String,
    /// Execution error, absent or null on success
    #[serde(default, alias = "err")]
    #[schema(value_type = Option<Object>)]
    pub transaction_error: Option<Value>,
}

/// Solana webhooks arrive either one event at a time or batched.
///
/// Batch elements are parsed one by one so a malformed element does not
/// hide the valid events delivered next to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolanaWebhookPayload {
    pub events: Vec<SolanaWebhookEvent>,
    /// Position and parse error of each element that is not a transaction event
    pub rejected: Vec<(usize, String)>,
}

impl SolanaWebhookPayload {
    #[must_use]
    pub fn parse(payload: &Value) -> Self {
        let items = match payload {
            Value::Array(items) => items.as_slice(),
            single => std::slice::from_ref(single),
        };

        let mut parsed = Self::default();
        for (index, item) in items.iter().enumerate() {
            match SolanaWebhookEvent::deserialize(item) {
                Ok(event) => parsed.events.push(event),
                Err(e) => parsed.rejected.push((index, e.to_string())),
            }
        }
        parsed
    }
}

/// Status reported by the payment processor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentWebhookStatus {
    Confirmed,
    Failed,
}

/// A payment status notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhookEvent {
    pub payment_id: Uuid,
    pub status: PaymentWebhookStatus,
    pub tx_signature: Option<String>,
    pub reason: Option<String>,
}

// ============================================================================
// HEALTH
// ============================================================================

/// Outcome of a single dependency check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Error,
}

/// A dependency check result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ServiceCheck {
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServiceCheck {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: CheckStatus::Ok,
            message: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Error,
            message: Some(message.into()),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == CheckStatus::Ok
    }
}

/// Overall service health
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every dependency answered
    Ok,
    /// At least one dependency failed
    Degraded,
}

/// Per-dependency check results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct HealthServices {
    pub database: ServiceCheck,
    pub redis: ServiceCheck,
    pub solana_rpc: ServiceCheck,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    #[schema(example = "production")]
    pub environment: String,
    #[schema(example = "devnet")]
    pub solana_network: String,
    #[schema(example = "0.1.0")]
    pub version: String,
    pub services: HealthServices,
}

impl HealthResponse {
    #[must_use]
    pub fn new(environment: String, solana_network: String, services: HealthServices) -> Self {
        let all_ok =
            services.database.is_ok() && services.redis.is_ok() && services.solana_rpc.is_ok();
        Self {
            status: if all_ok {
                HealthStatus::Ok
            } else {
                HealthStatus::Degraded
            },
            timestamp: Utc::now(),
            environment,
            solana_network,
            version: env!("CARGO_PKG_VERSION").to_string(),
            services,
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Error response structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
}

/// Error detail structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Error type identifier
    #[schema(example = "validation_error")]
    pub r#type: String,
    /// Human-readable error message
    #[schema(example = "Minimum amount is 1000 lamports (0.000001 SOL)")]
    pub message: String,
}

/// Rate limit exceeded response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RateLimitResponse {
    /// Error details
    pub error: ErrorDetail,
    /// Seconds until rate limit resets
    #[schema(example = 60)]
    pub retry_after: u64,
}
