//! Mock implementations for testing.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::domain::types::{PAYMENT_TTL_HOURS, lamports_to_sol};
use crate::domain::{
    AppError, BlockchainClient, BlockchainError, CacheClient, ConfirmationRecord,
    ConfirmedTransaction, DatabaseClient, DatabaseError, DonationTotal, ExternalServiceError,
    LedgerEntry,
    NewActivity, NewPayment, NewWallet, PaginatedResponse, PaymentKind, PaymentStats,
    PaymentStatus, PremiumStatus, SignatureState, SolanaPayment, SolanaWallet, TransferInfo,
    UserProfile, ValidationError, WalletActivity, WalletUpdate,
};

/// Configuration for mock behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub should_fail: bool,
    pub error_message: Option<String>,
}

impl MockConfig {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
        }
    }

    fn message(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| "Mock error".to_string())
    }
}

#[derive(Default)]
struct MockStore {
    profiles: HashMap<Uuid, UserProfile>,
    wallets: HashMap<Uuid, SolanaWallet>,
    payments: HashMap<Uuid, SolanaPayment>,
    /// (user, key) -> (payment, expires_at)
    idempotency: HashMap<(Uuid, String), (Uuid, DateTime<Utc>)>,
    ledger: Vec<LedgerEntry>,
    activities: Vec<WalletActivity>,
    /// Wallet committed by a concurrent connect just before the next insert
    racing_wallet: Option<NewWallet>,
}

/// In-memory database with the same guarantees as the Postgres store
pub struct MockDatabaseClient {
    store: Arc<Mutex<MockStore>>,
    config: MockConfig,
    is_healthy: AtomicBool,
}

impl MockDatabaseClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            store: Arc::new(Mutex::new(MockStore::default())),
            config,
            is_healthy: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// All stored payments (for testing)
    pub fn payments(&self) -> Vec<SolanaPayment> {
        self.store.lock().unwrap().payments.values().cloned().collect()
    }

    /// All booked ledger entries (for testing)
    pub fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.store.lock().unwrap().ledger.clone()
    }

    /// All recorded activities (for testing)
    pub fn activities(&self) -> Vec<WalletActivity> {
        self.store.lock().unwrap().activities.clone()
    }

    /// Stored profile of a user (for testing)
    pub fn profile(&self, user_id: Uuid) -> Option<UserProfile> {
        self.store.lock().unwrap().profiles.get(&user_id).cloned()
    }

    /// Insert or replace a profile (for testing)
    pub fn put_profile(&self, profile: UserProfile) {
        self.store
            .lock()
            .unwrap()
            .profiles
            .insert(profile.id, profile);
    }

    /// Let `winner` be inserted concurrently ahead of the next wallet insert (for testing)
    pub fn race_next_wallet_insert(&self, winner: NewWallet) {
        self.store.lock().unwrap().racing_wallet = Some(winner);
    }

    /// Mutate a stored payment in place (for testing)
    pub fn modify_payment(&self, id: Uuid, f: impl FnOnce(&mut SolanaPayment)) {
        if let Some(payment) = self.store.lock().unwrap().payments.get_mut(&id) {
            f(payment);
        }
    }

    /// Mutate a stored idempotency record's expiry (for testing)
    pub fn expire_idempotency_key(&self, user_id: Uuid, key: &str, at: DateTime<Utc>) {
        if let Some(entry) = self
            .store
            .lock()
            .unwrap()
            .idempotency
            .get_mut(&(user_id, key.to_string()))
        {
            entry.1 = at;
        }
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            return Err(AppError::Database(DatabaseError::Query(
                self.config.message(),
            )));
        }
        Ok(())
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

fn clear_other_primaries(store: &mut MockStore, user_id: Uuid, keep: Uuid) {
    for wallet in store.wallets.values_mut() {
        if wallet.user_id == user_id && wallet.id != keep && wallet.is_primary {
            wallet.is_primary = false;
            wallet.updated_at = Utc::now();
        }
    }
}

fn insert_wallet(store: &mut MockStore, wallet: &NewWallet) -> Result<SolanaWallet, AppError> {
    if store
        .wallets
        .values()
        .any(|w| w.is_active && w.public_key == wallet.public_key)
    {
        return Err(AppError::Database(DatabaseError::Duplicate(
            "duplicate key value violates unique constraint \"idx_solana_wallets_active_public_key\""
                .to_string(),
        )));
    }

    let now = Utc::now();
    let created = SolanaWallet {
        id: Uuid::new_v4(),
        user_id: wallet.user_id,
        public_key: wallet.public_key.clone(),
        wallet_type: wallet.wallet_type,
        provider: wallet.provider.clone(),
        is_primary: wallet.is_primary,
        name: wallet.name.clone(),
        balance_lamports: 0,
        last_balance_update: now,
        is_active: true,
        metadata: wallet.metadata.clone(),
        created_at: now,
        updated_at: now,
    };
    if created.is_primary {
        clear_other_primaries(store, created.user_id, created.id);
    }
    store.wallets.insert(created.id, created.clone());
    Ok(created)
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Connection(
                "Unhealthy".to_string(),
            )));
        }
        self.check_should_fail()
    }

    async fn get_user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppError> {
        self.check_should_fail()?;
        Ok(self.profile(user_id))
    }

    async fn cancel_premium(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<UserProfile>, AppError> {
        self.check_should_fail()?;
        let mut store = self.store.lock().unwrap();
        let Some(profile) = store.profiles.get_mut(&user_id) else {
            return Ok(None);
        };
        let running = profile.premium_status == PremiumStatus::Active
            && profile.premium_expires_at.is_some_and(|exp| exp > now);
        if !running {
            return Ok(None);
        }
        profile.premium_status = PremiumStatus::Expired;
        profile.premium_expires_at = Some(now);
        profile.updated_at = now;
        Ok(Some(profile.clone()))
    }

    async fn create_wallet(&self, wallet: &NewWallet) -> Result<SolanaWallet, AppError> {
        self.check_should_fail()?;
        let mut store = self.store.lock().unwrap();
        if let Some(winner) = store.racing_wallet.take() {
            insert_wallet(&mut store, &winner)?;
            if winner.is_primary && wallet.is_primary && winner.user_id == wallet.user_id {
                return Err(AppError::Database(DatabaseError::Duplicate(
                    "duplicate key value violates unique constraint \"idx_solana_wallets_primary_per_user\""
                        .to_string(),
                )));
            }
        }
        insert_wallet(&mut store, wallet)
    }

    async fn get_wallet(&self, id: Uuid) -> Result<Option<SolanaWallet>, AppError> {
        self.check_should_fail()?;
        Ok(self.store.lock().unwrap().wallets.get(&id).cloned())
    }

    async fn get_active_wallet_by_public_key(
        &self,
        public_key: &str,
    ) -> Result<Option<SolanaWallet>, AppError> {
        self.check_should_fail()?;
        Ok(self
            .store
            .lock()
            .unwrap()
            .wallets
            .values()
            .find(|w| w.is_active && w.public_key == public_key)
            .cloned())
    }

    async fn list_wallets(&self, user_id: Uuid) -> Result<Vec<SolanaWallet>, AppError> {
        self.check_should_fail()?;
        let store = self.store.lock().unwrap();
        let mut wallets: Vec<SolanaWallet> = store
            .wallets
            .values()
            .filter(|w| w.user_id == user_id && w.is_active)
            .cloned()
            .collect();
        wallets.sort_by(|a, b| {
            b.is_primary
                .cmp(&a.is_primary)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(wallets)
    }

    async fn update_wallet(
        &self,
        id: Uuid,
        update: &WalletUpdate,
    ) -> Result<Option<SolanaWallet>, AppError> {
        self.check_should_fail()?;
        let mut store = self.store.lock().unwrap();
        let Some(user_id) = store
            .wallets
            .get(&id)
            .filter(|w| w.is_active)
            .map(|w| w.user_id)
        else {
            return Ok(None);
        };
        if update.is_primary == Some(true) {
            clear_other_primaries(&mut store, user_id, id);
        }
        let Some(wallet) = store.wallets.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            wallet.name = Some(name.clone());
        }
        if let Some(is_primary) = update.is_primary {
            wallet.is_primary = is_primary;
        }
        if let Some(metadata) = &update.metadata {
            wallet.metadata = metadata.clone();
        }
        wallet.updated_at = Utc::now();
        Ok(Some(wallet.clone()))
    }

    async fn deactivate_wallet(&self, id: Uuid) -> Result<bool, AppError> {
        self.check_should_fail()?;
        let mut store = self.store.lock().unwrap();
        match store.wallets.get_mut(&id) {
            Some(wallet) if wallet.is_active => {
                wallet.is_active = false;
                wallet.is_primary = false;
                wallet.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_wallet_balance(&self, id: Uuid, lamports: i64) -> Result<(), AppError> {
        self.check_should_fail()?;
        let mut store = self.store.lock().unwrap();
        if let Some(wallet) = store.wallets.get_mut(&id) {
            let now = Utc::now();
            wallet.balance_lamports = lamports;
            wallet.last_balance_update = now;
            wallet.updated_at = now;
        }
        Ok(())
    }

    async fn record_activity(&self, activity: &NewActivity) -> Result<WalletActivity, AppError> {
        self.check_should_fail()?;
        let entry = WalletActivity {
            id: Uuid::new_v4(),
            user_id: activity.user_id,
            wallet_id: activity.wallet_id,
            activity_type: activity.activity_type.clone(),
            description: activity.description.clone(),
            tx_signature: activity.tx_signature.clone(),
            amount_lamports: activity.amount_lamports,
            metadata: activity.metadata.clone(),
            created_at: Utc::now(),
        };
        self.store.lock().unwrap().activities.push(entry.clone());
        Ok(entry)
    }

    async fn list_activities(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WalletActivity>, AppError> {
        self.check_should_fail()?;
        let store = self.store.lock().unwrap();
        Ok(store
            .activities
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get_payment_by_idempotency_key(
        &self,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<SolanaPayment>, AppError> {
        self.check_should_fail()?;
        let store = self.store.lock().unwrap();
        let now = Utc::now();
        Ok(store
            .idempotency
            .get(&(user_id, key.to_string()))
            .filter(|(_, expires_at)| *expires_at > now)
            .and_then(|(payment_id, _)| store.payments.get(payment_id).cloned()))
    }

    async fn create_payment(&self, payment: &NewPayment) -> Result<SolanaPayment, AppError> {
        self.check_should_fail()?;
        let mut store = self.store.lock().unwrap();
        let now = Utc::now();
        let idempotency = (payment.user_id, payment.idempotency_key.clone());

        if store
            .idempotency
            .get(&idempotency)
            .is_some_and(|(_, expires_at)| *expires_at > now)
        {
            return Err(AppError::Database(DatabaseError::Duplicate(
                "payment_idempotency_keys_pkey".to_string(),
            )));
        }
        if let Some(sig) = &payment.tx_signature {
            if store
                .payments
                .values()
                .any(|p| p.tx_signature.as_deref() == Some(sig.as_str()))
            {
                return Err(AppError::Database(DatabaseError::Duplicate(
                    "solana_payments_tx_signature_key".to_string(),
                )));
            }
        }

        let created = SolanaPayment {
            id: Uuid::new_v4(),
            user_id: payment.user_id,
            wallet_id: payment.wallet_id,
            kind: payment.kind,
            amount_lamports: payment.amount_lamports,
            amount_sol: lamports_to_sol(payment.amount_lamports),
            tx_signature: payment.tx_signature.clone(),
            status: PaymentStatus::Pending,
            destination_address: payment.destination_address.clone(),
            idempotency_key: payment.idempotency_key.clone(),
            confirmation_attempts: 0,
            last_confirmation_check: None,
            error_message: None,
            metadata: payment.metadata.clone(),
            created_at: now,
            updated_at: now,
            expires_at: payment.expires_at,
            confirmed_at: None,
            failed_at: None,
        };
        store.idempotency.insert(
            idempotency,
            (created.id, now + ChronoDuration::hours(PAYMENT_TTL_HOURS)),
        );
        store.payments.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<SolanaPayment>, AppError> {
        self.check_should_fail()?;
        Ok(self.store.lock().unwrap().payments.get(&id).cloned())
    }

    async fn get_payment_by_signature(
        &self,
        signature: &str,
    ) -> Result<Option<SolanaPayment>, AppError> {
        self.check_should_fail()?;
        Ok(self
            .store
            .lock()
            .unwrap()
            .payments
            .values()
            .find(|p| p.tx_signature.as_deref() == Some(signature))
            .cloned())
    }

    async fn list_payments(
        &self,
        user_id: Uuid,
        kind: Option<PaymentKind>,
        limit: i64,
        cursor: Option<Uuid>,
    ) -> Result<PaginatedResponse<SolanaPayment>, AppError> {
        self.check_should_fail()?;
        let store = self.store.lock().unwrap();
        let mut items: Vec<SolanaPayment> = store
            .payments
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let items = if let Some(cursor_id) = cursor {
            match items.iter().position(|p| p.id == cursor_id) {
                Some(pos) => items.into_iter().skip(pos + 1).collect(),
                None => {
                    return Err(AppError::Validation(ValidationError::InvalidField {
                        field: "cursor".to_string(),
                        message: "Invalid cursor".to_string(),
                    }));
                }
            }
        } else {
            items
        };
        let items: Vec<SolanaPayment> = items
            .into_iter()
            .filter(|p| kind.is_none_or(|k| p.kind == k))
            .collect();

        let limit = limit.clamp(1, 100) as usize;
        let has_more = items.len() > limit;
        let items: Vec<SolanaPayment> = items.into_iter().take(limit).collect();
        let next_cursor = if has_more {
            items.last().map(|p| p.id)
        } else {
            None
        };

        Ok(PaginatedResponse::new(items, next_cursor, has_more))
    }

    async fn attach_payment_signature(
        &self,
        id: Uuid,
        signature: &str,
    ) -> Result<Option<SolanaPayment>, AppError> {
        self.check_should_fail()?;
        let mut store = self.store.lock().unwrap();
        if store
            .payments
            .values()
            .any(|p| p.id != id && p.tx_signature.as_deref() == Some(signature))
        {
            return Err(AppError::Database(DatabaseError::Duplicate(
                "solana_payments_tx_signature_key".to_string(),
            )));
        }
        match store.payments.get_mut(&id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.tx_signature = Some(signature.to_string());
                payment.updated_at = Utc::now();
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_confirmation_attempt(&self, id: Uuid) -> Result<i32, AppError> {
        self.check_should_fail()?;
        let mut store = self.store.lock().unwrap();
        let payment = store
            .payments
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Payment {}", id)))?;
        let now = Utc::now();
        payment.confirmation_attempts += 1;
        payment.last_confirmation_check = Some(now);
        payment.updated_at = now;
        Ok(payment.confirmation_attempts)
    }

    async fn fail_payment(&self, id: Uuid, reason: &str) -> Result<bool, AppError> {
        self.check_should_fail()?;
        let mut store = self.store.lock().unwrap();
        match store.payments.get_mut(&id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                let now = Utc::now();
                payment.status = PaymentStatus::Failed;
                payment.error_message = Some(reason.to_string());
                payment.failed_at = Some(now);
                payment.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn confirm_payment(
        &self,
        payment: &SolanaPayment,
        premium_days: i32,
    ) -> Result<Option<ConfirmationRecord>, AppError> {
        self.check_should_fail()?;
        let mut store = self.store.lock().unwrap();
        let now = Utc::now();

        match store.payments.get_mut(&payment.id) {
            Some(stored) if stored.status == PaymentStatus::Pending => {
                stored.status = PaymentStatus::Confirmed;
                stored.confirmed_at = Some(now);
                stored.error_message = None;
                stored.updated_at = now;
            }
            _ => return Ok(None),
        }

        let ledger_entry_id = Uuid::new_v4();
        store.ledger.push(LedgerEntry {
            id: ledger_entry_id,
            user_id: payment.user_id,
            wallet_id: payment.wallet_id,
            payment_id: payment.id,
            delta_lamports: payment.amount_lamports,
            reason: payment.kind.ledger_reason().to_string(),
            tx_signature: payment.tx_signature.clone(),
            created_at: now,
        });

        let premium_expires_at = if payment.kind == PaymentKind::Premium {
            let profile = store.profiles.entry(payment.user_id).or_insert(UserProfile {
                id: payment.user_id,
                email: None,
                premium_status: PremiumStatus::None,
                premium_expires_at: None,
                premium_activated_at: None,
                created_at: now,
                updated_at: now,
            });
            let still_active = profile.premium_status == PremiumStatus::Active
                && profile.premium_expires_at.is_some_and(|exp| exp > now);
            let base = profile
                .premium_expires_at
                .map_or(now, |exp| exp.max(now));
            let expires_at = base + ChronoDuration::days(i64::from(premium_days));
            if !still_active {
                profile.premium_activated_at = Some(now);
            }
            profile.premium_status = PremiumStatus::Active;
            profile.premium_expires_at = Some(expires_at);
            profile.updated_at = now;
            Some(expires_at)
        } else {
            None
        };

        Ok(Some(ConfirmationRecord {
            ledger_entry_id,
            premium_expires_at,
        }))
    }

    async fn get_confirmable_payments(&self, limit: i64) -> Result<Vec<SolanaPayment>, AppError> {
        self.check_should_fail()?;
        let store = self.store.lock().unwrap();
        let now = Utc::now();
        let mut items: Vec<SolanaPayment> = store
            .payments
            .values()
            .filter(|p| {
                p.status == PaymentStatus::Pending && p.tx_signature.is_some() && p.expires_at > now
            })
            .cloned()
            .collect();
        // Never-checked payments first, then oldest check
        items.sort_by(|a, b| {
            a.last_confirmation_check
                .cmp(&b.last_confirmation_check)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(items.into_iter().take(limit.max(0) as usize).collect())
    }

    async fn expire_stale_payments(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        self.check_should_fail()?;
        let mut store = self.store.lock().unwrap();
        let mut count = 0;
        for payment in store.payments.values_mut() {
            if payment.status == PaymentStatus::Pending && payment.expires_at <= now {
                payment.status = PaymentStatus::Failed;
                payment.error_message = Some("Payment expired".to_string());
                payment.failed_at = Some(now);
                payment.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge_expired_idempotency_keys(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        self.check_should_fail()?;
        let mut store = self.store.lock().unwrap();
        let before = store.idempotency.len();
        store.idempotency.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - store.idempotency.len()) as u64)
    }

    async fn expire_premium_profiles(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        self.check_should_fail()?;
        let mut store = self.store.lock().unwrap();
        let mut count = 0;
        for profile in store.profiles.values_mut() {
            if profile.premium_status == PremiumStatus::Active
                && profile.premium_expires_at.is_some_and(|exp| exp <= now)
            {
                profile.premium_status = PremiumStatus::Expired;
                profile.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn payment_stats(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<PaymentStats, AppError> {
        self.check_should_fail()?;
        let store = self.store.lock().unwrap();
        let mut stats = PaymentStats::default();
        for p in store
            .payments
            .values()
            .filter(|p| p.user_id == user_id && p.created_at >= since)
        {
            stats.total_payments += 1;
            match p.status {
                PaymentStatus::Confirmed => {
                    stats.confirmed_payments += 1;
                    stats.total_amount_lamports += p.amount_lamports;
                    match p.kind {
                        PaymentKind::Donation => stats.donation_amount_lamports += p.amount_lamports,
                        PaymentKind::Premium => stats.premium_amount_lamports += p.amount_lamports,
                    }
                }
                PaymentStatus::Failed => stats.failed_payments += 1,
                PaymentStatus::Pending => stats.pending_payments += 1,
                PaymentStatus::Refunded => {}
            }
        }
        Ok(stats)
    }

    async fn donation_total(&self, user_id: Uuid) -> Result<DonationTotal, AppError> {
        self.check_should_fail()?;
        let store = self.store.lock().unwrap();
        let (total, count) = store
            .payments
            .values()
            .filter(|p| {
                p.user_id == user_id
                    && p.kind == PaymentKind::Donation
                    && p.status == PaymentStatus::Confirmed
            })
            .fold((0i64, 0i64), |(total, count), p| {
                (total + p.amount_lamports, count + 1)
            });
        Ok(DonationTotal::new(total, count))
    }
}

/// Mock Solana RPC with scripted signature states and transactions
pub struct MockBlockchainClient {
    statuses: Mutex<HashMap<String, SignatureState>>,
    transactions: Mutex<HashMap<String, ConfirmedTransaction>>,
    balances: Mutex<HashMap<String, i64>>,
    status_calls: AtomicUsize,
    config: MockConfig,
    is_healthy: AtomicBool,
}

impl MockBlockchainClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            status_calls: AtomicUsize::new(0),
            config,
            is_healthy: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn set_signature_status(&self, signature: &str, state: SignatureState) {
        self.statuses
            .lock()
            .unwrap()
            .insert(signature.to_string(), state);
    }

    pub fn set_transaction(&self, signature: &str, tx: ConfirmedTransaction) {
        self.transactions
            .lock()
            .unwrap()
            .insert(signature.to_string(), tx);
    }

    /// Script a confirmed transaction carrying one system transfer
    /// Mark a signature confirmed with a single transfer from `source`
    pub fn confirm_transfer(&self, signature: &str, source: &str, destination: &str, lamports: i64) {
        self.set_signature_status(signature, SignatureState::Confirmed);
        self.set_transaction(
            signature,
            ConfirmedTransaction {
                error: None,
                transfers: vec![TransferInfo {
                    source: source.to_string(),
                    destination: destination.to_string(),
                    lamports,
                }],
            },
        );
    }

    pub fn set_balance(&self, address: &str, lamports: i64) {
        self.balances
            .lock()
            .unwrap()
            .insert(address.to_string(), lamports);
    }

    /// Number of `getSignatureStatuses` lookups served
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::Relaxed)
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            return Err(AppError::Blockchain(BlockchainError::RpcError(
                self.config.message(),
            )));
        }
        Ok(())
    }
}

impl Default for MockBlockchainClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockchainClient for MockBlockchainClient {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Blockchain(BlockchainError::RpcError(
                "RPC unhealthy".to_string(),
            )));
        }
        self.check_should_fail()
    }

    async fn get_balance(&self, address: &str) -> Result<i64, AppError> {
        self.check_should_fail()?;
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0))
    }

    async fn get_signature_status(&self, signature: &str) -> Result<SignatureState, AppError> {
        self.status_calls.fetch_add(1, Ordering::Relaxed);
        self.check_should_fail()?;
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(signature)
            .cloned()
            .unwrap_or(SignatureState::Unknown))
    }

    async fn get_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<ConfirmedTransaction>, AppError> {
        self.check_should_fail()?;
        Ok(self.transactions.lock().unwrap().get(signature).cloned())
    }
}

/// Mock Redis answering `PING`
pub struct MockCacheClient {
    is_healthy: AtomicBool,
}

impl MockCacheClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            is_healthy: AtomicBool::new(true),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }
}

impl Default for MockCacheClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheClient for MockCacheClient {
    async fn ping(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::ExternalService(ExternalServiceError::Cache(
                "Connection refused".to_string(),
            )));
        }
        Ok(())
    }
}

/// A wallet row for seeding tests
#[must_use]
pub fn sample_wallet(user_id: Uuid, public_key: &str) -> NewWallet {
    NewWallet {
        user_id,
        public_key: public_key.to_string(),
        wallet_type: crate::domain::WalletType::External,
        provider: Some("phantom".to_string()),
        name: None,
        is_primary: true,
        metadata: json!({}),
    }
}
