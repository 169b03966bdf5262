//! PostgreSQL database client implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::types::{MAX_CONFIRMATION_ATTEMPTS, lamports_to_sol};
use crate::domain::{
    AppError, ConfirmationRecord, DatabaseClient, DatabaseError, DonationTotal, NewActivity,
    NewPayment,
    NewWallet, PaginatedResponse, PaymentKind, PaymentStats, SolanaPayment, SolanaWallet,
    UserProfile, WalletActivity, WalletUpdate,
};

const WALLET_COLUMNS: &str = "id, user_id, public_key, wallet_type, provider, is_primary, name, \
     balance_lamports, last_balance_update, is_active, metadata, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, user_id, wallet_id, kind, amount_lamports, tx_signature, \
     status, destination_address, idempotency_key, confirmation_attempts, \
     last_confirmation_check, error_message, metadata, created_at, updated_at, expires_at, \
     confirmed_at, failed_at";

const ACTIVITY_COLUMNS: &str = "id, user_id, wallet_id, activity_type, description, \
     tx_signature, amount_lamports, metadata, created_at";

/// PostgreSQL connection pool configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// PostgreSQL database client with connection pooling
pub struct PostgresClient {
    pool: PgPool,
}

fn query_error(e: sqlx::Error) -> AppError {
    AppError::Database(DatabaseError::from(e))
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T, AppError>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(column);
    raw.parse()
        .map_err(|e: String| AppError::Database(DatabaseError::Query(e)))
}

impl PostgresClient {
    /// Create a new PostgreSQL client with custom configuration
    pub async fn new(database_url: &str, config: PostgresConfig) -> Result<Self, AppError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client with default configuration
    pub async fn with_defaults(database_url: &str) -> Result<Self, AppError> {
        Self::new(database_url, PostgresConfig::default()).await
    }

    /// Run database migrations using sqlx migrate
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Migration(e.to_string())))?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying connection pool (for testing)
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_wallet(row: &PgRow) -> Result<SolanaWallet, AppError> {
        Ok(SolanaWallet {
            id: row.get("id"),
            user_id: row.get("user_id"),
            public_key: row.get("public_key"),
            wallet_type: parse_column(row, "wallet_type")?,
            provider: row.get("provider"),
            is_primary: row.get("is_primary"),
            name: row.get("name"),
            balance_lamports: row.get("balance_lamports"),
            last_balance_update: row.get("last_balance_update"),
            is_active: row.get("is_active"),
            metadata: row.get("metadata"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_payment(row: &PgRow) -> Result<SolanaPayment, AppError> {
        let amount_lamports: i64 = row.get("amount_lamports");
        Ok(SolanaPayment {
            id: row.get("id"),
            user_id: row.get("user_id"),
            wallet_id: row.get("wallet_id"),
            kind: parse_column(row, "kind")?,
            amount_lamports,
            amount_sol: lamports_to_sol(amount_lamports),
            tx_signature: row.get("tx_signature"),
            status: parse_column(row, "status")?,
            destination_address: row.get("destination_address"),
            idempotency_key: row.get("idempotency_key"),
            confirmation_attempts: row.get("confirmation_attempts"),
            last_confirmation_check: row.get("last_confirmation_check"),
            error_message: row.get("error_message"),
            metadata: row.get("metadata"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            expires_at: row.get("expires_at"),
            confirmed_at: row.get("confirmed_at"),
            failed_at: row.get("failed_at"),
        })
    }

    fn row_to_activity(row: &PgRow) -> WalletActivity {
        WalletActivity {
            id: row.get("id"),
            user_id: row.get("user_id"),
            wallet_id: row.get("wallet_id"),
            activity_type: row.get("activity_type"),
            description: row.get("description"),
            tx_signature: row.get("tx_signature"),
            amount_lamports: row.get("amount_lamports"),
            metadata: row.get("metadata"),
            created_at: row.get("created_at"),
        }
    }

    fn row_to_profile(row: &PgRow) -> Result<UserProfile, AppError> {
        Ok(UserProfile {
            id: row.get("id"),
            email: row.get("email"),
            premium_status: parse_column(row, "premium_status")?,
            premium_expires_at: row.get("premium_expires_at"),
            premium_activated_at: row.get("premium_activated_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, premium_status, premium_expires_at, premium_activated_at,
                   created_at, updated_at
            FROM user_profiles
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.as_ref().map(Self::row_to_profile).transpose()
    }

    #[instrument(skip(self))]
    async fn cancel_premium(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<UserProfile>, AppError> {
        let row = sqlx::query(
            r#"
            UPDATE user_profiles
            SET premium_status = 'expired', premium_expires_at = $2, updated_at = $2
            WHERE id = $1 AND premium_status = 'active' AND premium_expires_at > $2
            RETURNING id, email, premium_status, premium_expires_at, premium_activated_at,
                      created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.as_ref().map(Self::row_to_profile).transpose()
    }

    #[instrument(skip(self, wallet), fields(user_id = %wallet.user_id, public_key = %wallet.public_key))]
    async fn create_wallet(&self, wallet: &NewWallet) -> Result<SolanaWallet, AppError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        if wallet.is_primary {
            sqlx::query(
                "UPDATE solana_wallets SET is_primary = FALSE, updated_at = NOW() \
                 WHERE user_id = $1 AND is_primary",
            )
            .bind(wallet.user_id)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        }

        let sql = format!(
            r#"
            INSERT INTO solana_wallets (
                id, user_id, public_key, wallet_type, provider, is_primary, name, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {WALLET_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(wallet.user_id)
            .bind(&wallet.public_key)
            .bind(wallet.wallet_type.as_str())
            .bind(&wallet.provider)
            .bind(wallet.is_primary)
            .bind(&wallet.name)
            .bind(&wallet.metadata)
            .fetch_one(&mut *tx)
            .await
            .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        Self::row_to_wallet(&row)
    }

    #[instrument(skip(self))]
    async fn get_wallet(&self, id: Uuid) -> Result<Option<SolanaWallet>, AppError> {
        let sql = format!("SELECT {WALLET_COLUMNS} FROM solana_wallets WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    #[instrument(skip(self))]
    async fn get_active_wallet_by_public_key(
        &self,
        public_key: &str,
    ) -> Result<Option<SolanaWallet>, AppError> {
        let sql = format!(
            "SELECT {WALLET_COLUMNS} FROM solana_wallets WHERE public_key = $1 AND is_active"
        );
        let row = sqlx::query(&sql)
            .bind(public_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    #[instrument(skip(self))]
    async fn list_wallets(&self, user_id: Uuid) -> Result<Vec<SolanaWallet>, AppError> {
        let sql = format!(
            r#"
            SELECT {WALLET_COLUMNS}
            FROM solana_wallets
            WHERE user_id = $1 AND is_active
            ORDER BY is_primary DESC, created_at DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(Self::row_to_wallet).collect()
    }

    #[instrument(skip(self, update))]
    async fn update_wallet(
        &self,
        id: Uuid,
        update: &WalletUpdate,
    ) -> Result<Option<SolanaWallet>, AppError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        if update.is_primary == Some(true) {
            sqlx::query(
                r#"
                UPDATE solana_wallets
                SET is_primary = FALSE, updated_at = NOW()
                WHERE is_primary
                  AND id <> $1
                  AND user_id = (SELECT user_id FROM solana_wallets WHERE id = $1)
                "#,
            )
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        }

        let sql = format!(
            r#"
            UPDATE solana_wallets
            SET name = COALESCE($2, name),
                is_primary = COALESCE($3, is_primary),
                metadata = COALESCE($4, metadata),
                updated_at = NOW()
            WHERE id = $1 AND is_active
            RETURNING {WALLET_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(&update.name)
            .bind(update.is_primary)
            .bind(&update.metadata)
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    #[instrument(skip(self))]
    async fn deactivate_wallet(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE solana_wallets
            SET is_active = FALSE, is_primary = FALSE, updated_at = NOW()
            WHERE id = $1 AND is_active
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn update_wallet_balance(&self, id: Uuid, lamports: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE solana_wallets
            SET balance_lamports = $2, last_balance_update = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(lamports)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    #[instrument(skip(self, activity), fields(user_id = %activity.user_id, activity_type = %activity.activity_type))]
    async fn record_activity(&self, activity: &NewActivity) -> Result<WalletActivity, AppError> {
        let sql = format!(
            r#"
            INSERT INTO wallet_activities (
                id, user_id, wallet_id, activity_type, description, tx_signature,
                amount_lamports, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ACTIVITY_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(activity.user_id)
            .bind(activity.wallet_id)
            .bind(&activity.activity_type)
            .bind(&activity.description)
            .bind(&activity.tx_signature)
            .bind(activity.amount_lamports)
            .bind(&activity.metadata)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;

        Ok(Self::row_to_activity(&row))
    }

    #[instrument(skip(self))]
    async fn list_activities(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WalletActivity>, AppError> {
        let sql = format!(
            r#"
            SELECT {ACTIVITY_COLUMNS}
            FROM wallet_activities
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(limit.clamp(1, 100))
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        Ok(rows.iter().map(Self::row_to_activity).collect())
    }

    #[instrument(skip(self))]
    async fn get_payment_by_idempotency_key(
        &self,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<SolanaPayment>, AppError> {
        let sql = format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM solana_payments
            WHERE id = (
                SELECT payment_id FROM payment_idempotency_keys
                WHERE user_id = $1 AND key = $2 AND expires_at > NOW()
            )
            "#
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(Self::row_to_payment).transpose()
    }

    #[instrument(skip(self, payment), fields(user_id = %payment.user_id, kind = %payment.kind, amount = payment.amount_lamports))]
    async fn create_payment(&self, payment: &NewPayment) -> Result<SolanaPayment, AppError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        // A lapsed key may be reused
        sqlx::query(
            "DELETE FROM payment_idempotency_keys \
             WHERE user_id = $1 AND key = $2 AND expires_at <= NOW()",
        )
        .bind(payment.user_id)
        .bind(&payment.idempotency_key)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        let sql = format!(
            r#"
            INSERT INTO solana_payments (
                id, user_id, wallet_id, kind, amount_lamports, tx_signature, status,
                destination_address, idempotency_key, metadata, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8, $9, $10)
            RETURNING {PAYMENT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(payment.user_id)
            .bind(payment.wallet_id)
            .bind(payment.kind.as_str())
            .bind(payment.amount_lamports)
            .bind(&payment.tx_signature)
            .bind(&payment.destination_address)
            .bind(&payment.idempotency_key)
            .bind(&payment.metadata)
            .bind(payment.expires_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(query_error)?;
        let created = Self::row_to_payment(&row)?;

        sqlx::query(
            r#"
            INSERT INTO payment_idempotency_keys (user_id, key, payment_id, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(payment.user_id)
        .bind(&payment.idempotency_key)
        .bind(created.id)
        .bind(payment.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get_payment(&self, id: Uuid) -> Result<Option<SolanaPayment>, AppError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM solana_payments WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(Self::row_to_payment).transpose()
    }

    #[instrument(skip(self))]
    async fn get_payment_by_signature(
        &self,
        signature: &str,
    ) -> Result<Option<SolanaPayment>, AppError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM solana_payments WHERE tx_signature = $1");
        let row = sqlx::query(&sql)
            .bind(signature)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(Self::row_to_payment).transpose()
    }

    #[instrument(skip(self))]
    async fn list_payments(
        &self,
        user_id: Uuid,
        kind: Option<PaymentKind>,
        limit: i64,
        cursor: Option<Uuid>,
    ) -> Result<PaginatedResponse<SolanaPayment>, AppError> {
        let limit = limit.clamp(1, 100);
        // Fetch one extra to determine if there are more items
        let fetch_limit = limit + 1;
        let kind = kind.map(|k| k.as_str());

        let rows = match cursor {
            Some(cursor_id) => {
                let cursor_row = sqlx::query(
                    "SELECT created_at FROM solana_payments WHERE id = $1 AND user_id = $2",
                )
                .bind(cursor_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;

                let cursor_created_at: DateTime<Utc> = match cursor_row {
                    Some(row) => row.get("created_at"),
                    None => return Err(AppError::invalid_field("cursor", "Invalid cursor")),
                };

                let sql = format!(
                    r#"
                    SELECT {PAYMENT_COLUMNS}
                    FROM solana_payments
                    WHERE user_id = $1
                      AND ($2::TEXT IS NULL OR kind = $2)
                      AND (created_at, id) < ($3, $4)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $5
                    "#
                );
                sqlx::query(&sql)
                    .bind(user_id)
                    .bind(kind)
                    .bind(cursor_created_at)
                    .bind(cursor_id)
                    .bind(fetch_limit)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(query_error)?
            }
            None => {
                let sql = format!(
                    r#"
                    SELECT {PAYMENT_COLUMNS}
                    FROM solana_payments
                    WHERE user_id = $1 AND ($2::TEXT IS NULL OR kind = $2)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $3
                    "#
                );
                sqlx::query(&sql)
                    .bind(user_id)
                    .bind(kind)
                    .bind(fetch_limit)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(query_error)?
            }
        };

        let has_more = rows.len() > limit as usize;
        let payments: Vec<SolanaPayment> = rows
            .iter()
            .take(limit as usize)
            .map(Self::row_to_payment)
            .collect::<Result<Vec<_>, _>>()?;

        let next_cursor = if has_more {
            payments.last().map(|p| p.id)
        } else {
            None
        };

        Ok(PaginatedResponse::new(payments, next_cursor, has_more))
    }

    #[instrument(skip(self))]
    async fn attach_payment_signature(
        &self,
        id: Uuid,
        signature: &str,
    ) -> Result<Option<SolanaPayment>, AppError> {
        let sql = format!(
            r#"
            UPDATE solana_payments
            SET tx_signature = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {PAYMENT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(signature)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(Self::row_to_payment).transpose()
    }

    #[instrument(skip(self))]
    async fn record_confirmation_attempt(&self, id: Uuid) -> Result<i32, AppError> {
        let row = sqlx::query(
            r#"
            UPDATE solana_payments
            SET confirmation_attempts = confirmation_attempts + 1,
                last_confirmation_check = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING confirmation_attempts
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        match row {
            Some(row) => Ok(row.get("confirmation_attempts")),
            None => Err(AppError::not_found(format!("Payment {id}"))),
        }
    }

    #[instrument(skip(self))]
    async fn fail_payment(&self, id: Uuid, reason: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE solana_payments
            SET status = 'failed', error_message = $2, failed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, payment), fields(payment_id = %payment.id, kind = %payment.kind))]
    async fn confirm_payment(
        &self,
        payment: &SolanaPayment,
        premium_days: i32,
    ) -> Result<Option<ConfirmationRecord>, AppError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        // The status guard serializes concurrent confirmations of one payment
        let updated = sqlx::query(
            r#"
            UPDATE solana_payments
            SET status = 'confirmed', confirmed_at = NOW(), error_message = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(payment.id)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        if updated.rows_affected() == 0 {
            debug!(payment_id = %payment.id, "Payment no longer pending, skipping confirmation");
            tx.rollback().await.map_err(query_error)?;
            return Ok(None);
        }

        let mut ledger_metadata = json!({
            "type": payment.kind.as_str(),
            "targetPool": payment.destination_address,
            "amountSol": payment.amount_sol,
        });
        if let (Some(target), Value::Object(extra)) =
            (ledger_metadata.as_object_mut(), &payment.metadata)
        {
            for (key, value) in extra {
                target.insert(key.clone(), value.clone());
            }
        }

        let ledger_entry_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO solana_ledger (
                id, user_id, wallet_id, payment_id, delta_lamports, reason, tx_signature, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(ledger_entry_id)
        .bind(payment.user_id)
        .bind(payment.wallet_id)
        .bind(payment.id)
        .bind(payment.amount_lamports)
        .bind(payment.kind.ledger_reason())
        .bind(&payment.tx_signature)
        .bind(&ledger_metadata)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        let premium_expires_at: Option<DateTime<Utc>> = if payment.kind == PaymentKind::Premium {
            // Extends from the later of the current expiry and now
            let row = sqlx::query(
                r#"
                INSERT INTO user_profiles (
                    id, premium_status, premium_expires_at, premium_activated_at
                )
                VALUES ($1, 'active', NOW() + make_interval(days => $2), NOW())
                ON CONFLICT (id) DO UPDATE SET
                    premium_status = 'active',
                    premium_expires_at = GREATEST(
                        COALESCE(user_profiles.premium_expires_at, NOW()), NOW()
                    ) + make_interval(days => $2),
                    premium_activated_at = CASE
                        WHEN user_profiles.premium_status = 'active'
                             AND user_profiles.premium_expires_at > NOW()
                        THEN user_profiles.premium_activated_at
                        ELSE NOW()
                    END,
                    updated_at = NOW()
                RETURNING premium_expires_at
                "#,
            )
            .bind(payment.user_id)
            .bind(premium_days)
            .fetch_one(&mut *tx)
            .await
            .map_err(query_error)?;
            row.get("premium_expires_at")
        } else {
            None
        };

        tx.commit()
            .await
            .map_err(|e| AppError::Database(DatabaseError::Transaction(e.to_string())))?;

        Ok(Some(ConfirmationRecord {
            ledger_entry_id,
            premium_expires_at,
        }))
    }

    #[instrument(skip(self))]
    async fn get_confirmable_payments(&self, limit: i64) -> Result<Vec<SolanaPayment>, AppError> {
        let sql = format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM solana_payments
            WHERE status = 'pending'
              AND tx_signature IS NOT NULL
              AND expires_at > NOW()
              AND confirmation_attempts < $2
            ORDER BY last_confirmation_check ASC NULLS FIRST, created_at ASC
            LIMIT $1
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(MAX_CONFIRMATION_ATTEMPTS)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(Self::row_to_payment).collect()
    }

    #[instrument(skip(self))]
    async fn expire_stale_payments(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE solana_payments
            SET status = 'failed', error_message = 'Payment expired', failed_at = $1,
                updated_at = $1
            WHERE status = 'pending' AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn purge_expired_idempotency_keys(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM payment_idempotency_keys WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn expire_premium_profiles(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE user_profiles
            SET premium_status = 'expired', updated_at = $1
            WHERE premium_status = 'active' AND premium_expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn payment_stats(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<PaymentStats, AppError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_payments,
                COUNT(*) FILTER (WHERE status = 'confirmed') AS confirmed_payments,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed_payments,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending_payments,
                COALESCE(SUM(amount_lamports) FILTER (WHERE status = 'confirmed'), 0)::BIGINT
                    AS total_amount_lamports,
                COALESCE(SUM(amount_lamports)
                    FILTER (WHERE status = 'confirmed' AND kind = 'donation'), 0)::BIGINT
                    AS donation_amount_lamports,
                COALESCE(SUM(amount_lamports)
                    FILTER (WHERE status = 'confirmed' AND kind = 'premium'), 0)::BIGINT
                    AS premium_amount_lamports
            FROM solana_payments
            WHERE user_id = $1 AND created_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(PaymentStats {
            total_payments: row.get("total_payments"),
            confirmed_payments: row.get("confirmed_payments"),
            failed_payments: row.get("failed_payments"),
            pending_payments: row.get("pending_payments"),
            total_amount_lamports: row.get("total_amount_lamports"),
            donation_amount_lamports: row.get("donation_amount_lamports"),
            premium_amount_lamports: row.get("premium_amount_lamports"),
        })
    }

    #[instrument(skip(self))]
    async fn donation_total(&self, user_id: Uuid) -> Result<DonationTotal, AppError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count, COALESCE(SUM(amount_lamports), 0)::BIGINT AS total_lamports
            FROM solana_payments
            WHERE user_id = $1 AND kind = 'donation' AND status = 'confirmed'
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(DonationTotal::new(
            row.get("total_lamports"),
            row.get("count"),
        ))
    }
}
