//! Local `SQLite` backend.

use std::path::Path;

use async_trait::async_trait;
use auditlink_core::NftAttribute;
use auditlink_core::db::DatabaseError;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{
    BadgeRecord, BadgeSaveOutcome, BadgeStore, CreditLedger, NewBadge, StoreError, check_wallet,
};

auditlink_core::define_database!(LedgerDatabase, "Ledger migrations complete");

#[derive(Debug, sqlx::FromRow)]
struct BadgeRow {
    id: i64,
    name: String,
    description: String,
    image: String,
    attributes: String,
    wallet_address: String,
    minted_at: i64,
}

impl BadgeRow {
    fn into_record(self) -> Result<BadgeRecord, StoreError> {
        let attributes: Vec<NftAttribute> = serde_json::from_str(&self.attributes)?;
        Ok(BadgeRecord {
            id: self.id,
            name: self.name,
            description: self.description,
            image: self.image,
            attributes,
            wallet_address: self.wallet_address,
            minted_at: DateTime::from_timestamp(self.minted_at, 0).unwrap_or_default(),
        })
    }
}

/// Credit ledger and badge store in a local database.
#[derive(Clone)]
pub struct SqliteStore {
    db: LedgerDatabase,
    initial_allotment: u32,
}

impl SqliteStore {
    pub const fn new(db: LedgerDatabase, initial_allotment: u32) -> Self {
        Self {
            db,
            initial_allotment,
        }
    }

    pub async fn open(path: &Path, initial_allotment: u32) -> Result<Self, StoreError> {
        Ok(Self::new(LedgerDatabase::open(path).await?, initial_allotment))
    }

    pub async fn open_in_memory(initial_allotment: u32) -> Result<Self, StoreError> {
        Ok(Self::new(LedgerDatabase::open_in_memory().await?, initial_allotment))
    }

    async fn read_credits(&self, wallet: &str) -> Result<Option<u32>, StoreError> {
        let credits: Option<i64> =
            sqlx::query_scalar("SELECT credits_remaining FROM user_credits WHERE wallet_address = ?")
                .bind(wallet)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(credits.map(|c| u32::try_from(c).unwrap_or(0)))
    }

    async fn badge_id(&self, wallet: &str, contract: &str) -> Result<Option<i64>, StoreError> {
        Ok(sqlx::query_scalar(
            "SELECT id FROM badges WHERE wallet_address = ? AND contract_address = ?",
        )
        .bind(wallet)
        .bind(contract)
        .fetch_optional(self.db.pool())
        .await?)
    }
}

#[async_trait]
impl CreditLedger for SqliteStore {
    async fn balance(&self, wallet: &str) -> Result<u32, StoreError> {
        let wallet = check_wallet(wallet)?;
        if let Some(credits) = self.read_credits(wallet).await? {
            return Ok(credits);
        }

        let now = Utc::now().timestamp();
        let inserted = sqlx::query(
            r"
            INSERT INTO user_credits (wallet_address, credits_remaining, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(wallet)
        .bind(i64::from(self.initial_allotment))
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await
        .map_err(DatabaseError::from);

        match inserted {
            Ok(_) => {
                info!(wallet, credits = self.initial_allotment, "Created credit balance");
                Ok(self.initial_allotment)
            }
            // Another caller created the row first.
            Err(DatabaseError::Conflict(_)) => {
                debug!(wallet, "Credit row already created, re-reading");
                self.read_credits(wallet).await?.ok_or_else(|| {
                    DatabaseError::NotFound(format!("credits for {wallet}")).into()
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn deduct(&self, wallet: &str) -> Result<(), StoreError> {
        let wallet = check_wallet(wallet)?;
        self.balance(wallet).await?;
        sqlx::query(
            r"
            UPDATE user_credits
            SET credits_remaining = MAX(credits_remaining - 1, 0), updated_at = ?
            WHERE wallet_address = ?
            ",
        )
        .bind(Utc::now().timestamp())
        .bind(wallet)
        .execute(self.db.pool())
        .await?;
        debug!(wallet, "Credit deducted");
        Ok(())
    }

    async fn charge(&self, wallet: &str, request_id: &str) -> Result<bool, StoreError> {
        let wallet = check_wallet(wallet)?;
        self.balance(wallet).await?;
        let now = Utc::now().timestamp();

        let mut tx = self.db.pool().begin().await?;
        let recorded = sqlx::query(
            r"
            INSERT INTO charged_requests (request_id, wallet_address, charged_at)
            VALUES (?, ?, ?)
            ON CONFLICT (request_id) DO NOTHING
            ",
        )
        .bind(request_id)
        .bind(wallet)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if recorded.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(wallet, request_id, "Request already charged");
            return Ok(false);
        }

        sqlx::query(
            r"
            UPDATE user_credits
            SET credits_remaining = MAX(credits_remaining - 1, 0), updated_at = ?
            WHERE wallet_address = ?
            ",
        )
        .bind(now)
        .bind(wallet)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        debug!(wallet, request_id, "Request charged");
        Ok(true)
    }
}

#[async_trait]
impl BadgeStore for SqliteStore {
    async fn track_user(&self, wallet: &str) -> Result<(), StoreError> {
        let wallet = check_wallet(wallet)?;
        let now = Utc::now().timestamp();
        sqlx::query(
            r"
            INSERT INTO users (wallet_address, first_seen, last_seen) VALUES (?, ?, ?)
            ON CONFLICT (wallet_address) DO UPDATE SET last_seen = excluded.last_seen
            ",
        )
        .bind(wallet)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn save_badge(&self, badge: &NewBadge) -> Result<BadgeSaveOutcome, StoreError> {
        let wallet = check_wallet(&badge.wallet_address)?;
        if let Some(id) = self.badge_id(wallet, &badge.contract_address).await? {
            return Ok(BadgeSaveOutcome::AlreadyStored(id));
        }

        let attributes = serde_json::to_string(&badge.metadata.attributes)?;
        let inserted = sqlx::query(
            r"
            INSERT INTO badges
                (name, description, image, attributes, wallet_address, contract_address, minted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&badge.metadata.name)
        .bind(&badge.metadata.description)
        .bind(&badge.metadata.image)
        .bind(attributes)
        .bind(wallet)
        .bind(&badge.contract_address)
        .bind(badge.minted_at.timestamp())
        .execute(self.db.pool())
        .await
        .map_err(DatabaseError::from);

        match inserted {
            Ok(done) => {
                let id = done.last_insert_rowid();
                info!(wallet, id, contract = %badge.contract_address, "Badge saved");
                Ok(BadgeSaveOutcome::Stored(id))
            }
            Err(DatabaseError::Conflict(_)) => {
                let id = self
                    .badge_id(wallet, &badge.contract_address)
                    .await?
                    .unwrap_or_default();
                Ok(BadgeSaveOutcome::AlreadyStored(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_badges(&self, wallet: &str) -> Result<Vec<BadgeRecord>, StoreError> {
        let wallet = check_wallet(wallet)?;
        let rows = sqlx::query_as::<_, BadgeRow>(
            r"
            SELECT id, name, description, image, attributes, wallet_address, minted_at
            FROM badges WHERE wallet_address = ?
            ORDER BY minted_at DESC, id DESC
            ",
        )
        .bind(wallet)
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter().map(BadgeRow::into_record).collect()
    }

    async fn delete_badge(&self, id: i64) -> Result<bool, StoreError> {
        let done = sqlx::query("DELETE FROM badges WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        Ok(done.rows_affected() > 0)
    }
}
