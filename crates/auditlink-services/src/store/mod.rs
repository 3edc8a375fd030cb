//! Credit ledger and badge collection.
//!
//! Two backends implement the same traits: [`SupabaseStore`] talks to a
//! hosted `PostgREST` API, [`SqliteStore`] keeps everything in a local
//! `SQLite` file.

mod sqlite;
mod supabase;

use async_trait::async_trait;
use auditlink_core::db::DatabaseError;
use auditlink_core::{AuditResult, NetworkId, NftAttribute, NftMetadata, validate_address};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sqlite::{LedgerDatabase, SqliteStore};
pub use supabase::SupabaseStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("Store API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid wallet address '{0}'")]
    InvalidWallet(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// Request URLs name wallets; keep them out of error text.
impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.into())
    }
}

/// Per-wallet usage credits.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Current balance, creating the row with the initial allotment on first use.
    async fn balance(&self, wallet: &str) -> Result<u32, StoreError>;

    /// Atomically remove one credit; never goes below zero.
    async fn deduct(&self, wallet: &str) -> Result<(), StoreError>;

    /// Deduct one credit for `request_id` unless that request was already
    /// charged. Returns whether a credit was taken.
    async fn charge(&self, wallet: &str, request_id: &str) -> Result<bool, StoreError>;
}

/// Users and their saved audit badges.
#[async_trait]
pub trait BadgeStore: Send + Sync {
    /// Record that a wallet has connected. Idempotent.
    async fn track_user(&self, wallet: &str) -> Result<(), StoreError>;

    async fn save_badge(&self, badge: &NewBadge) -> Result<BadgeSaveOutcome, StoreError>;

    /// Newest first.
    async fn list_badges(&self, wallet: &str) -> Result<Vec<BadgeRecord>, StoreError>;

    /// Returns whether a badge was removed.
    async fn delete_badge(&self, id: i64) -> Result<bool, StoreError>;
}

/// Badge to add to a wallet's collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBadge {
    pub wallet_address: String,
    pub contract_address: String,
    pub metadata: NftMetadata,
    pub minted_at: DateTime<Utc>,
}

impl NewBadge {
    /// Collection entry for a finished audit of `contract_address`.
    pub fn from_audit(
        result: &AuditResult,
        contract_address: &str,
        network: NetworkId,
        wallet_address: &str,
        minted_at: DateTime<Utc>,
    ) -> Self {
        let mut metadata = NftMetadata::for_audit(
            result,
            contract_address,
            network,
            wallet_address,
            minted_at.date_naive(),
        );
        metadata.name = "AuditLinkAI Verification".to_string();
        metadata.description = format!(
            "This NFT certifies that the contract at {contract_address} was audited using AI technology and achieved a security score of {}/100.",
            result.score
        );
        Self {
            wallet_address: wallet_address.to_string(),
            contract_address: contract_address.to_string(),
            metadata,
            minted_at,
        }
    }
}

/// A saved badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeRecord {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub image: String,
    pub attributes: Vec<NftAttribute>,
    pub wallet_address: String,
    pub minted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeSaveOutcome {
    Stored(i64),
    /// A badge for this wallet and contract already exists.
    AlreadyStored(i64),
}

pub(crate) fn check_wallet(wallet: &str) -> Result<&str, StoreError> {
    validate_address(wallet).map_err(|_| StoreError::InvalidWallet(wallet.to_string()))
}

#[cfg(test)]
mod tests;
