//! Hosted `PostgREST` backend.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{
    BadgeRecord, BadgeSaveOutcome, BadgeStore, CreditLedger, NewBadge, StoreError, check_wallet,
};

const PREFER_REPRESENTATION: &str = "return=representation";

#[derive(Debug, Deserialize)]
struct CreditRow {
    credits_remaining: i64,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: String,
}

/// Credit ledger and badge store over the hosted REST API.
#[derive(Debug)]
pub struct SupabaseStore {
    http: reqwest::Client,
    base_url: String,
    initial_allotment: u32,
}

impl SupabaseStore {
    pub fn new(url: &str, key: &str, initial_allotment: u32) -> Result<Self, StoreError> {
        if url.trim().is_empty() {
            return Err(StoreError::Config("store.supabase_url is empty".into()));
        }
        if key.is_empty() {
            return Err(StoreError::Config("store.supabase_key is empty".into()));
        }

        let mut headers = HeaderMap::new();
        let key_val = HeaderValue::from_str(key)
            .map_err(|_| StoreError::Config("Invalid key format".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|_| StoreError::Config("Invalid key format".into()))?;
        headers.insert("apikey", key_val);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            base_url: url.trim().trim_end_matches('/').to_string(),
            initial_allotment,
        })
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{path}", self.base_url)
    }

    /// Turn non-2xx responses into `StoreError::Api`.
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<PostgrestError>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn read_credits(&self, wallet: &str) -> Result<Option<u32>, StoreError> {
        let url = self.rest_url(&format!(
            "user_credits?select=credits_remaining&wallet_address=eq.{wallet}&limit=1"
        ));
        let resp = Self::check(self.http.get(&url).send().await?).await?;
        let rows: Vec<CreditRow> = resp.json().await?;
        Ok(rows
            .first()
            .map(|r| u32::try_from(r.credits_remaining).unwrap_or(0)))
    }
}

#[async_trait]
impl CreditLedger for SupabaseStore {
    async fn balance(&self, wallet: &str) -> Result<u32, StoreError> {
        let wallet = check_wallet(wallet)?;
        if let Some(credits) = self.read_credits(wallet).await? {
            return Ok(credits);
        }

        let resp = self
            .http
            .post(self.rest_url("user_credits"))
            .header("Prefer", PREFER_REPRESENTATION)
            .json(&json!({
                "wallet_address": wallet,
                "credits_remaining": self.initial_allotment,
            }))
            .send()
            .await?;

        // Unique violation: a concurrent first read created the row.
        if resp.status() == reqwest::StatusCode::CONFLICT {
            debug!(wallet, "Credit row already created, re-reading");
            return self.read_credits(wallet).await?.ok_or_else(|| StoreError::Api {
                status: 409,
                message: format!("credit row for {wallet} conflicted but is not readable"),
            });
        }

        let rows: Vec<CreditRow> = Self::check(resp).await?.json().await?;
        let credits = rows
            .first()
            .map_or(self.initial_allotment, |r| u32::try_from(r.credits_remaining).unwrap_or(0));
        info!(wallet, credits, "Created credit balance");
        Ok(credits)
    }

    async fn deduct(&self, wallet: &str) -> Result<(), StoreError> {
        let wallet = check_wallet(wallet)?;
        let resp = self
            .http
            .post(self.rest_url("rpc/deduct_credit"))
            .json(&json!({ "p_wallet_address": wallet }))
            .send()
            .await?;
        Self::check(resp).await?;
        debug!(wallet, "Credit deducted");
        Ok(())
    }

    async fn charge(&self, wallet: &str, request_id: &str) -> Result<bool, StoreError> {
        let wallet = check_wallet(wallet)?;
        // The request id is the table's primary key; a second charge conflicts.
        let resp = self
            .http
            .post(self.rest_url("charged_requests"))
            .json(&json!({ "request_id": request_id, "wallet_address": wallet }))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::CONFLICT {
            debug!(wallet, request_id, "Request already charged");
            return Ok(false);
        }
        Self::check(resp).await?;
        self.deduct(wallet).await?;
        Ok(true)
    }
}

#[async_trait]
impl BadgeStore for SupabaseStore {
    async fn track_user(&self, wallet: &str) -> Result<(), StoreError> {
        let wallet = check_wallet(wallet)?;
        let resp = self
            .http
            .post(self.rest_url("users?on_conflict=wallet_address"))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&json!({ "wallet_address": wallet }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn save_badge(&self, badge: &NewBadge) -> Result<BadgeSaveOutcome, StoreError> {
        let wallet = check_wallet(&badge.wallet_address)?;

        // The hosted table has no contract column; the description names the contract.
        let url = self.rest_url(&format!(
            "badges?select=id&wallet_address=eq.{wallet}&description=ilike.*{}*&limit=1",
            badge.contract_address
        ));
        let existing: Vec<IdRow> = Self::check(self.http.get(&url).send().await?)
            .await?
            .json()
            .await?;
        if let Some(row) = existing.first() {
            return Ok(BadgeSaveOutcome::AlreadyStored(row.id));
        }

        let resp = self
            .http
            .post(self.rest_url("badges"))
            .header("Prefer", PREFER_REPRESENTATION)
            .json(&json!({
                "name": badge.metadata.name,
                "description": badge.metadata.description,
                "image": badge.metadata.image,
                "attributes": badge.metadata.attributes,
                "wallet_address": wallet,
                "minted_at": badge.minted_at,
            }))
            .send()
            .await?;
        let status = resp.status().as_u16();
        let rows: Vec<IdRow> = Self::check(resp).await?.json().await?;
        let id = rows.first().map(|r| r.id).ok_or_else(|| StoreError::Api {
            status,
            message: "badge insert returned no rows".into(),
        })?;
        info!(wallet, id, contract = %badge.contract_address, "Badge saved");
        Ok(BadgeSaveOutcome::Stored(id))
    }

    async fn list_badges(&self, wallet: &str) -> Result<Vec<BadgeRecord>, StoreError> {
        let wallet = check_wallet(wallet)?;
        let url = self.rest_url(&format!(
            "badges?select=*&wallet_address=eq.{wallet}&order=minted_at.desc"
        ));
        Ok(Self::check(self.http.get(&url).send().await?)
            .await?
            .json()
            .await?)
    }

    async fn delete_badge(&self, id: i64) -> Result<bool, StoreError> {
        let resp = self
            .http
            .delete(self.rest_url(&format!("badges?id=eq.{id}")))
            .header("Prefer", PREFER_REPRESENTATION)
            .send()
            .await?;
        let removed: Vec<IdRow> = Self::check(resp).await?.json().await?;
        Ok(!removed.is_empty())
    }
}
