//! Minimal Ethereum JSON-RPC client.
//!
//! Covers the handful of methods the wallet adapters need. Quantities travel
//! as hex strings and are decoded through alloy's serde impls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, B256, Bytes, U64, U256};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::debug;

use crate::error::ChainError;

/// Transaction fields sent to `eth_estimateGas` / `eth_sendTransaction`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<U64>,
}

/// Event log entry from a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_number: Option<U64>,
    /// `0x1` on success, `0x0` on revert. Absent on pre-Byzantium chains.
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub gas_used: Option<U256>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.is_none_or(|s| s != U64::ZERO)
    }
}

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Waits longer than this are treated as unbounded.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `timeout` from now, clamped so huge configured waits cannot overflow.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout.min(FAR_FUTURE)).unwrap_or(now)
}

/// Reduce `url` to `scheme://host[:port]`.
///
/// Hosted RPC providers put the project key in the path or query.
pub fn redact_url(url: &str) -> String {
    match reqwest::Url::parse(url.trim()) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}://{host}:{port}", parsed.scheme()),
            (Some(host), None) => format!("{}://{host}", parsed.scheme()),
            (None, _) => format!("{}://", parsed.scheme()),
        },
        Err(_) => "<invalid url>".to_string(),
    }
}

/// JSON-RPC over HTTP.
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("endpoint", &self.endpoint())
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self, ChainError> {
        if url.trim().is_empty() {
            return Err(ChainError::Config("RPC URL is empty".into()));
        }

        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            url: url.trim().to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Scheme and host of the endpoint, safe to log.
    pub fn endpoint(&self) -> String {
        redact_url(&self.url)
    }

    /// Issue one JSON-RPC call and decode its `result`.
    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R, ChainError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        debug!(method, id, "JSON-RPC request");

        let resp = self.http.post(&self.url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ChainError::InvalidResponse(format!(
                "{method}: HTTP {}",
                status.as_u16()
            )));
        }
        let resp: RpcResponse = resp.json().await?;

        if let Some(err) = resp.error {
            // Revert reasons arrive in `data`; keep them in the message for classification.
            let message = match err.data {
                Some(Value::String(data)) if !data.is_empty() => format!("{} ({data})", err.message),
                _ => err.message,
            };
            return Err(ChainError::Rpc {
                code: err.code,
                message,
            });
        }

        serde_json::from_value(resp.result.unwrap_or(Value::Null))
            .map_err(|e| ChainError::InvalidResponse(format!("{method}: {e}")))
    }

    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        let id: U64 = self.request("eth_chainId", json!([])).await?;
        Ok(id.to::<u64>())
    }

    pub async fn accounts(&self) -> Result<Vec<Address>, ChainError> {
        self.request("eth_accounts", json!([])).await
    }

    /// Read-only contract call against the latest block.
    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        self.request("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await
    }

    pub async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, ChainError> {
        let gas: U64 = self.request("eth_estimateGas", json!([tx])).await?;
        Ok(gas.to::<u64>())
    }

    pub async fn send_transaction(&self, tx: &TransactionRequest) -> Result<B256, ChainError> {
        self.request("eth_sendTransaction", json!([tx])).await
    }

    pub async fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        self.request("eth_getTransactionReceipt", json!([tx_hash]))
            .await
    }

    /// Poll for a receipt until it appears or `timeout` elapses.
    pub async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<TransactionReceipt, ChainError> {
        let deadline = deadline_after(timeout);
        loop {
            if let Some(receipt) = self.transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ChainError::ConfirmationTimeout {
                    tx_hash,
                    waited: timeout,
                });
            }
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }
}
