//! Wallet capability.
//!
//! The engine and minter only ever talk to a [`WalletProvider`]. Two adapters
//! ship here: [`RpcWallet`] signs through a node that manages the account
//! (`eth_sendTransaction`), and [`WatchOnlyWallet`] can read but never sign.

use std::time::Duration;

use alloy_primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use tracing::info;

use crate::error::ChainError;
use crate::rpc::{RpcClient, TransactionReceipt, TransactionRequest};

/// Interval between receipt lookups while waiting for confirmation.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Account plus the chain operations performed on its behalf.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Connected account.
    fn address(&self) -> Address;

    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Read-only call against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, ChainError>;

    /// Sign and broadcast. Returns the transaction hash.
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256, ChainError>;

    /// Block until the transaction has one confirmation.
    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt, ChainError>;
}

/// Node-managed account (dev node, Frame, Clef, or any signer exposing `eth_sendTransaction`).
#[derive(Debug)]
pub struct RpcWallet {
    rpc: RpcClient,
    account: Address,
    confirmation_timeout: Duration,
    receipt_poll: Duration,
}

impl RpcWallet {
    /// Connect to `url`. Without an explicit account the node's first unlocked account is used.
    pub async fn connect(
        url: &str,
        account: Option<Address>,
        confirmation_timeout: Duration,
    ) -> Result<Self, ChainError> {
        let rpc = RpcClient::new(url)?;
        let account = match account {
            Some(account) => account,
            None => rpc.accounts().await?.into_iter().next().ok_or_else(|| {
                ChainError::SignerUnavailable(format!(
                    "node at {} exposes no accounts",
                    rpc.endpoint()
                ))
            })?,
        };
        info!(%account, endpoint = %rpc.endpoint(), "Wallet connected");
        Ok(Self {
            rpc,
            account,
            confirmation_timeout,
            receipt_poll: RECEIPT_POLL_INTERVAL,
        })
    }

    #[must_use]
    pub const fn with_receipt_poll(mut self, interval: Duration) -> Self {
        self.receipt_poll = interval;
        self
    }
}

#[async_trait]
impl WalletProvider for RpcWallet {
    fn address(&self) -> Address {
        self.account
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.rpc.chain_id().await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        self.rpc.call(to, data).await
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, ChainError> {
        self.rpc.estimate_gas(tx).await
    }

    async fn send_transaction(&self, mut tx: TransactionRequest) -> Result<B256, ChainError> {
        tx.from = Some(self.account);
        self.rpc.send_transaction(&tx).await
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt, ChainError> {
        self.rpc
            .wait_for_receipt(tx_hash, self.receipt_poll, self.confirmation_timeout)
            .await
    }
}

/// Read-only wallet for status checks and re-polling; any signing request fails.
#[derive(Debug)]
pub struct WatchOnlyWallet {
    rpc: RpcClient,
    address: Address,
    confirmation_timeout: Duration,
}

impl WatchOnlyWallet {
    pub fn new(url: &str, address: Address, confirmation_timeout: Duration) -> Result<Self, ChainError> {
        Ok(Self {
            rpc: RpcClient::new(url)?,
            address,
            confirmation_timeout,
        })
    }
}

#[async_trait]
impl WalletProvider for WatchOnlyWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.rpc.chain_id().await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        self.rpc.call(to, data).await
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, ChainError> {
        self.rpc.estimate_gas(tx).await
    }

    async fn send_transaction(&self, _tx: TransactionRequest) -> Result<B256, ChainError> {
        Err(ChainError::SignerUnavailable(format!(
            "{} is watch-only; connect a signing wallet to send transactions",
            self.address
        )))
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt, ChainError> {
        self.rpc
            .wait_for_receipt(tx_hash, RECEIPT_POLL_INTERVAL, self.confirmation_timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn watch_only_refuses_to_sign() {
        let wallet = WatchOnlyWallet::new(
            "http://127.0.0.1:1",
            Address::repeat_byte(1),
            Duration::from_secs(1),
        )
        .unwrap();
        let err = wallet
            .send_transaction(TransactionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::SignerUnavailable(_)));
        assert_eq!(wallet.address(), Address::repeat_byte(1));
    }

    #[test]
    fn watch_only_rejects_empty_url() {
        let err = WatchOnlyWallet::new("", Address::ZERO, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
    }
}
