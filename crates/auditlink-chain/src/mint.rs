//! Audit badge minting.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolCall;
use auditlink_core::config::NetworkConfig;
use auditlink_core::{Config, NetworkId, validate_address};
use tracing::{info, warn};

use crate::abi::IAuditBadge;
use crate::error::{ChainError, MintError, Rejection};
use crate::logs::{LogLookup, minted_token_id};
use crate::rpc::TransactionRequest;
use crate::wallet::WalletProvider;

/// Token id of a freshly minted badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintedToken {
    Known(U256),
    /// The receipt carried no mint event; look the token up by owner instead.
    Unknown,
}

impl MintedToken {
    pub const fn id(&self) -> Option<U256> {
        match self {
            Self::Known(id) => Some(*id),
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    pub transaction_hash: B256,
    pub token_id: MintedToken,
    pub contract: Address,
    pub network: NetworkId,
}

/// Mints audit badges through a [`WalletProvider`].
pub struct BadgeMinter {
    wallet: Arc<dyn WalletProvider>,
    networks: HashMap<NetworkId, NetworkConfig>,
}

impl BadgeMinter {
    pub fn new(wallet: Arc<dyn WalletProvider>, networks: HashMap<NetworkId, NetworkConfig>) -> Self {
        Self { wallet, networks }
    }

    pub fn from_config(wallet: Arc<dyn WalletProvider>, config: &Config) -> Self {
        Self::new(wallet, config.networks.clone())
    }

    fn badge_contract(&self, network: NetworkId) -> Result<Address, MintError> {
        self.networks
            .get(&network)
            .and_then(|c| c.nft_contract.as_deref())
            .and_then(|a| a.parse().ok())
            .ok_or(MintError::NetworkNotConfigured(network))
    }

    /// Mint a badge for `to` pointing at already-uploaded metadata.
    ///
    /// The wallet must already be on `network`; no automatic switching happens.
    pub async fn mint(
        &self,
        to: &str,
        metadata_uri: &str,
        network: NetworkId,
    ) -> Result<MintReceipt, MintError> {
        let recipient: Address = validate_address(to)
            .ok()
            .and_then(|a| a.parse().ok())
            .ok_or_else(|| MintError::InvalidRecipient(to.to_string()))?;
        if metadata_uri.trim().is_empty() {
            return Err(MintError::MissingMetadataUri);
        }
        let contract = self.badge_contract(network)?;

        let actual_chain_id = self.wallet.chain_id().await?;
        if actual_chain_id != network.chain_id() {
            return Err(MintError::NetworkMismatch {
                expected: network,
                actual_chain_id,
            });
        }

        let call = IAuditBadge::mintBadgeWithURICall {
            to: recipient,
            uri: metadata_uri.trim().to_string(),
        };
        let tx = TransactionRequest {
            from: Some(self.wallet.address()),
            to: contract,
            data: call.abi_encode().into(),
            gas: None,
        };

        let tx_hash = self
            .wallet
            .send_transaction(tx)
            .await
            .map_err(MintError::from_send)?;
        info!(%tx_hash, %recipient, network = %network, "Mint transaction sent");

        let receipt = self
            .wallet
            .wait_for_receipt(tx_hash)
            .await
            .map_err(MintError::from_send)?;
        if !receipt.succeeded() {
            return Err(MintError::Reverted {
                reason: format!("transaction {tx_hash} reverted"),
            });
        }

        let token_id = match minted_token_id(&receipt.logs, contract) {
            LogLookup::Found(id) => MintedToken::Known(id),
            LogLookup::NotFound => {
                warn!(%tx_hash, "Mint confirmed but no mint event found in receipt");
                MintedToken::Unknown
            }
        };
        info!(%tx_hash, ?token_id, "Badge minted");

        Ok(MintReceipt {
            transaction_hash: tx_hash,
            token_id,
            contract,
            network,
        })
    }

    /// Metadata URI of an existing badge; `None` if the token does not exist.
    pub async fn token_uri(
        &self,
        token_id: U256,
        network: NetworkId,
    ) -> Result<Option<String>, MintError> {
        let contract = self.badge_contract(network)?;
        let call = IAuditBadge::tokenURICall { tokenId: token_id };
        let raw = match self.wallet.call(contract, call.abi_encode().into()).await {
            Ok(raw) => raw,
            Err(e) if matches!(e.rejection(), Some(Rejection::Reverted(_))) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let uri = IAuditBadge::tokenURICall::abi_decode_returns(&raw, true)
            .map_err(ChainError::from)?
            ._0;
        Ok(Some(uri))
    }
}
