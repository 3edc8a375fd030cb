//! Error types for the on-chain layer.
//!
//! `ChainError` is the transport-level failure. `SubmitError`, `PollError` and
//! `MintError` are the user-facing taxonomies; none of them is retried
//! automatically.

use std::time::Duration;

use alloy_primitives::B256;
use auditlink_core::NetworkId;
use thiserror::Error;

/// EIP-1193 "user rejected request".
const USER_REJECTED_CODE: i64 = 4001;
/// Geth's code for `execution reverted` with revert data.
const EXECUTION_REVERTED_CODE: i64 = 3;

/// Hint attached to gas-estimation failures.
pub const GAS_ESTIMATION_HINT: &str = "common causes: the target contract is not verified on the explorer, \
     the compute subscription has run out of request budget, or the wallet is on a different network";

/// Hint attached to reverted submissions.
pub const REVERT_HINT: &str = "common causes: unverified target contract, invalid contract address, \
     network mismatch, or an underfunded compute subscription";

/// Transport and decoding failures talking to a wallet or RPC provider.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Unexpected RPC response: {0}")]
    InvalidResponse(String),

    #[error("ABI decode error: {0}")]
    Abi(#[from] alloy_sol_types::Error),

    #[error("No signer available: {0}")]
    SignerUnavailable(String),

    #[error("Timed out after {waited:?} waiting for transaction {tx_hash} to confirm")]
    ConfirmationTimeout { tx_hash: B256, waited: Duration },

    #[error("Configuration error: {0}")]
    Config(String),
}

// RPC endpoints commonly embed a provider key in the URL.
impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

/// Why a wallet refused or the chain rejected a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    UserRejected,
    InsufficientFunds,
    Reverted(String),
}

impl ChainError {
    /// Classify wallet/node errors that have a specific user remedy.
    pub fn rejection(&self) -> Option<Rejection> {
        let Self::Rpc { code, message } = self else {
            return None;
        };
        let lower = message.to_ascii_lowercase();
        if *code == USER_REJECTED_CODE || lower.contains("user rejected") || lower.contains("user denied") {
            Some(Rejection::UserRejected)
        } else if lower.contains("insufficient funds") {
            Some(Rejection::InsufficientFunds)
        } else if *code == EXECUTION_REVERTED_CODE || lower.contains("execution reverted") {
            Some(Rejection::Reverted(message.clone()))
        } else {
            None
        }
    }
}

/// Failures submitting an audit request. All terminal; the user may retry manually.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Invalid contract address '{0}'")]
    InvalidAddress(String),

    #[error("On-chain audits are not configured for {0} (missing audit contract or subscription)")]
    NetworkNotConfigured(NetworkId),

    #[error("Wallet is connected to chain {actual_chain_id}, expected {expected} (chain {})", expected.chain_id())]
    NetworkMismatch {
        expected: NetworkId,
        actual_chain_id: u64,
    },

    #[error("Gas estimation failed: {reason}; {GAS_ESTIMATION_HINT}")]
    GasEstimation { reason: String },

    #[error("Transaction was rejected in the wallet")]
    UserRejected,

    #[error("Insufficient funds to pay for gas; add ETH to the wallet")]
    InsufficientFunds,

    #[error("Transaction reverted: {reason}; {REVERT_HINT}")]
    Reverted { reason: String },

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl SubmitError {
    /// Map a wallet error raised while sending or confirming.
    pub(crate) fn from_send(err: ChainError) -> Self {
        match err.rejection() {
            Some(Rejection::UserRejected) => Self::UserRejected,
            Some(Rejection::InsufficientFunds) => Self::InsufficientFunds,
            Some(Rejection::Reverted(reason)) => Self::Reverted { reason },
            None => Self::Chain(err),
        }
    }

    /// Map a failure from `eth_estimateGas`.
    pub(crate) fn from_estimate(err: ChainError) -> Self {
        match err.rejection() {
            Some(Rejection::InsufficientFunds) => Self::InsufficientFunds,
            _ => Self::GasEstimation {
                reason: err.to_string(),
            },
        }
    }
}

/// Outcomes of a poll loop other than a completed report.
#[derive(Debug, Error)]
pub enum PollError {
    /// The window elapsed; the request may still complete later and can be re-polled.
    #[error("Audit {request_id} did not complete within {waited:?}; it may still finish, poll again later")]
    Timeout { request_id: B256, waited: Duration },

    /// The compute network reported an error payload.
    #[error("Audit {request_id} failed: {message}")]
    Failed { request_id: B256, message: String },

    /// `completed = true` but the payload is not the expected JSON.
    #[error("Audit {request_id} returned a malformed result: {reason}")]
    MalformedResult { request_id: B256, reason: String },

    /// The caller stopped waiting; the on-chain request continues.
    #[error("Polling for audit {request_id} was cancelled")]
    Cancelled { request_id: B256 },

    #[error("On-chain audits are not configured for {0}")]
    NetworkNotConfigured(NetworkId),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl PollError {
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Failures minting a badge. Terminal per attempt.
#[derive(Debug, Error)]
pub enum MintError {
    #[error("Invalid recipient address '{0}'")]
    InvalidRecipient(String),

    #[error("Metadata URI is missing; upload the badge metadata first")]
    MissingMetadataUri,

    #[error("Badge contract is not deployed on {0}")]
    NetworkNotConfigured(NetworkId),

    #[error("Wallet is connected to chain {actual_chain_id}, switch to {expected} before minting")]
    NetworkMismatch {
        expected: NetworkId,
        actual_chain_id: u64,
    },

    #[error("Mint was rejected in the wallet")]
    UserRejected,

    #[error("Insufficient funds to pay for gas")]
    InsufficientFunds,

    #[error("Mint transaction reverted: {reason}")]
    Reverted { reason: String },

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl MintError {
    pub(crate) fn from_send(err: ChainError) -> Self {
        match err.rejection() {
            Some(Rejection::UserRejected) => Self::UserRejected,
            Some(Rejection::InsufficientFunds) => Self::InsufficientFunds,
            Some(Rejection::Reverted(reason)) => Self::Reverted { reason },
            None => Self::Chain(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc(code: i64, message: &str) -> ChainError {
        ChainError::Rpc {
            code,
            message: message.into(),
        }
    }

    #[test]
    fn classifies_user_rejection_by_code_and_text() {
        assert_eq!(rpc(4001, "whatever").rejection(), Some(Rejection::UserRejected));
        assert_eq!(
            rpc(-32000, "MetaMask Tx Signature: User denied transaction signature.").rejection(),
            Some(Rejection::UserRejected)
        );
    }

    #[test]
    fn classifies_insufficient_funds() {
        assert_eq!(
            rpc(-32000, "insufficient funds for gas * price + value").rejection(),
            Some(Rejection::InsufficientFunds)
        );
    }

    #[test]
    fn classifies_revert() {
        assert!(matches!(
            rpc(3, "execution reverted: EmptyArgs").rejection(),
            Some(Rejection::Reverted(_))
        ));
        assert!(matches!(
            rpc(-32000, "execution reverted").rejection(),
            Some(Rejection::Reverted(_))
        ));
    }

    #[test]
    fn other_errors_are_unclassified() {
        assert_eq!(rpc(-32601, "method not found").rejection(), None);
        assert_eq!(ChainError::InvalidResponse("x".into()).rejection(), None);
    }

    #[test]
    fn estimate_failure_carries_hint() {
        let err = SubmitError::from_estimate(rpc(-32000, "gas required exceeds allowance"));
        assert!(matches!(err, SubmitError::GasEstimation { .. }));
        assert!(err.to_string().contains("not verified"));
    }

    #[test]
    fn estimate_insufficient_funds_is_specific() {
        let err = SubmitError::from_estimate(rpc(-32000, "insufficient funds for transfer"));
        assert!(matches!(err, SubmitError::InsufficientFunds));
    }

    #[test]
    fn timeout_is_distinct_from_failure() {
        let timeout = PollError::Timeout {
            request_id: B256::ZERO,
            waited: Duration::from_millis(1),
        };
        let failed = PollError::Failed {
            request_id: B256::ZERO,
            message: "boom".into(),
        };
        assert!(timeout.is_timeout());
        assert!(!failed.is_timeout());
    }
}
