//! Receipt log scanning.
//!
//! Missing or undecodable events are an expected outcome, never an error.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolEvent;

use crate::abi::{IAuditBadge, IAuditConsumer};
use crate::rpc::Log;

/// Result of looking for an event in a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLookup<T> {
    Found(T),
    NotFound,
}

impl<T> LogLookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(v) => Some(v),
            Self::NotFound => None,
        }
    }

    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// First log whose topic0 is `signature` and which `decode` accepts.
pub fn scan_logs<T>(
    logs: &[Log],
    signature: B256,
    decode: impl Fn(&Log) -> Option<T>,
) -> LogLookup<T> {
    logs.iter()
        .filter(|log| log.topics.first() == Some(&signature))
        .find_map(decode)
        .map_or(LogLookup::NotFound, LogLookup::Found)
}

/// Request id from the consumer's `AuditRequested(contract, requestId)` event.
pub fn audit_request_id(logs: &[Log], consumer: Address) -> LogLookup<B256> {
    scan_logs(logs, IAuditConsumer::AuditRequested::SIGNATURE_HASH, |log| {
        (log.address == consumer)
            .then(|| log.topics.get(2).copied())
            .flatten()
    })
}

/// Token id minted by the badge contract.
///
/// Prefers the ERC-721 `Transfer` from the zero address; falls back to `BadgeMinted`.
pub fn minted_token_id(logs: &[Log], badge: Address) -> LogLookup<U256> {
    let transfer = scan_logs(logs, IAuditBadge::Transfer::SIGNATURE_HASH, |log| {
        if log.address != badge || log.topics.len() != 4 || log.topics[1] != B256::ZERO {
            return None;
        }
        Some(U256::from_be_bytes(log.topics[3].0))
    });
    if transfer.is_found() {
        return transfer;
    }
    scan_logs(logs, IAuditBadge::BadgeMinted::SIGNATURE_HASH, |log| {
        if log.address != badge {
            return None;
        }
        log.topics.get(2).map(|t| U256::from_be_bytes(t.0))
    })
}
