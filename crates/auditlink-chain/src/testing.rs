//! Scripted wallet and event builders for tests.
//!
//! Enabled in this crate's own tests and, for dependents, via the `test-utils` feature.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use alloy_primitives::{Address, B256, Bytes, U64, U256};
use alloy_sol_types::{SolCall, SolEvent};
use async_trait::async_trait;

use crate::abi::{IAuditBadge, IAuditConsumer};
use crate::error::ChainError;
use crate::rpc::{Log, TransactionReceipt, TransactionRequest};
use crate::wallet::WalletProvider;

/// Hash returned for every scripted transaction.
pub const SCRIPTED_TX_HASH: B256 = B256::new([0x7a; 32]);

/// Canned JSON-RPC error.
#[derive(Debug, Clone)]
pub struct RpcFailure {
    pub code: i64,
    pub message: String,
}

impl RpcFailure {
    pub fn new(code: i64, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    fn to_error(&self) -> ChainError {
        ChainError::Rpc {
            code: self.code,
            message: self.message.clone(),
        }
    }
}

type CallResponse = Result<Bytes, RpcFailure>;

/// In-memory [`WalletProvider`] driven by canned responses.
///
/// `call` answers from a queue; once drained, the last answer repeats.
#[derive(Debug)]
pub struct ScriptedWallet {
    address: Address,
    chain_id: u64,
    gas_estimate: Result<u64, RpcFailure>,
    send_failure: Option<RpcFailure>,
    receipt_logs: Vec<Log>,
    receipt_status: u64,
    calls: Mutex<VecDeque<CallResponse>>,
    last_call: Mutex<Option<CallResponse>>,
    sent: Mutex<Vec<TransactionRequest>>,
    call_count: AtomicUsize,
    estimate_count: AtomicUsize,
}

impl ScriptedWallet {
    pub fn new(chain_id: u64) -> Self {
        Self {
            address: Address::new([0xaa; 20]),
            chain_id,
            gas_estimate: Ok(500_000),
            send_failure: None,
            receipt_logs: Vec::new(),
            receipt_status: 1,
            calls: Mutex::new(VecDeque::new()),
            last_call: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            estimate_count: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub const fn with_address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    #[must_use]
    pub fn with_gas_estimate(mut self, gas: u64) -> Self {
        self.gas_estimate = Ok(gas);
        self
    }

    #[must_use]
    pub fn failing_estimate(mut self, failure: RpcFailure) -> Self {
        self.gas_estimate = Err(failure);
        self
    }

    #[must_use]
    pub fn failing_send(mut self, failure: RpcFailure) -> Self {
        self.send_failure = Some(failure);
        self
    }

    #[must_use]
    pub fn with_receipt_logs(mut self, logs: Vec<Log>) -> Self {
        self.receipt_logs = logs;
        self
    }

    /// Receipts come back with `status = 0`.
    #[must_use]
    pub const fn reverting(mut self) -> Self {
        self.receipt_status = 0;
        self
    }

    /// Queue answers for `call`.
    #[must_use]
    pub fn with_call_responses(self, responses: impl IntoIterator<Item = Bytes>) -> Self {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(responses.into_iter().map(Ok));
        self
    }

    #[must_use]
    pub fn failing_calls(self, failure: RpcFailure) -> Self {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(failure));
        self
    }

    /// Transactions passed to `send_transaction`, in order.
    pub fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn estimate_count(&self) -> usize {
        self.estimate_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletProvider for ScriptedWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.chain_id)
    }

    async fn call(&self, _to: Address, _data: Bytes) -> Result<Bytes, ChainError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let next = self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last_call.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = next {
            *last = Some(next);
        }
        match last.as_ref() {
            Some(Ok(bytes)) => Ok(bytes.clone()),
            Some(Err(failure)) => Err(failure.to_error()),
            None => Err(ChainError::InvalidResponse("no scripted call response".into())),
        }
    }

    async fn estimate_gas(&self, _tx: &TransactionRequest) -> Result<u64, ChainError> {
        self.estimate_count.fetch_add(1, Ordering::SeqCst);
        self.gas_estimate.clone().map_err(|f| f.to_error())
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256, ChainError> {
        if let Some(failure) = &self.send_failure {
            return Err(failure.to_error());
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        Ok(SCRIPTED_TX_HASH)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt, ChainError> {
        Ok(TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: Some(U64::from(1)),
            status: Some(U64::from(self.receipt_status)),
            gas_used: Some(U256::from(21_000)),
            logs: self.receipt_logs.clone(),
        })
    }
}

/// ABI-encoded `getRequestStatus` return value.
pub fn status_response(completed: bool, response: &str, error: &str, ai_summary: &str) -> Bytes {
    IAuditConsumer::getRequestStatusCall::abi_encode_returns(&(
        completed,
        Bytes::copy_from_slice(response.as_bytes()),
        Bytes::copy_from_slice(error.as_bytes()),
        ai_summary.to_string(),
    ))
    .into()
}

/// ABI-encoded `tokenURI` return value.
pub fn token_uri_response(uri: &str) -> Bytes {
    IAuditBadge::tokenURICall::abi_encode_returns(&(uri.to_string(),)).into()
}

/// `AuditRequested` emitted by `consumer`.
pub fn audit_requested_log(consumer: Address, target: Address, request_id: B256) -> Log {
    Log {
        address: consumer,
        topics: vec![
            IAuditConsumer::AuditRequested::SIGNATURE_HASH,
            target.into_word(),
            request_id,
        ],
        data: Bytes::new(),
    }
}

/// ERC-721 mint `Transfer(0x0, to, tokenId)` emitted by `badge`.
pub fn mint_transfer_log(badge: Address, to: Address, token_id: u64) -> Log {
    Log {
        address: badge,
        topics: vec![
            IAuditBadge::Transfer::SIGNATURE_HASH,
            B256::ZERO,
            to.into_word(),
            B256::from(U256::from(token_id)),
        ],
        data: Bytes::new(),
    }
}
