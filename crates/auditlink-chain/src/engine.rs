//! On-chain audit request/poll engine.
//!
//! Submits an audit job to the consumer contract, recovers the request id from
//! the receipt, then reads `getRequestStatus` until the compute network writes
//! back a report, reports an error, or the caller's window closes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U64};
use alloy_sol_types::SolCall;
use auditlink_core::config::{NetworkConfig, PollingConfig};
use auditlink_core::{Config, NetworkId, OnChainReport, validate_address};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::abi::IAuditConsumer;
use crate::error::{ChainError, PollError, SubmitError};
use crate::logs::{LogLookup, audit_request_id};
use crate::rpc::{TransactionRequest, deadline_after};
use crate::wallet::WalletProvider;

/// Margin applied on top of the node's gas estimate, in percent.
pub const GAS_MARGIN_PERCENT: u64 = 120;

/// `max(estimate * 1.2, floor)`.
pub const fn gas_limit_with_margin(estimate: u64, floor: u64) -> u64 {
    let padded = estimate.saturating_mul(GAS_MARGIN_PERCENT) / 100;
    if padded > floor { padded } else { floor }
}

/// Where a request id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestIdSource {
    /// Decoded from the `AuditRequested` event.
    Event,
    /// The event was missing; a random id stands in and polling it will not find the job.
    Fallback,
}

/// A submitted, confirmed audit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainRequestHandle {
    pub request_id: B256,
    pub transaction_hash: B256,
    pub contract_address: Address,
    pub network: NetworkId,
    pub request_id_source: RequestIdSource,
}

impl OnChainRequestHandle {
    pub const fn is_degraded(&self) -> bool {
        matches!(self.request_id_source, RequestIdSource::Fallback)
    }
}

/// One read of `getRequestStatus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Pending { ai_summary: String },
    Completed(OnChainReport),
    /// The error payload, verbatim.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollOptions {
    fn from(cfg: &PollingConfig) -> Self {
        Self {
            interval: cfg.interval(),
            max_wait: cfg.max_wait(),
        }
    }
}

/// Drives audit requests through a [`WalletProvider`].
pub struct AuditEngine {
    wallet: Arc<dyn WalletProvider>,
    networks: HashMap<NetworkId, NetworkConfig>,
}

impl AuditEngine {
    pub fn new(wallet: Arc<dyn WalletProvider>, networks: HashMap<NetworkId, NetworkConfig>) -> Self {
        Self { wallet, networks }
    }

    pub fn from_config(wallet: Arc<dyn WalletProvider>, config: &Config) -> Self {
        Self::new(wallet, config.networks.clone())
    }

    pub fn wallet(&self) -> &Arc<dyn WalletProvider> {
        &self.wallet
    }

    /// Consumer contract and settings, if the network accepts audits.
    fn consumer(&self, network: NetworkId) -> Option<(Address, &NetworkConfig)> {
        let cfg = self.networks.get(&network).filter(|c| c.audit_ready())?;
        let address = cfg.audit_contract.as_deref()?.parse().ok()?;
        Some((address, cfg))
    }

    /// Submit an audit job for `contract_address` and wait for one confirmation.
    ///
    /// `source_hint` is only logged; the compute job fetches verified source itself.
    pub async fn submit_audit_request(
        &self,
        contract_address: &str,
        source_hint: Option<&str>,
        network: NetworkId,
    ) -> Result<OnChainRequestHandle, SubmitError> {
        let target: Address = validate_address(contract_address)
            .ok()
            .and_then(|a| a.parse().ok())
            .ok_or_else(|| SubmitError::InvalidAddress(contract_address.to_string()))?;
        let (consumer, cfg) = self
            .consumer(network)
            .ok_or(SubmitError::NetworkNotConfigured(network))?;

        let actual_chain_id = self.wallet.chain_id().await?;
        if actual_chain_id != network.chain_id() {
            return Err(SubmitError::NetworkMismatch {
                expected: network,
                actual_chain_id,
            });
        }

        let call = IAuditConsumer::sendAuditRequestCall {
            subscriptionId: cfg.subscription_id,
            args: vec![target.to_checksum(None), network.as_str().to_string()],
        };
        let mut tx = TransactionRequest {
            from: Some(self.wallet.address()),
            to: consumer,
            data: call.abi_encode().into(),
            gas: None,
        };

        let estimate = self
            .wallet
            .estimate_gas(&tx)
            .await
            .map_err(SubmitError::from_estimate)?;
        let gas = gas_limit_with_margin(estimate, cfg.min_gas_limit);
        tx.gas = Some(U64::from(gas));
        debug!(
            %target,
            network = %network,
            estimate,
            gas,
            source_bytes = source_hint.map_or(0, str::len),
            "Submitting audit request"
        );

        let tx_hash = self
            .wallet
            .send_transaction(tx)
            .await
            .map_err(SubmitError::from_send)?;
        info!(%tx_hash, %target, "Audit request sent, waiting for confirmation");

        let receipt = self
            .wallet
            .wait_for_receipt(tx_hash)
            .await
            .map_err(SubmitError::from_send)?;
        if !receipt.succeeded() {
            return Err(SubmitError::Reverted {
                reason: format!("transaction {tx_hash} reverted"),
            });
        }

        let (request_id, request_id_source) = match audit_request_id(&receipt.logs, consumer) {
            LogLookup::Found(id) => (id, RequestIdSource::Event),
            LogLookup::NotFound => {
                let id = B256::from(rand::random::<[u8; 32]>());
                warn!(
                    %tx_hash,
                    fallback_id = %id,
                    "AuditRequested event missing from receipt; polling will not find this request"
                );
                (id, RequestIdSource::Fallback)
            }
        };

        info!(%request_id, %tx_hash, "Audit request confirmed");
        Ok(OnChainRequestHandle {
            request_id,
            transaction_hash: tx_hash,
            contract_address: target,
            network,
            request_id_source,
        })
    }

    /// Read the current state of `request_id` once.
    pub async fn check_status(
        &self,
        request_id: B256,
        network: NetworkId,
    ) -> Result<RequestStatus, PollError> {
        let (consumer, _) = self
            .consumer(network)
            .ok_or(PollError::NetworkNotConfigured(network))?;
        let call = IAuditConsumer::getRequestStatusCall {
            requestId: request_id,
        };
        let raw = self.wallet.call(consumer, call.abi_encode().into()).await?;
        let status = IAuditConsumer::getRequestStatusCall::abi_decode_returns(&raw, true)
            .map_err(ChainError::from)?;

        if status.completed && !status.response.is_empty() {
            return parse_report(&status.response)
                .map(RequestStatus::Completed)
                .map_err(|reason| PollError::MalformedResult { request_id, reason });
        }
        if !status.errorPayload.is_empty() {
            return Ok(RequestStatus::Failed(
                String::from_utf8_lossy(&status.errorPayload).into_owned(),
            ));
        }
        Ok(RequestStatus::Pending {
            ai_summary: status.aiSummary,
        })
    }

    /// Poll until the request completes, fails, the window closes, or `cancel` fires.
    ///
    /// Read errors are not retried. Cancelling only stops local polling.
    pub async fn poll_for_completion(
        &self,
        request_id: B256,
        network: NetworkId,
        options: PollOptions,
        cancel: &CancellationToken,
    ) -> Result<OnChainReport, PollError> {
        let deadline = deadline_after(options.max_wait);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let status = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PollError::Cancelled { request_id }),
                status = self.check_status(request_id, network) => status?,
            };

            match status {
                RequestStatus::Completed(report) => {
                    info!(%request_id, attempt, score = report.score, "Audit completed");
                    return Ok(report);
                }
                RequestStatus::Failed(message) => {
                    warn!(%request_id, attempt, error = %message, "Audit failed on-chain");
                    return Err(PollError::Failed {
                        request_id,
                        message,
                    });
                }
                RequestStatus::Pending { .. } => {
                    debug!(%request_id, attempt, "Audit still pending");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(%request_id, attempt, "Gave up waiting for audit result");
                return Err(PollError::Timeout {
                    request_id,
                    waited: options.max_wait,
                });
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PollError::Cancelled { request_id }),
                () = tokio::time::sleep(options.interval.min(deadline - now)) => {}
            }
        }
    }
}

fn parse_report(bytes: &[u8]) -> Result<OnChainReport, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| format!("response is not UTF-8: {e}"))?;
    serde_json::from_str(text.trim()).map_err(|e| e.to_string())
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
