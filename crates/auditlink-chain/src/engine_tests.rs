use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U64};
use alloy_sol_types::SolCall;
use auditlink_core::{Config, NetworkId};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::testing::{RpcFailure, ScriptedWallet, audit_requested_log, status_response};

const TARGET: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";
const REPORT: &str = r#"{"score":91,"securityLevel":"Low Risk","aiSummary":"No critical findings","gasOptimizationScore":80,"hasReentrancyProtection":true,"hasAccessControl":true,"hasInputValidation":false}"#;

fn sepolia_consumer() -> Address {
    Config::default()
        .network(NetworkId::Sepolia)
        .and_then(|n| n.audit_contract.as_deref())
        .unwrap()
        .parse()
        .unwrap()
}

fn engine(wallet: &Arc<ScriptedWallet>) -> AuditEngine {
    let wallet: Arc<dyn WalletProvider> = wallet.clone();
    AuditEngine::from_config(wallet, &Config::default())
}

fn sepolia_wallet() -> ScriptedWallet {
    ScriptedWallet::new(NetworkId::Sepolia.chain_id())
}

fn fast(max_wait: Duration) -> PollOptions {
    PollOptions {
        interval: Duration::from_millis(1),
        max_wait,
    }
}

// =============================================================================
// Gas policy
// =============================================================================

#[test]
fn gas_limit_applies_margin_and_floor() {
    assert_eq!(gas_limit_with_margin(500_000, 800_000), 800_000);
    assert_eq!(gas_limit_with_margin(1_000_000, 800_000), 1_200_000);
    assert_eq!(gas_limit_with_margin(0, 0), 0);
    assert_eq!(gas_limit_with_margin(u64::MAX, 0), u64::MAX / 100);
}

// =============================================================================
// Submission
// =============================================================================

#[tokio::test]
async fn submit_recovers_request_id_from_event() {
    let id = B256::repeat_byte(0x42);
    let target: Address = TARGET.parse().unwrap();
    let wallet = Arc::new(
        sepolia_wallet()
            .with_gas_estimate(1_000_000)
            .with_receipt_logs(vec![audit_requested_log(sepolia_consumer(), target, id)]),
    );

    let handle = engine(&wallet)
        .submit_audit_request(TARGET, None, NetworkId::Sepolia)
        .await
        .unwrap();

    assert_eq!(handle.request_id, id);
    assert_eq!(handle.request_id_source, RequestIdSource::Event);
    assert!(!handle.is_degraded());
    assert_eq!(handle.contract_address, target);

    let sent = wallet.sent_transactions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, sepolia_consumer());
    assert_eq!(sent[0].gas, Some(U64::from(1_200_000)));

    let call = IAuditConsumer::sendAuditRequestCall::abi_decode(&sent[0].data, true).unwrap();
    assert_eq!(call.subscriptionId, 4910);
    assert_eq!(call.args, vec![target.to_checksum(None), "sepolia".to_string()]);
}

#[tokio::test]
async fn submit_uses_gas_floor() {
    let wallet = Arc::new(sepolia_wallet().with_gas_estimate(100_000));
    engine(&wallet)
        .submit_audit_request(TARGET, None, NetworkId::Sepolia)
        .await
        .unwrap();
    assert_eq!(wallet.sent_transactions()[0].gas, Some(U64::from(800_000)));
}

#[tokio::test]
async fn submit_without_event_falls_back_to_random_id() {
    let wallet = Arc::new(sepolia_wallet());
    let handle = engine(&wallet)
        .submit_audit_request(TARGET, None, NetworkId::Sepolia)
        .await
        .unwrap();
    assert_eq!(handle.request_id_source, RequestIdSource::Fallback);
    assert!(handle.is_degraded());
    assert_ne!(handle.request_id, B256::ZERO);
}

#[tokio::test]
async fn submit_rejects_invalid_address_before_touching_wallet() {
    let wallet = Arc::new(sepolia_wallet());
    let err = engine(&wallet)
        .submit_audit_request("0x1234", None, NetworkId::Sepolia)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::InvalidAddress(_)));
    assert_eq!(wallet.estimate_count(), 0);
}

#[tokio::test]
async fn submit_requires_configured_network() {
    let wallet = Arc::new(ScriptedWallet::new(1));
    let err = engine(&wallet)
        .submit_audit_request(TARGET, None, NetworkId::Mainnet)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::NetworkNotConfigured(NetworkId::Mainnet)));
}

#[tokio::test]
async fn submit_refuses_wrong_chain() {
    let wallet = Arc::new(ScriptedWallet::new(1));
    let err = engine(&wallet)
        .submit_audit_request(TARGET, None, NetworkId::Sepolia)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::NetworkMismatch {
            expected: NetworkId::Sepolia,
            actual_chain_id: 1
        }
    ));
    assert_eq!(wallet.estimate_count(), 0);
}

#[tokio::test]
async fn estimate_failure_is_terminal() {
    let wallet = Arc::new(
        sepolia_wallet().failing_estimate(RpcFailure::new(-32000, "execution reverted")),
    );
    let err = engine(&wallet)
        .submit_audit_request(TARGET, None, NetworkId::Sepolia)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::GasEstimation { .. }));
    assert!(wallet.sent_transactions().is_empty());
}

#[tokio::test]
async fn wallet_rejection_is_reported_as_such() {
    let wallet = Arc::new(
        sepolia_wallet().failing_send(RpcFailure::new(4001, "User rejected the request.")),
    );
    let err = engine(&wallet)
        .submit_audit_request(TARGET, None, NetworkId::Sepolia)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::UserRejected));
}

#[tokio::test]
async fn insufficient_funds_on_send() {
    let wallet = Arc::new(sepolia_wallet().failing_send(RpcFailure::new(
        -32000,
        "insufficient funds for gas * price + value",
    )));
    let err = engine(&wallet)
        .submit_audit_request(TARGET, None, NetworkId::Sepolia)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::InsufficientFunds));
}

#[tokio::test]
async fn reverted_receipt_is_reverted() {
    let wallet = Arc::new(sepolia_wallet().reverting());
    let err = engine(&wallet)
        .submit_audit_request(TARGET, None, NetworkId::Sepolia)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Reverted { .. }));
    assert!(err.to_string().contains("unverified target contract"));
}

// =============================================================================
// Status reads and polling
// =============================================================================

#[tokio::test]
async fn check_status_pending_carries_partial_summary() {
    let wallet =
        Arc::new(sepolia_wallet().with_call_responses([status_response(false, "", "", "working")]));
    let status = engine(&wallet)
        .check_status(B256::ZERO, NetworkId::Sepolia)
        .await
        .unwrap();
    assert_eq!(
        status,
        RequestStatus::Pending {
            ai_summary: "working".into()
        }
    );
}

#[tokio::test]
async fn poll_returns_report_once_completed() {
    let wallet = Arc::new(sepolia_wallet().with_call_responses([
        status_response(false, "", "", ""),
        status_response(false, "", "", ""),
        status_response(true, REPORT, "", "No critical findings"),
    ]));
    let report = engine(&wallet)
        .poll_for_completion(
            B256::repeat_byte(1),
            NetworkId::Sepolia,
            fast(Duration::from_secs(5)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.score, 91);
    assert_eq!(report.gas_optimization_score, Some(80));
    assert!(report.has_reentrancy_protection);
    assert!(!report.has_input_validation);
    assert_eq!(wallet.call_count(), 3);
}

#[tokio::test]
async fn huge_poll_window_does_not_overflow() {
    let wallet = Arc::new(sepolia_wallet().with_call_responses([
        status_response(false, "", "", ""),
        status_response(true, REPORT, "", ""),
    ]));
    let report = engine(&wallet)
        .poll_for_completion(
            B256::repeat_byte(3),
            NetworkId::Sepolia,
            fast(Duration::from_secs(u64::MAX)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.score, 91);
    assert_eq!(wallet.call_count(), 2);
}

#[tokio::test]
async fn repolling_a_completed_request_returns_the_same_report() {
    let wallet = Arc::new(sepolia_wallet().with_call_responses([status_response(true, REPORT, "", "")]));
    let engine = engine(&wallet);
    let cancel = CancellationToken::new();
    let id = B256::repeat_byte(2);

    let first = engine
        .poll_for_completion(id, NetworkId::Sepolia, fast(Duration::from_secs(1)), &cancel)
        .await
        .unwrap();
    let second = engine
        .poll_for_completion(id, NetworkId::Sepolia, fast(Duration::from_secs(1)), &cancel)
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn poll_times_out_when_never_completed() {
    let wallet = Arc::new(sepolia_wallet().with_call_responses([status_response(false, "", "", "")]));
    let err = engine(&wallet)
        .poll_for_completion(
            B256::repeat_byte(3),
            NetworkId::Sepolia,
            fast(Duration::from_millis(1)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(matches!(err, PollError::Timeout { request_id, .. } if request_id == B256::repeat_byte(3)));
}

#[tokio::test]
async fn error_payload_is_surfaced_verbatim() {
    let wallet = Arc::new(sepolia_wallet().with_call_responses([status_response(
        false,
        "",
        "Etherscan: contract source not verified",
        "",
    )]));
    let err = engine(&wallet)
        .poll_for_completion(
            B256::repeat_byte(4),
            NetworkId::Sepolia,
            fast(Duration::from_secs(1)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    match err {
        PollError::Failed { message, .. } => {
            assert_eq!(message, "Etherscan: contract source not verified");
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn completed_with_garbage_is_malformed() {
    let wallet = Arc::new(
        sepolia_wallet().with_call_responses([status_response(true, "Score: 91/100", "", "")]),
    );
    let err = engine(&wallet)
        .poll_for_completion(
            B256::repeat_byte(5),
            NetworkId::Sepolia,
            fast(Duration::from_secs(1)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PollError::MalformedResult { .. }));
}

#[tokio::test]
async fn completed_without_score_is_malformed() {
    let wallet = Arc::new(sepolia_wallet().with_call_responses([status_response(
        true,
        r#"{"securityLevel":"Low Risk"}"#,
        "",
        "",
    )]));
    let err = engine(&wallet)
        .check_status(B256::ZERO, NetworkId::Sepolia)
        .await
        .unwrap_err();
    assert!(matches!(err, PollError::MalformedResult { .. }));
}

#[tokio::test]
async fn cancelled_before_first_read_does_not_touch_chain() {
    let wallet = Arc::new(sepolia_wallet().with_call_responses([status_response(false, "", "", "")]));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine(&wallet)
        .poll_for_completion(
            B256::repeat_byte(6),
            NetworkId::Sepolia,
            fast(Duration::from_secs(5)),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PollError::Cancelled { .. }));
    assert_eq!(wallet.call_count(), 0);
}

#[tokio::test]
async fn cancel_during_wait_stops_polling() {
    let wallet = Arc::new(sepolia_wallet().with_call_responses([status_response(false, "", "", "")]));
    let engine = engine(&wallet);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let err = engine
        .poll_for_completion(
            B256::repeat_byte(7),
            NetworkId::Sepolia,
            PollOptions {
                interval: Duration::from_secs(30),
                max_wait: Duration::from_secs(60),
            },
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PollError::Cancelled { .. }));
    assert_eq!(wallet.call_count(), 1);
}

#[tokio::test]
async fn read_failure_propagates() {
    let wallet = Arc::new(sepolia_wallet().failing_calls(RpcFailure::new(-32603, "internal error")));
    let err = engine(&wallet)
        .poll_for_completion(
            B256::repeat_byte(8),
            NetworkId::Sepolia,
            fast(Duration::from_secs(1)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PollError::Chain(ChainError::Rpc { code: -32603, .. })));
}

#[tokio::test]
async fn status_on_unconfigured_network() {
    let wallet = Arc::new(ScriptedWallet::new(1));
    let err = engine(&wallet)
        .check_status(B256::ZERO, NetworkId::Mainnet)
        .await
        .unwrap_err();
    assert!(matches!(err, PollError::NetworkNotConfigured(NetworkId::Mainnet)));
}
