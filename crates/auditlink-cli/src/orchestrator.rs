//! Audit orchestration.
//!
//! One [`AuditOrchestrator::run`] call drives a single audit through
//!
//! ```text
//! IDLE -> FETCHING_SOURCE -> EXPLAINING + SUBMITTING -> POLLING -> DONE
//!      \-> DIRECT_ANALYZING ------------------------------------/
//! ```
//!
//! and ends in either an [`AuditOutcome`] or an [`AuditFailure`]. The
//! explanation runs alongside submission and never aborts the audit.

use std::fmt;
use std::sync::Arc;

use auditlink_chain::{
    AuditEngine, B256, OnChainRequestHandle, PollError, PollOptions, SubmitError,
};
use auditlink_core::{AuditRequest, AuditResult, AuditTarget, NetworkId};
use auditlink_services::{CreditLedger, ExplorerClient, ExplorerError, GeminiClient, GeminiError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::AuditSession;

/// Where an audit currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditPhase {
    Idle,
    FetchingSource,
    Explaining,
    Submitting,
    Polling,
    DirectAnalyzing,
    Done,
    Failed,
}

impl AuditPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FetchingSource => "fetching source",
            Self::Explaining => "explaining",
            Self::Submitting => "submitting",
            Self::Polling => "polling",
            Self::DirectAnalyzing => "analyzing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AuditPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contents of the explanation panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Explanation {
    /// Direct audits do not request one.
    NotRequested,
    Ready(String),
    /// The explanation call failed; the audit itself carried on.
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    InvalidInput(#[from] auditlink_core::Error),

    #[error("No wallet connected; on-chain audits need a wallet on the target network")]
    WalletNotConnected,

    #[error("No audit credits left for {0}")]
    NoCredits(String),

    #[error("A poll is already running for this session")]
    PollInProgress,

    #[error(transparent)]
    Source(#[from] ExplorerError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Analysis(#[from] GeminiError),
}

impl AuditError {
    /// The only failure the user can fix by verifying the contract's source.
    pub const fn is_not_verified(&self) -> bool {
        matches!(self, Self::Source(e) if e.is_not_verified())
    }

    /// The job may still finish on-chain; `poll` can pick it up again.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Poll(e) if e.is_timeout())
    }
}

/// A terminal failure, with everything known up to that point.
#[derive(Debug, Error)]
#[error("Audit failed while {phase}: {error}")]
pub struct AuditFailure {
    /// Phase that was active when the failure happened.
    pub phase: AuditPhase,
    #[source]
    pub error: AuditError,
    pub phases: Vec<AuditPhase>,
    /// Pending or failed on-chain result, when a request was submitted.
    pub partial: Option<AuditResult>,
    pub explanation: Explanation,
}

impl AuditFailure {
    pub fn request_id(&self) -> Option<&str> {
        self.partial.as_ref()?.on_chain_request_id.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct AuditOutcome {
    pub result: AuditResult,
    pub explanation: Explanation,
    pub handle: Option<OnChainRequestHandle>,
    /// Balance after the audit, when the ledger could be read.
    pub balance: Option<u32>,
    pub phases: Vec<AuditPhase>,
}

/// Records the phase trail of one run.
struct Trail {
    phases: Vec<AuditPhase>,
}

impl Trail {
    fn new() -> Self {
        Self {
            phases: vec![AuditPhase::Idle],
        }
    }

    fn enter(&mut self, phase: AuditPhase) {
        debug!(%phase, "Audit phase");
        self.phases.push(phase);
    }

    fn current(&self) -> AuditPhase {
        self.phases.last().copied().unwrap_or(AuditPhase::Idle)
    }

    fn fail(
        mut self,
        error: impl Into<AuditError>,
        partial: Option<AuditResult>,
        explanation: Explanation,
    ) -> AuditFailure {
        let phase = self.current();
        let error = error.into();
        warn!(%phase, error = %error, "Audit failed");
        self.phases.push(AuditPhase::Failed);
        AuditFailure {
            phase,
            error,
            phases: self.phases,
            partial,
            explanation,
        }
    }
}

/// Drives audits across the explorer, the generative client, the on-chain
/// engine and the credit ledger.
pub struct AuditOrchestrator {
    explorer: ExplorerClient,
    analyst: GeminiClient,
    engine: Option<AuditEngine>,
    ledger: Arc<dyn CreditLedger>,
    poll: PollOptions,
}

impl AuditOrchestrator {
    pub fn new(explorer: ExplorerClient, analyst: GeminiClient, ledger: Arc<dyn CreditLedger>) -> Self {
        Self {
            explorer,
            analyst,
            engine: None,
            ledger,
            poll: PollOptions::default(),
        }
    }

    /// Enable the on-chain path.
    #[must_use]
    pub fn with_engine(mut self, engine: AuditEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    #[must_use]
    pub const fn with_poll_options(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    /// Run one audit to a terminal state.
    pub async fn run(
        &self,
        request: AuditRequest,
        session: &mut AuditSession,
        cancel: &CancellationToken,
    ) -> Result<AuditOutcome, AuditFailure> {
        let trail = Trail::new();
        if let Err(e) = request.validate() {
            return Err(trail.fail(e, None, Explanation::NotRequested));
        }
        match request.target {
            AuditTarget::SourceCode(code) => self.run_direct(&code, session, trail).await,
            AuditTarget::Address(address) => {
                self.run_on_chain(&address, request.network, session, cancel, trail)
                    .await
            }
        }
    }

    async fn run_direct(
        &self,
        code: &str,
        session: &AuditSession,
        mut trail: Trail,
    ) -> Result<AuditOutcome, AuditFailure> {
        trail.enter(AuditPhase::DirectAnalyzing);
        let result = match self.analyst.audit_code(code).await {
            Ok(result) => result,
            Err(e) => return Err(trail.fail(e, None, Explanation::NotRequested)),
        };
        trail.enter(AuditPhase::Done);
        Ok(AuditOutcome {
            result,
            explanation: Explanation::NotRequested,
            handle: None,
            balance: session.credits(),
            phases: trail.phases,
        })
    }

    async fn run_on_chain(
        &self,
        address: &str,
        network: NetworkId,
        session: &mut AuditSession,
        cancel: &CancellationToken,
        mut trail: Trail,
    ) -> Result<AuditOutcome, AuditFailure> {
        let (Some(engine), Some(wallet)) = (&self.engine, session.wallet().map(str::to_string))
        else {
            return Err(trail.fail(
                AuditError::WalletNotConnected,
                None,
                Explanation::NotRequested,
            ));
        };

        // Credit gate. An unreadable ledger does not block the audit.
        let credits = match session.credits() {
            Some(credits) => Some(credits),
            None => session.refresh_credits(self.ledger.as_ref()).await,
        };
        if credits == Some(0) {
            return Err(trail.fail(
                AuditError::NoCredits(wallet),
                None,
                Explanation::NotRequested,
            ));
        }

        trail.enter(AuditPhase::FetchingSource);
        let source = match self.explorer.fetch_source(address, network).await {
            Ok(source) => source,
            Err(e) => return Err(trail.fail(e, None, Explanation::NotRequested)),
        };

        trail.enter(AuditPhase::Explaining);
        trail.enter(AuditPhase::Submitting);
        let (explained, submitted) = tokio::join!(
            self.analyst.explain_contract(&source.source_code),
            engine.submit_audit_request(address, Some(&source.source_code), network),
        );
        let explanation = match explained {
            Ok(text) => Explanation::Ready(text),
            Err(e) => {
                warn!(error = %e, "Contract explanation unavailable");
                Explanation::Unavailable(e.to_string())
            }
        };
        let handle = match submitted {
            Ok(handle) => handle,
            Err(e) => return Err(trail.fail(e, None, explanation)),
        };

        let mut result = AuditResult::pending_on_chain(
            handle.request_id.to_string(),
            handle.transaction_hash.to_string(),
            handle.is_degraded(),
        );
        if handle.is_degraded() {
            // A fabricated id never resolves on-chain; hand back the pending result.
            warn!(
                tx_hash = %handle.transaction_hash,
                "Request id unknown, skipping poll"
            );
            return Ok(AuditOutcome {
                result,
                explanation,
                handle: Some(handle),
                balance: session.credits(),
                phases: trail.phases,
            });
        }

        trail.enter(AuditPhase::Polling);
        let Some(guard) = session.poll_slot().try_acquire() else {
            return Err(trail.fail(AuditError::PollInProgress, Some(result), explanation));
        };
        let polled = engine
            .poll_for_completion(handle.request_id, network, self.poll, cancel)
            .await;
        match polled {
            Ok(report) => result.apply_report(&report),
            Err(e) => {
                if let PollError::Failed { message, .. } = &e {
                    result.mark_failed(message);
                }
                return Err(trail.fail(e, Some(result), explanation));
            }
        }
        drop(guard);

        let balance = self
            .settle(session, &wallet, &handle.request_id.to_string())
            .await;
        trail.enter(AuditPhase::Done);
        info!(
            score = result.score,
            request_id = %handle.request_id,
            "On-chain audit done"
        );
        Ok(AuditOutcome {
            result,
            explanation,
            handle: Some(handle),
            balance,
            phases: trail.phases,
        })
    }

    /// Poll an earlier request again with a fresh window.
    pub async fn resume(
        &self,
        request_id: B256,
        network: NetworkId,
        session: &mut AuditSession,
        cancel: &CancellationToken,
    ) -> Result<AuditOutcome, AuditFailure> {
        let mut trail = Trail::new();
        let mut result = AuditResult {
            is_on_chain_audit: true,
            on_chain_request_id: Some(request_id.to_string()),
            ..AuditResult::default()
        };
        let Some(engine) = &self.engine else {
            return Err(trail.fail(
                AuditError::WalletNotConnected,
                Some(result),
                Explanation::NotRequested,
            ));
        };

        trail.enter(AuditPhase::Polling);
        let Some(guard) = session.poll_slot().try_acquire() else {
            return Err(trail.fail(
                AuditError::PollInProgress,
                Some(result),
                Explanation::NotRequested,
            ));
        };
        match engine
            .poll_for_completion(request_id, network, self.poll, cancel)
            .await
        {
            Ok(report) => result.apply_report(&report),
            Err(e) => {
                if let PollError::Failed { message, .. } = &e {
                    result.mark_failed(message);
                }
                return Err(trail.fail(e, Some(result), Explanation::NotRequested));
            }
        }
        drop(guard);

        let balance = match session.wallet().map(str::to_string) {
            Some(wallet) => {
                self.settle(session, &wallet, &request_id.to_string())
                    .await
            }
            None => None,
        };
        trail.enter(AuditPhase::Done);
        Ok(AuditOutcome {
            result,
            explanation: Explanation::NotRequested,
            handle: None,
            balance,
            phases: trail.phases,
        })
    }

    /// Charge one credit for a delivered result and refresh the balance.
    ///
    /// A request is charged once no matter how often it is polled. Ledger
    /// failures are logged; the result is already delivered.
    async fn settle(
        &self,
        session: &mut AuditSession,
        wallet: &str,
        request_id: &str,
    ) -> Option<u32> {
        match self.ledger.charge(wallet, request_id).await {
            Ok(true) => debug!(wallet, request_id, "Credit charged"),
            Ok(false) => debug!(wallet, request_id, "Request already paid for"),
            Err(e) => {
                warn!(wallet, request_id, error = %e, "Credit deduction failed; result kept");
            }
        }
        session.refresh_credits(self.ledger.as_ref()).await
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
