//! `audit` and `poll` subcommands.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use auditlink_chain::{AuditEngine, B256, PollOptions};
use auditlink_core::{AuditRequest, AuditResult, AuditTarget, Config, NetworkId};
use auditlink_services::{ExplorerClient, GeminiClient};
use tokio_util::sync::CancellationToken;

use crate::backend::{self, Stores};
use crate::fmt::{write_audit_result, write_explanation, write_handle};
use crate::orchestrator::{AuditFailure, AuditOrchestrator, AuditOutcome};
use crate::session::AuditSession;

#[derive(clap::Args, Debug)]
pub struct AuditArgs {
    /// Deployed contract to audit through the on-chain compute network.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub address: Option<String>,
    /// Solidity source file to audit directly.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Target network.
    #[arg(long, default_value = "sepolia")]
    pub network: NetworkId,
    /// Wallet account; defaults to the node's first account.
    #[arg(long, env = "AUDITLINK_WALLET")]
    pub wallet: Option<String>,
    /// Save the final result as JSON.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct PollArgs {
    /// Request id printed by a previous `audit`.
    pub request_id: String,
    #[arg(long, default_value = "sepolia")]
    pub network: NetworkId,
    /// Wallet to charge on completion; reads only, nothing is signed.
    #[arg(long, env = "AUDITLINK_WALLET")]
    pub wallet: Option<String>,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

fn build_orchestrator(
    config: &Config,
    stores: &Stores,
    engine: Option<AuditEngine>,
) -> anyhow::Result<AuditOrchestrator> {
    let explorer = ExplorerClient::new(&config.explorer)?;
    let analyst = GeminiClient::new(&config.gemini)?;
    let orchestrator = AuditOrchestrator::new(explorer, analyst, stores.ledger.clone())
        .with_poll_options(PollOptions::from(&config.polling));
    Ok(match engine {
        Some(engine) => orchestrator.with_engine(engine),
        None => orchestrator,
    })
}

/// Execute `audit`.
pub async fn run_audit(
    config: &Config,
    args: AuditArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let stores = backend::open_stores(config).await?;

    let (target, engine, wallet) = match (args.address, args.file) {
        (Some(address), _) => {
            let account = backend::parse_account(args.wallet.as_deref())?;
            let provider = backend::connect_wallet(config, args.network, account).await?;
            let wallet = provider.as_ref().map(|p| p.address().to_checksum(None));
            let engine = provider.map(|p| AuditEngine::from_config(p, config));
            (AuditTarget::Address(address), engine, wallet)
        }
        (None, Some(file)) => {
            let code = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            (AuditTarget::SourceCode(code), None, args.wallet)
        }
        (None, None) => anyhow::bail!("either --address or --file is required"),
    };

    let orchestrator = build_orchestrator(config, &stores, engine)?;
    let mut session = AuditSession::new(wallet);
    let request = AuditRequest::new(target, args.network);

    let outcome = orchestrator.run(request, &mut session, cancel).await;
    report(outcome, args.network, args.output.as_deref())
}

/// Execute `poll`.
pub async fn run_poll(
    config: &Config,
    args: PollArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let request_id: B256 = args
        .request_id
        .trim()
        .parse()
        .with_context(|| format!("invalid request id '{}'", args.request_id))?;
    let stores = backend::open_stores(config).await?;
    let account = backend::parse_account(args.wallet.as_deref())?;
    let provider = backend::connect_reader(config, args.network, account).await?;
    let wallet = provider.as_ref().map(|p| p.address().to_checksum(None));
    let engine = provider.map(|p| AuditEngine::from_config(p, config));

    let orchestrator = build_orchestrator(config, &stores, engine)?;
    let mut session = AuditSession::new(wallet);
    let outcome = orchestrator
        .resume(request_id, args.network, &mut session, cancel)
        .await;
    report(outcome, args.network, args.output.as_deref())
}

fn report(
    outcome: Result<AuditOutcome, AuditFailure>,
    network: NetworkId,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let mut out = io::stdout();
    match outcome {
        Ok(outcome) => {
            writeln!(out, "Audit result:")?;
            if let Some(handle) = &outcome.handle {
                write_handle(&mut out, handle)?;
            }
            write_audit_result(&mut out, &outcome.result)?;
            write_explanation(&mut out, &outcome.explanation)?;
            if let Some(balance) = outcome.balance {
                writeln!(out, "\nCredits remaining: {balance}")?;
            }
            if let Some(path) = output {
                save_result(path, &outcome.result)?;
                writeln!(out, "Saved result to {}", path.display())?;
            }
            Ok(())
        }
        Err(failure) => {
            if let Some(partial) = &failure.partial {
                writeln!(out, "Last known state:")?;
                write_audit_result(&mut out, partial)?;
            }
            write_explanation(&mut out, &failure.explanation)?;
            if failure.error.is_not_verified() {
                writeln!(
                    out,
                    "\nVerify the contract's source on the block explorer, then run the audit again."
                )?;
            }
            if failure.error.is_timeout() {
                if let Some(id) = failure.request_id() {
                    writeln!(
                        out,
                        "\nThe audit may still complete. Check again with:\n  auditlink poll {id} --network {network}"
                    )?;
                }
            }
            Err(failure.into())
        }
    }
}

/// Write `result` as pretty JSON.
pub fn save_result(path: &Path, result: &AuditResult) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

/// Read a result saved by `audit --output`.
pub fn load_result(path: &Path) -> anyhow::Result<AuditResult> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not an audit result", path.display()))
}
