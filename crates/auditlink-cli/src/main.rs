//! `AuditLink` CLI
//!
//! AI smart-contract audits with on-chain verification and badge minting.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use auditlink_cli::ai_cmd::{self, ExplainArgs, GenerateArgs};
use auditlink_cli::audit_cmd::{self, AuditArgs, PollArgs};
use auditlink_cli::wallet_cmd::{self, BadgesArgs, CreditsArgs, MintArgs};
use auditlink_core::config::load_config;
use auditlink_core::tracing_init::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "auditlink")]
#[command(version, about = "AI smart-contract audits with on-chain verification", long_about = None)]
struct Cli {
    /// Config file layered over the global settings.
    #[arg(long, global = true, env = "AUDITLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level for auditlink crates (overridden by `RUST_LOG`).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Audit a deployed contract on-chain, or a source file directly.
    Audit(AuditArgs),
    /// Poll an earlier on-chain request again.
    Poll(PollArgs),
    /// Show a wallet's audit credits.
    Credits(CreditsArgs),
    /// Explain what a contract does.
    Explain(ExplainArgs),
    /// Generate a contract from a description.
    Generate(GenerateArgs),
    /// Pin badge metadata for an audit result and mint the badge.
    Mint(MintArgs),
    /// List or delete a wallet's saved badges.
    Badges(BadgesArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&format!("auditlink={}", cli.log_level), cli.log_json);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting auditlink");

    let config = load_config(cli.config.as_deref())?;
    config.validate()?;

    // Ctrl-C stops local polling only; submitted requests keep running on-chain.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping");
            on_signal.cancel();
        }
    });

    match cli.command {
        Command::Audit(args) => audit_cmd::run_audit(&config, args, &cancel).await,
        Command::Poll(args) => audit_cmd::run_poll(&config, args, &cancel).await,
        Command::Credits(args) => wallet_cmd::run_credits(&config, args).await,
        Command::Explain(args) => ai_cmd::run_explain(&config, args).await,
        Command::Generate(args) => ai_cmd::run_generate(&config, args).await,
        Command::Mint(args) => wallet_cmd::run_mint(&config, args).await,
        Command::Badges(args) => wallet_cmd::run_badges(&config, args).await,
    }
}
