//! Wallet-scoped subcommands: credits, badges, mint.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use auditlink_chain::{BadgeMinter, MintedToken};
use auditlink_core::{AuditResult, AuditStatus, Config, NetworkId, NftMetadata, validate_address};
use auditlink_services::{BadgeSaveOutcome, NewBadge, PinataClient};
use chrono::Utc;
use tracing::{info, warn};

use crate::audit_cmd::load_result;
use crate::backend;
use crate::fmt::{write_badges, write_mint_receipt};

#[derive(clap::Args, Debug)]
pub struct CreditsArgs {
    /// Wallet address.
    pub wallet: String,
}

#[derive(clap::Args, Debug)]
pub struct BadgesArgs {
    /// Wallet address.
    pub wallet: String,
    /// Remove the badge with this id instead of listing.
    #[arg(long)]
    pub delete: Option<i64>,
}

#[derive(clap::Args, Debug)]
pub struct MintArgs {
    /// Result JSON written by `audit --output`.
    #[arg(long)]
    pub result: PathBuf,
    /// Audited contract.
    #[arg(long)]
    pub contract: String,
    /// Badge recipient.
    #[arg(long)]
    pub to: String,
    #[arg(long, default_value = "sepolia")]
    pub network: NetworkId,
    /// Signing account; defaults to the node's first account.
    #[arg(long, env = "AUDITLINK_WALLET")]
    pub wallet: Option<String>,
}

pub async fn run_credits(config: &Config, args: CreditsArgs) -> anyhow::Result<()> {
    let wallet = validate_address(&args.wallet)?;
    let stores = backend::open_stores(config).await?;
    stores.badges.track_user(wallet).await?;
    let balance = stores.ledger.balance(wallet).await?;
    writeln!(io::stdout(), "{wallet}: {balance} credit(s)")?;
    Ok(())
}

pub async fn run_badges(config: &Config, args: BadgesArgs) -> anyhow::Result<()> {
    let wallet = validate_address(&args.wallet)?;
    let stores = backend::open_stores(config).await?;
    let mut out = io::stdout();
    if let Some(id) = args.delete {
        if stores.badges.delete_badge(id).await? {
            writeln!(out, "Deleted badge {id}")?;
        } else {
            writeln!(out, "No badge with id {id}")?;
        }
        return Ok(());
    }
    let badges = stores.badges.list_badges(wallet).await?;
    write_badges(&mut out, &badges)?;
    Ok(())
}

/// Only completed audits earn a badge.
fn ensure_mintable(result: &AuditResult) -> anyhow::Result<()> {
    match result.status {
        AuditStatus::Completed => Ok(()),
        AuditStatus::Pending => {
            anyhow::bail!("audit result is still pending; poll it to completion before minting")
        }
        AuditStatus::Failed => anyhow::bail!("audit failed; a failed audit cannot be minted"),
    }
}

/// Upload badge metadata, mint it, then record it in the badge collection.
pub async fn run_mint(config: &Config, args: MintArgs) -> anyhow::Result<()> {
    let contract = validate_address(&args.contract)?;
    let to = validate_address(&args.to)?;
    let result = load_result(&args.result)?;
    ensure_mintable(&result)?;

    let account = backend::parse_account(args.wallet.as_deref())?;
    let wallet = backend::connect_wallet(config, args.network, account)
        .await?
        .with_context(|| format!("no RPC endpoint configured for {}", args.network))?;
    let minter = BadgeMinter::from_config(wallet, config);

    let metadata = NftMetadata::for_audit(
        &result,
        contract,
        args.network,
        to,
        Utc::now().date_naive(),
    );
    let pinata = PinataClient::new(&config.pinata)?;
    let uri = pinata.upload_json(&metadata).await?;

    let receipt = minter.mint(to, &uri, args.network).await?;
    if let MintedToken::Known(id) = receipt.token_id {
        match minter.token_uri(id, args.network).await {
            Ok(Some(on_chain)) if on_chain == uri => info!(%id, "Token URI confirmed"),
            Ok(other) => warn!(%id, ?other, "Token URI does not match uploaded metadata"),
            Err(e) => warn!(%id, error = %e, "Token URI lookup failed"),
        }
    }

    let mut out = io::stdout();
    writeln!(out, "Badge minted:")?;
    write_mint_receipt(&mut out, &receipt, &uri)?;

    // The mint already happened; a store failure only loses the collection entry.
    let badge = NewBadge::from_audit(&result, contract, args.network, to, Utc::now());
    match backend::open_stores(config).await {
        Ok(stores) => {
            if let Err(e) = stores.badges.track_user(to).await {
                warn!(wallet = to, error = %e, "Failed to record user");
            }
            match stores.badges.save_badge(&badge).await {
                Ok(BadgeSaveOutcome::Stored(id)) => writeln!(out, "Saved to collection as badge {id}")?,
                Ok(BadgeSaveOutcome::AlreadyStored(id)) => {
                    writeln!(out, "Collection already has this contract as badge {id}")?;
                }
                Err(e) => warn!(error = %e, "Failed to save badge to collection"),
            }
        }
        Err(e) => warn!(error = %e, "Badge store unavailable"),
    }
    Ok(())
}
