//! Build service clients from resolved configuration.

use std::sync::Arc;

use anyhow::Context;
use auditlink_chain::{Address, RpcWallet, WalletProvider, WatchOnlyWallet};
use auditlink_core::config::default_database_path;
use auditlink_core::{Config, NetworkId, validate_address};
use auditlink_services::{BadgeStore, CreditLedger, SqliteStore, SupabaseStore};
use tracing::{debug, info};

/// Ledger and badge store, backed by the same service.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn CreditLedger>,
    pub badges: Arc<dyn BadgeStore>,
}

/// Hosted store when `store.supabase_url` is set, local `SQLite` otherwise.
pub async fn open_stores(config: &Config) -> anyhow::Result<Stores> {
    let allotment = config.credits.initial_allotment;
    if let Some(url) = &config.store.supabase_url {
        let key = config
            .store
            .supabase_key
            .as_deref()
            .context("store.supabase_key is required with store.supabase_url")?;
        let store = Arc::new(SupabaseStore::new(url, key, allotment)?);
        info!("Using hosted credit store");
        return Ok(Stores {
            ledger: store.clone(),
            badges: store,
        });
    }

    let path = config
        .store
        .sqlite_path
        .clone()
        .or_else(default_database_path)
        .context("no data directory found; set store.sqlite_path or AUDITLINK_DB_PATH")?;
    debug!(path = %path.display(), "Opening local ledger");
    let store = Arc::new(SqliteStore::open(&path, allotment).await?);
    Ok(Stores {
        ledger: store.clone(),
        badges: store,
    })
}

/// Parse an optional account address given on the command line.
pub fn parse_account(account: Option<&str>) -> anyhow::Result<Option<Address>> {
    account
        .map(|a| -> anyhow::Result<Address> {
            let a = validate_address(a)?;
            a.parse().with_context(|| format!("invalid account address {a}"))
        })
        .transpose()
}

/// Connect the wallet for `network`, or `None` when no RPC endpoint is configured.
pub async fn connect_wallet(
    config: &Config,
    network: NetworkId,
    account: Option<Address>,
) -> anyhow::Result<Option<Arc<dyn WalletProvider>>> {
    let Some(url) = config.network(network).and_then(|n| n.rpc_url.as_deref()) else {
        debug!(%network, "No RPC endpoint configured; wallet not connected");
        return Ok(None);
    };
    let wallet = RpcWallet::connect(url, account, config.polling.confirmation_timeout())
        .await
        .with_context(|| format!("failed to connect wallet on {network}"))?;
    Ok(Some(Arc::new(wallet)))
}

/// Read-only wallet for status checks; falls back to [`connect_wallet`] without an account.
pub async fn connect_reader(
    config: &Config,
    network: NetworkId,
    account: Option<Address>,
) -> anyhow::Result<Option<Arc<dyn WalletProvider>>> {
    let Some(account) = account else {
        return connect_wallet(config, network, None).await;
    };
    let Some(url) = config.network(network).and_then(|n| n.rpc_url.as_deref()) else {
        return Ok(None);
    };
    let wallet = WatchOnlyWallet::new(url, account, config.polling.confirmation_timeout())?;
    Ok(Some(Arc::new(wallet)))
}
