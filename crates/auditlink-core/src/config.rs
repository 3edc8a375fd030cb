//! Configuration resolution for AuditLink.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/auditlink/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::is_valid_address;
use crate::error::{Error, Result};
use crate::network::NetworkId;

/// Complete AuditLink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub explorer: ExplorerConfig,
    pub pinata: PinataConfig,
    pub store: StoreConfig,
    pub polling: PollingConfig,
    pub credits: CreditsConfig,
    pub networks: HashMap<NetworkId, NetworkConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini: GeminiConfig::default(),
            explorer: ExplorerConfig::default(),
            pinata: PinataConfig::default(),
            store: StoreConfig::default(),
            polling: PollingConfig::default(),
            credits: CreditsConfig::default(),
            networks: default_networks(),
        }
    }
}

/// Generative-AI text endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub api_key: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
                .to_string(),
            api_key: String::new(),
        }
    }
}

/// Block-explorer source lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    pub api_key: String,
    pub endpoints: HashMap<NetworkId, String>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        let endpoints = HashMap::from([
            (NetworkId::Mainnet, "https://api.etherscan.io/api".to_string()),
            (NetworkId::Sepolia, "https://api-sepolia.etherscan.io/api".to_string()),
            (NetworkId::Goerli, "https://api-goerli.etherscan.io/api".to_string()),
        ]);
        Self {
            api_key: String::new(),
            endpoints,
        }
    }
}

/// JSON pinning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PinataConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_secret: String,
    /// Canonical public gateway prefix, ending in `/ipfs/`.
    pub gateway: String,
}

impl Default for PinataConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.pinata.cloud/pinning/pinJSONToIPFS".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            gateway: "https://ipfs.io/ipfs/".to_string(),
        }
    }
}

/// Credit ledger and badge store backend.
///
/// When `supabase_url` is set the hosted store is used; otherwise a local
/// SQLite database at `sqlite_path` (or the default data path).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub sqlite_path: Option<PathBuf>,
}

/// On-chain polling behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub max_wait_secs: u64,
    /// Upper bound on waiting for a submitted transaction's first confirmation.
    pub confirmation_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            max_wait_secs: 120,
            confirmation_timeout_secs: 180,
        }
    }
}

impl PollingConfig {
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub const fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub const fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

/// Usage credits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditsConfig {
    /// Balance given to a wallet on first use.
    pub initial_allotment: u32,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            initial_allotment: 20,
        }
    }
}

/// Per-network chain settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint of the wallet/provider for this network.
    pub rpc_url: Option<String>,
    /// Audit consumer contract that forwards requests to the compute network.
    pub audit_contract: Option<String>,
    /// Funded compute subscription; 0 means not configured.
    pub subscription_id: u64,
    /// Floor for the submission gas limit.
    pub min_gas_limit: u64,
    pub don_id: Option<String>,
    /// Badge NFT contract.
    pub nft_contract: Option<String>,
}

impl NetworkConfig {
    /// Whether the network can accept on-chain audit submissions.
    pub fn audit_ready(&self) -> bool {
        self.audit_contract.is_some() && self.subscription_id != 0
    }
}

fn default_networks() -> HashMap<NetworkId, NetworkConfig> {
    HashMap::from([
        (
            NetworkId::Sepolia,
            NetworkConfig {
                rpc_url: None,
                audit_contract: Some("0xB6Ec040df71EaaDdEA225BDfE87b9Be6bca99135".to_string()),
                subscription_id: 4910,
                min_gas_limit: 800_000,
                don_id: Some(
                    "0x66756e2d657468657265756d2d7365706f6c69612d3100000000000000000000".to_string(),
                ),
                nft_contract: Some("0x3C80147017b6Cb11c6cD76fEa3160302A549AF0a".to_string()),
            },
        ),
        (
            NetworkId::Mainnet,
            NetworkConfig {
                min_gas_limit: 800_000,
                don_id: Some(
                    "0x66756e2d657468657265756d2d6d61696e6e65742d3100000000000000000000".to_string(),
                ),
                ..NetworkConfig::default()
            },
        ),
    ])
}

impl Config {
    pub fn network(&self, id: NetworkId) -> Option<&NetworkConfig> {
        self.networks.get(&id)
    }

    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        for (id, net) in &self.networks {
            for (label, addr) in [
                ("audit_contract", &net.audit_contract),
                ("nft_contract", &net.nft_contract),
            ] {
                if let Some(addr) = addr {
                    if !is_valid_address(addr) {
                        return Err(Error::Config(format!(
                            "networks.{id}.{label} is not an address: {addr}"
                        )));
                    }
                }
            }
        }
        if self.polling.interval_secs == 0 {
            return Err(Error::Config("polling.interval_secs must be positive".into()));
        }
        if self.store.supabase_url.is_some() && self.store.supabase_key.is_none() {
            return Err(Error::Config("store.supabase_key is required with store.supabase_url".into()));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            debug!(path = %global_path.display(), "Loading global config");
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    if let Some(path) = explicit {
        debug!(path = %path.display(), "Loading config file");
        let file = load_config_file(path)?;
        merge_config(&mut config, file);
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("auditlink").join("settings.json"))
}

/// Default location of the local SQLite ledger.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("auditlink").join("ledger.db"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    base.gemini = overlay.gemini;
    base.pinata = overlay.pinata;
    base.store = overlay.store;
    base.polling = overlay.polling;
    base.credits = overlay.credits;

    if !overlay.explorer.api_key.is_empty() {
        base.explorer.api_key = overlay.explorer.api_key;
    }
    base.explorer.endpoints.extend(overlay.explorer.endpoints);

    // Network entries are replaced per network, not field by field.
    base.networks.extend(overlay.networks);
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("AUDITLINK_GEMINI_API_KEY") {
        config.gemini.api_key = val;
    }
    if let Some(val) = var("AUDITLINK_GEMINI_URL") {
        config.gemini.endpoint = val;
    }
    if let Some(val) = var("AUDITLINK_ETHERSCAN_API_KEY") {
        config.explorer.api_key = val;
    }
    if let Some(val) = var("AUDITLINK_PINATA_API_KEY") {
        config.pinata.api_key = val;
    }
    if let Some(val) = var("AUDITLINK_PINATA_API_SECRET") {
        config.pinata.api_secret = val;
    }
    if let Some(val) = var("AUDITLINK_SUPABASE_URL") {
        config.store.supabase_url = Some(val);
    }
    if let Some(val) = var("AUDITLINK_SUPABASE_KEY") {
        config.store.supabase_key = Some(val);
    }
    if let Some(val) = var("AUDITLINK_DB_PATH") {
        config.store.sqlite_path = Some(PathBuf::from(val));
    }
    if let Some(n) = var("AUDITLINK_POLL_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
        config.polling.interval_secs = n;
    }
    if let Some(n) = var("AUDITLINK_POLL_MAX_WAIT_SECS").and_then(|v| v.parse().ok()) {
        config.polling.max_wait_secs = n;
    }
    if let Some(n) = var("AUDITLINK_INITIAL_CREDITS").and_then(|v| v.parse().ok()) {
        config.credits.initial_allotment = n;
    }
    for id in NetworkId::ALL {
        let key = format!("AUDITLINK_RPC_URL_{}", id.as_str().to_ascii_uppercase());
        if let Some(val) = var(&key) {
            config.networks.entry(id).or_default().rpc_url = Some(val);
        }
    }
}
