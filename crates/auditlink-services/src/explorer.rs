//! Block-explorer source fetcher.
//!
//! Uses the Etherscan-compatible `getsourcecode` endpoint to pull verified
//! source for a deployed contract.

use std::collections::HashMap;

use auditlink_core::config::ExplorerConfig;
use auditlink_core::{NetworkId, validate_address};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("Explorer API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The only case with a user remedy: verify the contract on the explorer.
    #[error("Contract {address} is not verified on the block explorer ({reason}); verify its source and try again")]
    NotVerified { address: String, reason: String },

    #[error("No contract found at {0}")]
    NotFound(String),

    #[error("Invalid contract address '{0}'")]
    InvalidAddress(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// The request URL carries the API key.
impl From<reqwest::Error> for ExplorerError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

impl ExplorerError {
    pub const fn is_not_verified(&self) -> bool {
        matches!(self, Self::NotVerified { .. })
    }
}

/// Verified source for one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSource {
    pub source_code: String,
    pub contract_name: String,
    pub compiler_version: String,
}

#[derive(Debug, Deserialize)]
struct SourceCodeResponse {
    status: String,
    #[serde(default)]
    message: String,
    /// An array of entries on success, a bare string on error.
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SourceCodeEntry {
    #[serde(default)]
    source_code: String,
    #[serde(default)]
    contract_name: String,
    #[serde(default)]
    compiler_version: String,
}

#[derive(Debug)]
pub struct ExplorerClient {
    http: reqwest::Client,
    api_key: String,
    endpoints: HashMap<NetworkId, String>,
}

impl ExplorerClient {
    pub fn new(config: &ExplorerConfig) -> Result<Self, ExplorerError> {
        if config.endpoints.is_empty() {
            return Err(ExplorerError::Config("no explorer endpoints configured".into()));
        }

        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            endpoints: config.endpoints.clone(),
        })
    }

    fn source_url(&self, address: &str, network: NetworkId) -> Result<String, ExplorerError> {
        let base = self
            .endpoints
            .get(&network)
            .ok_or_else(|| ExplorerError::Config(format!("no explorer endpoint for {network}")))?;
        Ok(format!(
            "{}?module=contract&action=getsourcecode&address={address}&apikey={}",
            base.trim_end_matches('/'),
            self.api_key
        ))
    }

    /// Fetch verified source for `address` on `network`.
    pub async fn fetch_source(
        &self,
        address: &str,
        network: NetworkId,
    ) -> Result<ContractSource, ExplorerError> {
        let address = validate_address(address)
            .map_err(|_| ExplorerError::InvalidAddress(address.to_string()))?;
        let url = self.source_url(address, network)?;
        debug!(address, network = %network, "Fetching contract source");

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ExplorerError::Api {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").into(),
            });
        }
        let body: SourceCodeResponse = resp.json().await?;
        let entry = interpret_response(address, body)?;

        info!(
            address,
            contract = %entry.contract_name,
            compiler = %entry.compiler_version,
            "Fetched verified source"
        );
        Ok(ContractSource {
            source_code: unwrap_multi_file(&entry.source_code),
            contract_name: entry.contract_name,
            compiler_version: entry.compiler_version,
        })
    }
}

fn interpret_response(
    address: &str,
    body: SourceCodeResponse,
) -> Result<SourceCodeEntry, ExplorerError> {
    if body.status != "1" {
        let detail = body.result.as_str().unwrap_or_default().to_string();
        let lower = detail.to_ascii_lowercase();
        // Key and quota problems are operator errors, not an unverified contract.
        if lower.contains("api key") || lower.contains("rate limit") {
            return Err(ExplorerError::Api {
                status: 200,
                message: detail,
            });
        }
        let reason = if detail.is_empty() {
            body.message
        } else {
            format!("{}: {detail}", body.message)
        };
        return Err(ExplorerError::NotVerified {
            address: address.to_string(),
            reason,
        });
    }

    let entries: Vec<SourceCodeEntry> =
        serde_json::from_value(body.result).map_err(|e| ExplorerError::Api {
            status: 200,
            message: format!("unexpected result shape: {e}"),
        })?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| ExplorerError::NotFound(address.to_string()))?;
    if entry.source_code.trim().is_empty() {
        return Err(ExplorerError::NotVerified {
            address: address.to_string(),
            reason: "source code not published".into(),
        });
    }
    Ok(entry)
}

/// Extract the primary file from a `{{...}}` standard-JSON source bundle.
///
/// Returns the input unchanged when it is not a bundle or cannot be parsed.
pub fn unwrap_multi_file(source: &str) -> String {
    let trimmed = source.trim();
    if !(trimmed.starts_with("{{") && trimmed.ends_with("}}")) {
        return source.to_string();
    }
    let inner = &trimmed[1..trimmed.len() - 1];
    let content = serde_json::from_str::<Value>(inner).ok().and_then(|bundle| {
        bundle
            .get("sources")?
            .as_object()?
            .values()
            .next()?
            .get("content")?
            .as_str()
            .map(str::to_string)
    });
    content.unwrap_or_else(|| {
        warn!("Could not unwrap multi-file source bundle; using raw text");
        source.to_string()
    })
}

#[cfg(test)]
mod tests {
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;

    const ADDR: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";

    async fn spawn_explorer(response: Value) -> ExplorerClient {
        let app = Router::new().route(
            "/api",
            get(move |Query(q): Query<HashMap<String, String>>| {
                let response = response.clone();
                async move {
                    assert_eq!(q.get("module").map(String::as_str), Some("contract"));
                    assert_eq!(q.get("action").map(String::as_str), Some("getsourcecode"));
                    Json(response)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let config = ExplorerConfig {
            api_key: "test".into(),
            endpoints: HashMap::from([(NetworkId::Sepolia, format!("http://{addr}/api"))]),
        };
        ExplorerClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn fetches_verified_source() {
        let client = spawn_explorer(json!({
            "status": "1",
            "message": "OK",
            "result": [{
                "SourceCode": "pragma solidity ^0.8.0; contract Token {}",
                "ContractName": "Token",
                "CompilerVersion": "v0.8.20"
            }]
        }))
        .await;
        let src = client.fetch_source(ADDR, NetworkId::Sepolia).await.unwrap();
        assert_eq!(src.contract_name, "Token");
        assert!(src.source_code.contains("contract Token"));
    }

    #[tokio::test]
    async fn status_zero_is_not_verified() {
        let client = spawn_explorer(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Contract source code not verified"
        }))
        .await;
        let err = client.fetch_source(ADDR, NetworkId::Sepolia).await.unwrap_err();
        assert!(err.is_not_verified());
        assert!(err.to_string().contains("not verified"));
    }

    #[tokio::test]
    async fn empty_source_is_not_verified() {
        let client = spawn_explorer(json!({
            "status": "1",
            "message": "OK",
            "result": [{ "SourceCode": "", "ContractName": "", "CompilerVersion": "" }]
        }))
        .await;
        let err = client.fetch_source(ADDR, NetworkId::Sepolia).await.unwrap_err();
        assert!(err.is_not_verified());
    }

    #[tokio::test]
    async fn bad_api_key_is_not_reported_as_unverified() {
        let client = spawn_explorer(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Invalid API Key"
        }))
        .await;
        let err = client.fetch_source(ADDR, NetworkId::Sepolia).await.unwrap_err();
        assert!(matches!(err, ExplorerError::Api { .. }));
    }

    #[tokio::test]
    async fn empty_result_is_not_found() {
        let client = spawn_explorer(json!({ "status": "1", "message": "OK", "result": [] })).await;
        let err = client.fetch_source(ADDR, NetworkId::Sepolia).await.unwrap_err();
        assert!(matches!(err, ExplorerError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_result_is_api_error() {
        let client = spawn_explorer(json!({
            "status": "1",
            "message": "OK",
            "result": { "SourceCode": "contract A {}" }
        }))
        .await;
        let err = client.fetch_source(ADDR, NetworkId::Sepolia).await.unwrap_err();
        match err {
            ExplorerError::Api { message, .. } => {
                assert!(message.contains("unexpected result shape"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_error_does_not_reveal_api_key() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = ExplorerClient::new(&ExplorerConfig {
            api_key: "SUPERSECRETKEY".into(),
            endpoints: HashMap::from([(NetworkId::Sepolia, format!("http://{addr}/api"))]),
        })
        .unwrap();

        let err = client.fetch_source(ADDR, NetworkId::Sepolia).await.unwrap_err();
        assert!(matches!(err, ExplorerError::Http(_)));
        let text = format!("{err} {err:?}");
        assert!(!text.contains("SUPERSECRETKEY"), "{text}");
    }

    #[tokio::test]
    async fn rejects_invalid_address_before_request() {
        let config = ExplorerConfig::default();
        let client = ExplorerClient::new(&config).unwrap();
        let err = client.fetch_source("0xnothex", NetworkId::Sepolia).await.unwrap_err();
        assert!(matches!(err, ExplorerError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn missing_network_endpoint_is_config_error() {
        let client = spawn_explorer(json!({})).await;
        let err = client.fetch_source(ADDR, NetworkId::Mainnet).await.unwrap_err();
        assert!(matches!(err, ExplorerError::Config(_)));
    }

    #[test]
    fn unwraps_first_file_of_bundle() {
        let bundle = r#"{{"language":"Solidity","sources":{"contracts/Vault.sol":{"content":"contract Vault {}"},"contracts/Lib.sol":{"content":"library Lib {}"}}}}"#;
        assert_eq!(unwrap_multi_file(bundle), "contract Vault {}");
    }

    #[test]
    fn plain_source_passes_through() {
        assert_eq!(unwrap_multi_file("contract A {}"), "contract A {}");
    }

    #[test]
    fn broken_bundle_falls_back_to_raw() {
        let broken = "{{not json}}";
        assert_eq!(unwrap_multi_file(broken), broken);
    }
}
