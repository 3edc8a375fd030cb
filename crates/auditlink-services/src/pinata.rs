//! JSON pinning client.
//!
//! Uploads badge metadata and returns a content URI on the canonical gateway.
//! Identical documents pin to the same content hash, so re-uploading is safe.

use std::sync::LazyLock;

use auditlink_core::config::PinataConfig;
use regex::{NoExpand, Regex};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

static GATEWAY_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(gateway\.pinata\.cloud|cloudflare-ipfs\.com|ipfs\.io)/ipfs/")
        .expect("static regex is valid")
});

#[derive(Debug, Error)]
pub enum PinataError {
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("Pinning API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for PinataError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PinResponse {
    ipfs_hash: String,
}

#[derive(Debug)]
pub struct PinataClient {
    http: reqwest::Client,
    endpoint: String,
    gateway: String,
}

impl PinataClient {
    pub fn new(config: &PinataConfig) -> Result<Self, PinataError> {
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(PinataError::Config(
                "pinata.api_key and pinata.api_secret are required".into(),
            ));
        }
        if !config.gateway.ends_with('/') {
            return Err(PinataError::Config("pinata.gateway must end with '/'".into()));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("pinata_api_key", &config.api_key),
            ("pinata_secret_api_key", &config.api_secret),
        ] {
            let value = HeaderValue::from_str(value)
                .map_err(|_| PinataError::Config(format!("invalid {name}")))?;
            headers.insert(HeaderName::from_static(name), value);
        }

        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            gateway: config.gateway.clone(),
        })
    }

    /// Pin `document` as JSON and return its gateway URI.
    pub async fn upload_json<T: Serialize + Sync>(&self, document: &T) -> Result<String, PinataError> {
        let mut json = serde_json::to_value(document)?;
        normalize_gateways(&mut json, &self.gateway);

        let resp = self.http.post(&self.endpoint).json(&json).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PinataError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let pinned: PinResponse = resp.json().await?;
        let uri = format!("{}{}", self.gateway, pinned.ipfs_hash);
        info!(%uri, "Metadata pinned");
        Ok(uri)
    }
}

/// Rewrite known IPFS gateway prefixes in every string of `value` to `gateway`.
pub fn normalize_gateways(value: &mut Value, gateway: &str) {
    match value {
        Value::String(s) => {
            if GATEWAY_URL.is_match(s) {
                *s = GATEWAY_URL.replace_all(s, NoExpand(gateway)).into_owned();
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| normalize_gateways(v, gateway)),
        Value::Object(map) => map.values_mut().for_each(|v| normalize_gateways(v, gateway)),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}
