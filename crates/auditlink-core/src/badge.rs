//! Audit badge (NFT) metadata.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::audit::AuditResult;
use crate::network::NetworkId;

/// Default badge artwork.
pub const DEFAULT_BADGE_IMAGE: &str = "https://res.cloudinary.com/draklqbp6/image/upload/v1749913448/6f5f7ddb-9ba6-48a5-a4d6-6577ab897eee_d9mtaj.png";

/// One ERC-721 metadata attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftAttribute {
    pub trait_type: String,
    pub value: String,
}

impl NftAttribute {
    fn new(trait_type: &str, value: impl Into<String>) -> Self {
        Self {
            trait_type: trait_type.to_string(),
            value: value.into(),
        }
    }
}

/// ERC-721 metadata document uploaded to the pinning service.
///
/// Immutable once uploaded: the content URI is derived from these bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftMetadata {
    pub name: String,
    pub description: String,
    pub image: String,
    pub attributes: Vec<NftAttribute>,
}

impl NftMetadata {
    /// Build badge metadata from a snapshot of a finished audit.
    pub fn for_audit(
        result: &AuditResult,
        contract_address: &str,
        network: NetworkId,
        wallet_address: &str,
        date: NaiveDate,
    ) -> Self {
        Self {
            name: "AuditLinkAI Badge".to_string(),
            description: "This NFT certifies that the contract was audited using AI technology."
                .to_string(),
            image: DEFAULT_BADGE_IMAGE.to_string(),
            attributes: vec![
                NftAttribute::new("Audit Score", result.score.to_string()),
                NftAttribute::new("Date", date.format("%Y-%m-%d").to_string()),
                NftAttribute::new("Contract Address", contract_address),
                NftAttribute::new("Network", network.as_str()),
                NftAttribute::new("Issues Found", result.issues.len().to_string()),
                NftAttribute::new("Wallet Address", wallet_address),
            ],
        }
    }

    pub fn attribute(&self, trait_type: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.trait_type == trait_type)
            .map(|a| a.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_audit_fills_attributes() {
        let result = AuditResult {
            score: 88,
            ..AuditResult::default()
        };
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        let meta = NftMetadata::for_audit(
            &result,
            "0x742d35Cc69C92cF4D3E72aA99Af1E4f7D4b8A6E9",
            NetworkId::Sepolia,
            "0x0000000000000000000000000000000000000001",
            date,
        );
        assert_eq!(meta.attribute("Audit Score"), Some("88"));
        assert_eq!(meta.attribute("Date"), Some("2026-03-07"));
        assert_eq!(meta.attribute("Network"), Some("sepolia"));
        assert_eq!(meta.attribute("Issues Found"), Some("0"));
        assert_eq!(meta.attributes.len(), 6);
    }

    #[test]
    fn serializes_with_erc721_keys() {
        let meta = NftMetadata {
            name: "n".into(),
            description: "d".into(),
            image: "i".into(),
            attributes: vec![NftAttribute::new("k", "v")],
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["attributes"][0]["trait_type"], "k");
    }
}
