//! Supported EVM networks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Network an audit or mint targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    Mainnet,
    #[default]
    Sepolia,
    Goerli,
}

impl NetworkId {
    pub const ALL: [Self; 3] = [Self::Mainnet, Self::Sepolia, Self::Goerli];

    /// EIP-155 chain id.
    pub const fn chain_id(self) -> u64 {
        match self {
            Self::Mainnet => 1,
            Self::Sepolia => 11_155_111,
            Self::Goerli => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Sepolia => "sepolia",
            Self::Goerli => "goerli",
        }
    }

    /// Map a chain id reported by a wallet back to a known network.
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.chain_id() == chain_id)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "ethereum" => Ok(Self::Mainnet),
            "sepolia" => Ok(Self::Sepolia),
            "goerli" => Ok(Self::Goerli),
            other => Err(Error::UnsupportedNetwork(other.to_string())),
        }
    }
}
