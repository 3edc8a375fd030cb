//! `AuditLink` on-chain layer.
//!
//! - [`wallet`]: the wallet capability and its JSON-RPC adapters
//! - [`engine`]: submit audit requests and poll them to completion
//! - [`mint`]: audit badge minting
//! - [`logs`]: receipt event scanning

pub mod abi;
pub mod engine;
pub mod error;
pub mod guard;
pub mod logs;
pub mod mint;
pub mod rpc;
pub mod wallet;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use engine::{
    AuditEngine, OnChainRequestHandle, PollOptions, RequestIdSource, RequestStatus,
};
pub use error::{ChainError, MintError, PollError, SubmitError};
pub use guard::{PollGuard, PollSlot};
pub use logs::{LogLookup, scan_logs};
pub use mint::{BadgeMinter, MintReceipt, MintedToken};
pub use rpc::{Log, TransactionReceipt, TransactionRequest};
pub use wallet::{RpcWallet, WalletProvider, WatchOnlyWallet};

pub use alloy_primitives::{Address, B256, Bytes, U256};
