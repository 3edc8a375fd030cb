//! `AuditLink` Core Library
//!
//! Shared functionality for `AuditLink` components:
//! - Audit request/result data model and severity-weighted scoring
//! - Contract address validation and network identifiers
//! - Badge (NFT) metadata construction
//! - Configuration resolution and hierarchy
//! - Common error types and tracing setup

pub mod address;
pub mod audit;
pub mod badge;
pub mod config;
pub mod db;
pub mod error;
pub mod network;
pub mod tracing_init;

pub use address::{is_valid_address, validate_address};
pub use audit::{
    AuditRequest, AuditResult, AuditStatus, AuditTarget, Issue, OnChainReport, Severity,
};
pub use badge::{NftAttribute, NftMetadata};
pub use config::Config;
pub use error::{Error, Result};
pub use network::NetworkId;
