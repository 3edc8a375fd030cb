//! `AuditLink` CLI Library
//!
//! Orchestrates smart-contract audits: verified source lookup, on-chain
//! submission and polling, direct AI analysis, credits and badge minting.

pub mod ai_cmd;
pub mod audit_cmd;
pub mod backend;
pub mod fmt;
pub mod orchestrator;
pub mod session;
pub mod wallet_cmd;
