//! `AuditLink` service clients.
//!
//! - [`explorer`]: verified source lookup
//! - [`gemini`]: contract generation, direct audit and explanation
//! - [`pinata`]: badge metadata pinning
//! - [`store`]: credit ledger and badge collection

pub mod explorer;
pub mod gemini;
pub mod pinata;
pub mod store;

pub use explorer::{ContractSource, ExplorerClient, ExplorerError};
pub use gemini::{GeminiClient, GeminiError, GeneratedContract};
pub use pinata::{PinataClient, PinataError};
pub use store::{
    BadgeRecord, BadgeSaveOutcome, BadgeStore, CreditLedger, LedgerDatabase, NewBadge,
    SqliteStore, StoreError, SupabaseStore,
};
