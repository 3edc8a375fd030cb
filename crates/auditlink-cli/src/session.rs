//! Per-user session context.

use auditlink_chain::PollSlot;
use auditlink_services::CreditLedger;
use tracing::warn;

/// State that outlives a single audit: the connected wallet, its last known
/// credit balance and the single-flight poll slot.
#[derive(Debug, Default)]
pub struct AuditSession {
    wallet: Option<String>,
    credits: Option<u32>,
    poll_slot: PollSlot,
}

impl AuditSession {
    pub fn new(wallet: Option<String>) -> Self {
        Self {
            wallet,
            ..Self::default()
        }
    }

    pub fn wallet(&self) -> Option<&str> {
        self.wallet.as_deref()
    }

    /// Last balance read from the ledger, if any.
    pub const fn credits(&self) -> Option<u32> {
        self.credits
    }

    pub const fn poll_slot(&self) -> &PollSlot {
        &self.poll_slot
    }

    /// Re-read the balance. A ledger failure keeps the previous value.
    pub async fn refresh_credits(&mut self, ledger: &dyn CreditLedger) -> Option<u32> {
        let wallet = self.wallet.as_deref()?;
        match ledger.balance(wallet).await {
            Ok(credits) => self.credits = Some(credits),
            Err(e) => warn!(wallet, error = %e, "Failed to read credit balance"),
        }
        self.credits
    }
}

#[cfg(test)]
mod tests {
    use auditlink_services::SqliteStore;

    use super::*;

    const WALLET: &str = "0x00000000000000000000000000000000000000aa";

    #[tokio::test]
    async fn refresh_reads_and_caches_balance() {
        let ledger = SqliteStore::open_in_memory(20).await.unwrap();
        let mut session = AuditSession::new(Some(WALLET.into()));
        assert_eq!(session.credits(), None);
        assert_eq!(session.refresh_credits(&ledger).await, Some(20));
        assert_eq!(session.credits(), Some(20));
    }

    #[tokio::test]
    async fn refresh_without_wallet_is_none() {
        let ledger = SqliteStore::open_in_memory(20).await.unwrap();
        let mut session = AuditSession::default();
        assert_eq!(session.refresh_credits(&ledger).await, None);
    }

    #[tokio::test]
    async fn refresh_failure_keeps_last_value() {
        let ledger = SqliteStore::open_in_memory(20).await.unwrap();
        let mut session = AuditSession::new(Some("bogus".into()));
        session.credits = Some(3);
        assert_eq!(session.refresh_credits(&ledger).await, Some(3));
    }
}
