use super::money::Amount;
use super::session::{BalanceSource, BearerToken, Session, SessionId, SessionStatus, UserId};
use super::terminal::{MerchantTerminal, TerminalCredential, TerminalId, TerminalRegistration};
use super::wallet::{LedgerDebit, LedgerEntry, LedgerReceipt, WalletAccount};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Outcome of a conditional status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The row was not in the expected status; nothing was written.
    Conflict { current: SessionStatus },
}

/// Durable record of issued sessions.
///
/// `compare_and_transition` is the only way a status changes and must be a
/// single atomic operation in the backing store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fails if a session with the same id or token already exists.
    async fn create(&self, session: Session) -> Result<Session>;
    async fn get_by_token(&self, token: &BearerToken) -> Result<Option<Session>>;
    async fn get(&self, id: SessionId) -> Result<Option<Session>>;
    async fn compare_and_transition(
        &self,
        id: SessionId,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> Result<Transition>;
}

/// The balance ledger, transaction history and rewards collaborator.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fails with `InsufficientFunds` without moving money when the wallet
    /// cannot cover the charge.
    async fn debit(&self, debit: LedgerDebit) -> Result<LedgerReceipt>;
    /// Credits several wallets of one student in a single write; either every
    /// credit lands or none does.
    async fn credit_all(&self, user_id: &UserId, credits: &[(BalanceSource, Amount)]) -> Result<()>;
    async fn credit(&self, user_id: &UserId, source: BalanceSource, amount: Amount) -> Result<()> {
        self.credit_all(user_id, &[(source, amount)]).await
    }
    async fn account(&self, user_id: &UserId) -> Result<Option<WalletAccount>>;
    async fn entries(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>>;
}

/// Registry of merchant terminals allowed to capture.
#[async_trait]
pub trait TerminalRegistry: Send + Sync {
    async fn register(&self, registration: TerminalRegistration) -> Result<MerchantTerminal>;
    async fn find_by_credential(
        &self,
        credential: &TerminalCredential,
    ) -> Result<Option<MerchantTerminal>>;
    async fn deactivate(&self, id: TerminalId) -> Result<bool>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type SessionStoreRef = Arc<dyn SessionStore>;
pub type LedgerRef = Arc<dyn Ledger>;
pub type TerminalRegistryRef = Arc<dyn TerminalRegistry>;
pub type ClockRef = Arc<dyn Clock>;
