use crate::domain::money::Amount;
use crate::domain::ports::{Ledger, SessionStore, TerminalRegistry, Transition};
use crate::domain::session::{BalanceSource, BearerToken, Session, SessionId, SessionStatus, UserId};
use crate::domain::terminal::{MerchantTerminal, TerminalCredential, TerminalId, TerminalRegistration};
use crate::domain::wallet::{EntryKind, LedgerDebit, LedgerEntry, LedgerReceipt, WalletAccount};
use crate::error::{Result, TapError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct SessionTable {
    by_id: HashMap<SessionId, Session>,
    by_token: HashMap<BearerToken, SessionId>,
}

/// A thread-safe in-memory session store.
///
/// Both indexes live behind one `RwLock`, so the status check and the write
/// in `compare_and_transition` happen under a single write guard. Clones
/// share the same table.
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    table: Arc<RwLock<SessionTable>>,
}

impl InMemorySessionStore {
    /// Creates a new, empty in-memory session store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: Session) -> Result<Session> {
        let mut table = self.table.write().await;
        if table.by_id.contains_key(&session.id) || table.by_token.contains_key(&session.token) {
            return Err(TapError::DuplicateSession);
        }
        table.by_token.insert(session.token.clone(), session.id);
        table.by_id.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_by_token(&self, token: &BearerToken) -> Result<Option<Session>> {
        let table = self.table.read().await;
        Ok(table
            .by_token
            .get(token)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn get(&self, id: SessionId) -> Result<Option<Session>> {
        let table = self.table.read().await;
        Ok(table.by_id.get(&id).cloned())
    }

    async fn compare_and_transition(
        &self,
        id: SessionId,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> Result<Transition> {
        let mut table = self.table.write().await;
        let session = table.by_id.get_mut(&id).ok_or(TapError::SessionNotFound)?;
        if session.status != expected || !expected.can_transition_to(next) {
            return Ok(Transition::Conflict {
                current: session.status,
            });
        }
        session.status = next;
        Ok(Transition::Applied)
    }
}

#[derive(Default)]
struct LedgerBook {
    accounts: HashMap<UserId, WalletAccount>,
    entries: Vec<LedgerEntry>,
}

/// A thread-safe in-memory wallet ledger.
///
/// Balance updates, the history entry and the reward points for one debit
/// are applied under the same write guard.
#[derive(Clone)]
pub struct InMemoryLedger {
    book: Arc<RwLock<LedgerBook>>,
    points_per_capture: u64,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    /// Creates an empty ledger that awards 10 points per capture.
    pub fn new() -> Self {
        Self::with_points(10)
    }

    pub fn with_points(points_per_capture: u64) -> Self {
        Self {
            book: Arc::default(),
            points_per_capture,
        }
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn debit(&self, debit: LedgerDebit) -> Result<LedgerReceipt> {
        let mut book = self.book.write().await;
        let account = book
            .accounts
            .entry(debit.user_id.clone())
            .or_insert_with(|| WalletAccount::new(debit.user_id.clone()));

        account.debit(debit.source, debit.amount)?;
        account.reward_points += self.points_per_capture;

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            user_id: debit.user_id.clone(),
            amount: debit.amount,
            category: debit.category.clone(),
            merchant: debit.merchant.clone(),
            description: debit.description(),
            kind: EntryKind::Debit,
            payment_method: debit.source,
            tap_session_id: Some(debit.session_id),
            terminal_id: Some(debit.terminal_id),
            recorded_at: Utc::now(),
        };
        let receipt = LedgerReceipt {
            entry_id: entry.id,
            points_earned: self.points_per_capture,
        };
        book.entries.push(entry);
        Ok(receipt)
    }

    async fn credit_all(&self, user_id: &UserId, credits: &[(BalanceSource, Amount)]) -> Result<()> {
        let mut book = self.book.write().await;
        book.accounts
            .entry(user_id.clone())
            .or_insert_with(|| WalletAccount::new(user_id.clone()))
            .credit_all(credits)?;
        let recorded_at = Utc::now();
        book.entries.extend(
            credits
                .iter()
                .map(|&(source, amount)| LedgerEntry::funds(user_id, source, amount, recorded_at)),
        );
        Ok(())
    }

    async fn account(&self, user_id: &UserId) -> Result<Option<WalletAccount>> {
        let book = self.book.read().await;
        Ok(book.accounts.get(user_id).cloned())
    }

    async fn entries(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>> {
        let book = self.book.read().await;
        Ok(book
            .entries
            .iter()
            .filter(|entry| &entry.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// A thread-safe in-memory terminal registry keyed by credential.
#[derive(Default, Clone)]
pub struct InMemoryTerminalRegistry {
    terminals: Arc<RwLock<HashMap<TerminalCredential, MerchantTerminal>>>,
}

impl InMemoryTerminalRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TerminalRegistry for InMemoryTerminalRegistry {
    async fn register(&self, registration: TerminalRegistration) -> Result<MerchantTerminal> {
        let terminal = registration.into_terminal(Utc::now())?;
        let mut terminals = self.terminals.write().await;
        terminals.insert(terminal.credential.clone(), terminal.clone());
        Ok(terminal)
    }

    async fn find_by_credential(
        &self,
        credential: &TerminalCredential,
    ) -> Result<Option<MerchantTerminal>> {
        let terminals = self.terminals.read().await;
        Ok(terminals.get(credential).cloned())
    }

    async fn deactivate(&self, id: TerminalId) -> Result<bool> {
        let mut terminals = self.terminals.write().await;
        match terminals.values_mut().find(|terminal| terminal.id == id) {
            Some(terminal) => {
                terminal.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
