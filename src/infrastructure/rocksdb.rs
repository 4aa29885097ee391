use crate::domain::money::Amount;
use crate::domain::ports::{Ledger, SessionStore, TerminalRegistry, Transition};
use crate::domain::session::{BalanceSource, BearerToken, Session, SessionId, SessionStatus, UserId};
use crate::domain::terminal::{MerchantTerminal, TerminalCredential, TerminalId, TerminalRegistration};
use crate::domain::wallet::{EntryKind, LedgerDebit, LedgerEntry, LedgerReceipt, WalletAccount};
use crate::error::{Result, TapError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, TransactionDB,
    TransactionDBOptions,
};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Column Family for session rows, keyed by session id.
pub const CF_SESSIONS: &str = "sessions";
/// Column Family mapping a bearer token to its session id.
pub const CF_SESSION_TOKENS: &str = "session_tokens";
/// Column Family for wallet balances, keyed by user id.
pub const CF_WALLETS: &str = "wallets";
/// Column Family for ledger history, keyed by user id then time.
pub const CF_LEDGER_ENTRIES: &str = "ledger_entries";
/// Column Family for terminals, keyed by credential.
pub const CF_TERMINALS: &str = "terminals";
/// Column Family mapping a terminal id to its credential.
pub const CF_TERMINAL_IDS: &str = "terminal_ids";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_SESSIONS,
    CF_SESSION_TOKENS,
    CF_WALLETS,
    CF_LEDGER_ENTRIES,
    CF_TERMINALS,
    CF_TERMINAL_IDS,
];

/// A persistent store implementation using RocksDB.
///
/// Sessions, wallets and terminals live in separate Column Families of one
/// `TransactionDB`. Every read-modify-write (session creation, status
/// transitions, debits) runs inside a pessimistic transaction that locks the
/// key it read, so two callers can never both observe `pending` and both
/// write `captured`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<TransactionDB>,
    points_per_capture: u64,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));

        let db = TransactionDB::open_cf_descriptors(
            &opts,
            &TransactionDBOptions::default(),
            path,
            descriptors,
        )?;

        Ok(Self {
            db: Arc::new(db),
            points_per_capture: 10,
        })
    }

    /// Reward points credited on each successful debit.
    pub fn with_points(mut self, points_per_capture: u64) -> Self {
        self.points_per_capture = points_per_capture;
        self
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| TapError::Storage(format!("{name} column family not found")))
    }

    fn load_session(&self, id: SessionId) -> Result<Option<Session>> {
        let cf = self.cf(CF_SESSIONS)?;
        match self.db.get_cf(cf, id.0.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// `user \0 millis(be) entry-id`, so one user's history is a contiguous,
/// time-ordered range.
fn entry_key(user_id: &UserId, recorded_at: DateTime<Utc>, id: Uuid) -> Vec<u8> {
    let mut key = entry_prefix(user_id);
    key.extend_from_slice(&recorded_at.timestamp_millis().to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

fn entry_prefix(user_id: &UserId) -> Vec<u8> {
    let mut prefix = user_id.as_str().as_bytes().to_vec();
    prefix.push(0);
    prefix
}

#[async_trait]
impl SessionStore for RocksDbStore {
    async fn create(&self, session: Session) -> Result<Session> {
        let sessions = self.cf(CF_SESSIONS)?;
        let tokens = self.cf(CF_SESSION_TOKENS)?;

        let txn = self.db.transaction();
        let token_key = session.token.as_str().as_bytes();
        if txn.get_for_update_cf(tokens, token_key, true)?.is_some()
            || txn
                .get_for_update_cf(sessions, session.id.0.as_bytes(), true)?
                .is_some()
        {
            return Err(TapError::DuplicateSession);
        }
        txn.put_cf(tokens, token_key, session.id.0.as_bytes())?;
        txn.put_cf(sessions, session.id.0.as_bytes(), serde_json::to_vec(&session)?)?;
        txn.commit()?;

        Ok(session)
    }

    async fn get_by_token(&self, token: &BearerToken) -> Result<Option<Session>> {
        let tokens = self.cf(CF_SESSION_TOKENS)?;
        let Some(id) = self.db.get_cf(tokens, token.as_str().as_bytes())? else {
            return Ok(None);
        };
        let id = Uuid::from_slice(&id).map_err(TapError::storage)?;
        self.load_session(SessionId(id))
    }

    async fn get(&self, id: SessionId) -> Result<Option<Session>> {
        self.load_session(id)
    }

    async fn compare_and_transition(
        &self,
        id: SessionId,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> Result<Transition> {
        let sessions = self.cf(CF_SESSIONS)?;

        let txn = self.db.transaction();
        let bytes = txn
            .get_for_update_cf(sessions, id.0.as_bytes(), true)?
            .ok_or(TapError::SessionNotFound)?;
        let mut session: Session = serde_json::from_slice(&bytes)?;
        if session.status != expected || !expected.can_transition_to(next) {
            return Ok(Transition::Conflict {
                current: session.status,
            });
        }
        session.status = next;
        txn.put_cf(sessions, id.0.as_bytes(), serde_json::to_vec(&session)?)?;
        txn.commit()?;

        Ok(Transition::Applied)
    }
}

#[async_trait]
impl Ledger for RocksDbStore {
    async fn debit(&self, debit: LedgerDebit) -> Result<LedgerReceipt> {
        let wallets = self.cf(CF_WALLETS)?;
        let entries = self.cf(CF_LEDGER_ENTRIES)?;
        let user_key = debit.user_id.as_str().as_bytes();

        let txn = self.db.transaction();
        let mut account = match txn.get_for_update_cf(wallets, user_key, true)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => WalletAccount::new(debit.user_id.clone()),
        };
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
        txn.put_cf(wallets, user_key, serde_json::to_vec(&account)?)?;
        txn.put_cf(
            entries,
            entry_key(&entry.user_id, entry.recorded_at, entry.id),
            serde_json::to_vec(&entry)?,
        )?;
        txn.commit()?;

        Ok(LedgerReceipt {
            entry_id: entry.id,
            points_earned: self.points_per_capture,
        })
    }

    async fn credit_all(&self, user_id: &UserId, credits: &[(BalanceSource, Amount)]) -> Result<()> {
        let wallets = self.cf(CF_WALLETS)?;
        let entries = self.cf(CF_LEDGER_ENTRIES)?;
        let user_key = user_id.as_str().as_bytes();

        let txn = self.db.transaction();
        let mut account = match txn.get_for_update_cf(wallets, user_key, true)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => WalletAccount::new(user_id.clone()),
        };
        account.credit_all(credits)?;

        txn.put_cf(wallets, user_key, serde_json::to_vec(&account)?)?;
        let recorded_at = Utc::now();
        for &(source, amount) in credits {
            let entry = LedgerEntry::funds(user_id, source, amount, recorded_at);
            txn.put_cf(
                entries,
                entry_key(user_id, entry.recorded_at, entry.id),
                serde_json::to_vec(&entry)?,
            )?;
        }
        txn.commit()?;
        Ok(())
    }

    async fn account(&self, user_id: &UserId) -> Result<Option<WalletAccount>> {
        let wallets = self.cf(CF_WALLETS)?;
        match self.db.get_cf(wallets, user_id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn entries(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf(CF_LEDGER_ENTRIES)?;
        let prefix = entry_prefix(user_id);

        let mut history = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            history.push(serde_json::from_slice(&value)?);
        }
        Ok(history)
    }
}

#[async_trait]
impl TerminalRegistry for RocksDbStore {
    async fn register(&self, registration: TerminalRegistration) -> Result<MerchantTerminal> {
        let terminals = self.cf(CF_TERMINALS)?;
        let ids = self.cf(CF_TERMINAL_IDS)?;
        let terminal = registration.into_terminal(Utc::now())?;

        let txn = self.db.transaction();
        let credential = terminal.credential.expose().as_bytes();
        txn.put_cf(terminals, credential, serde_json::to_vec(&terminal)?)?;
        txn.put_cf(ids, terminal.id.0.as_bytes(), credential)?;
        txn.commit()?;

        Ok(terminal)
    }

    async fn find_by_credential(
        &self,
        credential: &TerminalCredential,
    ) -> Result<Option<MerchantTerminal>> {
        let terminals = self.cf(CF_TERMINALS)?;
        match self.db.get_cf(terminals, credential.expose().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn deactivate(&self, id: TerminalId) -> Result<bool> {
        let terminals = self.cf(CF_TERMINALS)?;
        let ids = self.cf(CF_TERMINAL_IDS)?;

        let Some(credential) = self.db.get_cf(ids, id.0.as_bytes())? else {
            return Ok(false);
        };
        let txn = self.db.transaction();
        let Some(bytes) = txn.get_for_update_cf(terminals, &credential, true)? else {
            return Ok(false);
        };
        let mut terminal: MerchantTerminal = serde_json::from_slice(&bytes)?;
        terminal.active = false;
        txn.put_cf(terminals, &credential, serde_json::to_vec(&terminal)?)?;
        txn.commit()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn session(token: &str) -> Session {
        let now = Utc::now();
        Session {
            id: SessionId::generate(),
            user_id: UserId::new("student-1").unwrap(),
            balance_source: BalanceSource::DiningDollars,
            amount_cap: Amount::new(dec!(10.00)).unwrap(),
            token: BearerToken::new(token),
            status: SessionStatus::Pending,
            created_at: now,
            expires_at: now + Duration::seconds(60),
        }
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some(), "{name}");
        }
    }

    #[tokio::test]
    async fn test_rocksdb_session_lifecycle() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        let session = session("TAP_a.b");

        store.create(session.clone()).await.unwrap();
        assert!(matches!(
            store.create(session.clone()).await,
            Err(TapError::DuplicateSession)
        ));

        let found = store.get_by_token(&session.token).await.unwrap().unwrap();
        assert_eq!(found, session);

        let first = store
            .compare_and_transition(session.id, SessionStatus::Pending, SessionStatus::Captured)
            .await
            .unwrap();
        assert_eq!(first, Transition::Applied);

        let second = store
            .compare_and_transition(session.id, SessionStatus::Pending, SessionStatus::Captured)
            .await
            .unwrap();
        assert_eq!(
            second,
            Transition::Conflict {
                current: SessionStatus::Captured
            }
        );

        assert!(
            store
                .get_by_token(&BearerToken::new("TAP_other"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_rocksdb_sessions_survive_reopen() {
        let dir = tempdir().unwrap();
        let session = session("TAP_persist.me");
        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            store.create(session.clone()).await.unwrap();
            store
                .compare_and_transition(session.id, SessionStatus::Pending, SessionStatus::Captured)
                .await
                .unwrap();
        }

        let store = RocksDbStore::open(dir.path()).unwrap();
        let reloaded = store.get(session.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SessionStatus::Captured);
        assert_eq!(reloaded.amount_cap, session.amount_cap);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rocksdb_concurrent_transition_applies_once() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        let session = session("TAP_race.once");
        store.create(session.clone()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .compare_and_transition(
                        session.id,
                        SessionStatus::Pending,
                        SessionStatus::Captured,
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Transition::Applied => applied += 1,
                Transition::Conflict { current } => {
                    assert_eq!(current, SessionStatus::Captured)
                }
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(
            store.get(session.id).await.unwrap().unwrap().status,
            SessionStatus::Captured
        );
    }

    #[tokio::test]
    async fn test_rocksdb_ledger_debit_and_history() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        let user = UserId::new("student-1").unwrap();
        let other = UserId::new("student-10").unwrap();

        store
            .credit(&user, BalanceSource::CampusCard, Amount::new(dec!(20)).unwrap())
            .await
            .unwrap();
        store
            .credit(&other, BalanceSource::CampusCard, Amount::new(dec!(5)).unwrap())
            .await
            .unwrap();

        let receipt = store
            .debit(LedgerDebit {
                user_id: user.clone(),
                source: BalanceSource::CampusCard,
                amount: Amount::new(dec!(4.50)).unwrap(),
                session_id: SessionId::generate(),
                merchant: "North Cafe".into(),
                category: "Dining".into(),
                terminal_id: TerminalId(Uuid::new_v4()),
            })
            .await
            .unwrap();
        assert_eq!(receipt.points_earned, 10);

        let account = store.account(&user).await.unwrap().unwrap();
        assert_eq!(account.campus_card.0, dec!(15.50));
        assert_eq!(account.reward_points, 10);

        let history = store.entries(&user).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|entry| entry.user_id == user));
        assert_eq!(history[1].description, "Tap & Pay: North Cafe");

        let result = store
            .debit(LedgerDebit {
                user_id: other.clone(),
                source: BalanceSource::CampusCard,
                amount: Amount::new(dec!(9)).unwrap(),
                session_id: SessionId::generate(),
                merchant: "North Cafe".into(),
                category: "Dining".into(),
                terminal_id: TerminalId(Uuid::new_v4()),
            })
            .await;
        assert!(matches!(result, Err(TapError::InsufficientFunds)));
        assert_eq!(store.entries(&other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_terminal_registry() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let terminal = store
            .register(TerminalRegistration {
                merchant_name: "North Cafe".into(),
                campus_location: "Library".into(),
                category: "Dining".into(),
            })
            .await
            .unwrap();

        let found = store
            .find_by_credential(&terminal.credential)
            .await
            .unwrap()
            .unwrap();
        assert!(found.active);

        assert!(store.deactivate(terminal.id).await.unwrap());
        let found = store
            .find_by_credential(&terminal.credential)
            .await
            .unwrap()
            .unwrap();
        assert!(!found.active);

        assert!(!store.deactivate(TerminalId(Uuid::new_v4())).await.unwrap());
    }
}
