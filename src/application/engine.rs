use super::authorizer::{CaptureAuthorizer, CaptureReceipt, CaptureRequest};
use super::issuer::{SessionGrant, SessionIssuer};
use super::token_codec::TokenCodec;
use crate::config::{SigningSecret, TapConfig};
use crate::domain::money::Amount;
use crate::domain::ports::{ClockRef, LedgerRef, SessionStoreRef, TerminalRegistryRef};
use crate::domain::session::{BalanceSource, BearerToken, SessionId, SessionStatus, UserId};
use crate::domain::terminal::{MerchantTerminal, TerminalId, TerminalRegistration};
use crate::domain::wallet::{LedgerEntry, WalletAccount};
use crate::error::{Result, TapError};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::in_memory::{
    InMemoryLedger, InMemorySessionStore, InMemoryTerminalRegistry,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Student request to open a tap session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub balance_source: String,
    pub amount_cap: Decimal,
}

/// Read-only view of a session for its owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusView {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub balance_source: BalanceSource,
    pub amount_cap: Decimal,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// The storage adapters an engine runs against.
#[derive(Clone)]
pub struct Backends {
    pub sessions: SessionStoreRef,
    pub ledger: LedgerRef,
    pub terminals: TerminalRegistryRef,
    pub clock: ClockRef,
}

impl Backends {
    /// Fresh in-memory adapters on the system clock.
    pub fn in_memory(config: &TapConfig) -> Self {
        Self {
            sessions: Arc::new(InMemorySessionStore::new()),
            ledger: Arc::new(InMemoryLedger::with_points(config.points_per_capture)),
            terminals: Arc::new(InMemoryTerminalRegistry::new()),
            clock: Arc::new(SystemClock),
        }
    }
}

/// The main entry point for tap & pay.
///
/// `TapEngine` exposes the student operations (create, status) and the
/// terminal operation (authorize) over one shared set of backends. It is
/// `Send + Sync`; share it behind an `Arc` to serve concurrent requests.
pub struct TapEngine {
    issuer: SessionIssuer,
    authorizer: CaptureAuthorizer,
    backends: Backends,
    store_timeout: Duration,
}

impl TapEngine {
    /// Creates a new `TapEngine`.
    ///
    /// # Arguments
    ///
    /// * `secret` - The HMAC key shared by issuing and capturing.
    /// * `config` - Window, timeouts and capture defaults.
    /// * `backends` - Session store, ledger, terminal registry and clock.
    pub fn new(secret: &SigningSecret, config: &TapConfig, backends: Backends) -> Result<Self> {
        config.validate()?;
        let codec = TokenCodec::new(secret)?;
        let issuer = SessionIssuer::new(
            codec.clone(),
            backends.sessions.clone(),
            backends.clock.clone(),
            config,
        );
        let authorizer = CaptureAuthorizer::new(
            codec,
            backends.sessions.clone(),
            backends.terminals.clone(),
            backends.ledger.clone(),
            backends.clock.clone(),
            config,
        );
        Ok(Self {
            issuer,
            authorizer,
            backends,
            store_timeout: config.store_timeout,
        })
    }

    pub async fn create_session(
        &self,
        user_id: &UserId,
        request: CreateSessionRequest,
    ) -> Result<SessionGrant> {
        self.issuer
            .create_session(user_id.clone(), &request.balance_source, request.amount_cap)
            .await
    }

    pub async fn authorize(&self, request: CaptureRequest) -> Result<CaptureReceipt> {
        self.authorizer.authorize(request).await
    }

    /// Looks up a session owned by `user_id`. Has no side effects: a pending
    /// session past its window is reported as expired but not rewritten.
    pub async fn session_status(
        &self,
        user_id: &UserId,
        token: &BearerToken,
    ) -> Result<SessionStatusView> {
        let lookup = self.backends.sessions.get_by_token(token);
        let session = tokio::time::timeout(self.store_timeout, lookup)
            .await
            .map_err(|_| TapError::StoreUnavailable)??
            .filter(|session| &session.user_id == user_id)
            .ok_or(TapError::SessionNotFound)?;

        let now = self.backends.clock.now();
        Ok(SessionStatusView {
            session_id: session.id,
            status: session.effective_status(now),
            balance_source: session.balance_source,
            amount_cap: session.amount_cap.value(),
            expires_at: session.expires_at,
            created_at: session.created_at,
        })
    }

    pub async fn register_terminal(
        &self,
        registration: TerminalRegistration,
    ) -> Result<MerchantTerminal> {
        let terminal = self.backends.terminals.register(registration).await?;
        tracing::info!(terminal_id = %terminal.id, merchant = %terminal.merchant_name, "Terminal registered");
        Ok(terminal)
    }

    pub async fn deactivate_terminal(&self, id: TerminalId) -> Result<bool> {
        self.backends.terminals.deactivate(id).await
    }

    pub async fn add_funds(
        &self,
        user_id: &UserId,
        source: BalanceSource,
        amount: Decimal,
    ) -> Result<()> {
        let amount = Amount::new(amount)?;
        self.backends.ledger.credit(user_id, source, amount).await
    }

    /// Credits an opening balance across wallets. Every amount is validated
    /// first and the ledger applies them in one write, so a bad row moves
    /// nothing.
    pub async fn add_opening_balance(
        &self,
        user_id: &UserId,
        credits: &[(BalanceSource, Decimal)],
    ) -> Result<()> {
        let credits = credits
            .iter()
            .map(|&(source, amount)| Ok((source, Amount::new(amount)?)))
            .collect::<Result<Vec<_>>>()?;
        self.backends.ledger.credit_all(user_id, &credits).await
    }

    pub async fn wallet(&self, user_id: &UserId) -> Result<WalletAccount> {
        Ok(self
            .backends
            .ledger
            .account(user_id)
            .await?
            .unwrap_or_else(|| WalletAccount::new(user_id.clone())))
    }

    pub async fn history(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>> {
        self.backends.ledger.entries(user_id).await
    }
}
