use super::token_codec::TokenCodec;
use crate::config::TapConfig;
use crate::domain::claims::TokenClaims;
use crate::domain::money::Amount;
use crate::domain::ports::{ClockRef, LedgerRef, SessionStoreRef, TerminalRegistryRef, Transition};
use crate::domain::session::{BalanceSource, BearerToken, Session, SessionId, SessionStatus};
use crate::domain::terminal::{MerchantTerminal, TerminalCredential};
use crate::domain::wallet::LedgerDebit;
use crate::error::{MismatchedField, Result, TapError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// A merchant terminal's attempt to redeem a token.
///
/// Only `token` and `amount` influence the decision; every business field of
/// the session is read from the store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub token: BearerToken,
    pub amount: Decimal,
    pub merchant_name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub terminal_credential: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureReceipt {
    pub success: bool,
    pub session_id: SessionId,
    pub amount_captured: Decimal,
    pub points_earned: u64,
    pub balance_source: BalanceSource,
    pub ledger_entry_id: Uuid,
}

/// Redeems tap tokens on behalf of registered merchant terminals.
///
/// Checks run in a fixed order: terminal credential, token signature and
/// claims expiry, stored row lookup, stored expiry, claims against row, cap,
/// and finally the atomic `pending -> captured` transition. Money only moves
/// after that transition is won.
pub struct CaptureAuthorizer {
    codec: TokenCodec,
    sessions: SessionStoreRef,
    terminals: TerminalRegistryRef,
    ledger: LedgerRef,
    clock: ClockRef,
    default_category: String,
    store_timeout: Duration,
    ledger_timeout: Duration,
}

impl CaptureAuthorizer {
    pub fn new(
        codec: TokenCodec,
        sessions: SessionStoreRef,
        terminals: TerminalRegistryRef,
        ledger: LedgerRef,
        clock: ClockRef,
        config: &TapConfig,
    ) -> Self {
        Self {
            codec,
            sessions,
            terminals,
            ledger,
            clock,
            default_category: config.default_category.clone(),
            store_timeout: config.store_timeout,
            ledger_timeout: config.ledger_timeout,
        }
    }

    #[tracing::instrument(
        name = "capture",
        skip_all,
        fields(token = %request.token.fingerprint(), merchant = %request.merchant_name)
    )]
    pub async fn authorize(&self, request: CaptureRequest) -> Result<CaptureReceipt> {
        let result = self.try_authorize(request).await;
        match &result {
            Ok(receipt) => tracing::info!(
                session_id = %receipt.session_id,
                amount = %receipt.amount_captured,
                "Capture settled"
            ),
            Err(e) if e.requires_reconciliation() => {
                tracing::error!(kind = %e.kind(), error = %e, "Capture needs reconciliation")
            }
            Err(e) => tracing::warn!(kind = %e.kind(), "Capture rejected"),
        }
        result
    }

    async fn try_authorize(&self, request: CaptureRequest) -> Result<CaptureReceipt> {
        let terminal = self.authenticate(&request.terminal_credential).await?;

        let amount = Amount::new(request.amount)?;
        let merchant = request.merchant_name.trim();
        if merchant.is_empty() {
            return Err(TapError::InvalidRequest("Merchant name is required".into()));
        }

        let now = self.clock.now();
        let claims = self.codec.decode_at(&request.token, now)?;

        let session = self
            .within_store_timeout(self.sessions.get_by_token(&request.token))
            .await?
            .ok_or(TapError::SessionNotFound)?;

        if session.is_past_expiry(now) {
            self.mark_expired(&session).await;
            return Err(TapError::SessionExpired);
        }

        cross_validate(&claims, &session)?;

        if amount.value() > session.amount_cap.value() {
            return Err(TapError::CapExceeded {
                requested: amount.value(),
                cap: session.amount_cap.value(),
            });
        }

        let transition = self
            .within_store_timeout(self.sessions.compare_and_transition(
                session.id,
                SessionStatus::Pending,
                SessionStatus::Captured,
            ))
            .await?;
        if let Transition::Conflict { current } = transition {
            tracing::debug!(session_id = %session.id, %current, "Lost capture race");
            return Err(TapError::AlreadyFinalized);
        }

        // The session is consumed from here on, whatever the ledger says.
        let category = request
            .category
            .as_deref()
            .map(str::trim)
            .filter(|category| !category.is_empty())
            .unwrap_or(self.default_category.as_str())
            .to_string();
        let debit = LedgerDebit {
            user_id: session.user_id.clone(),
            source: session.balance_source,
            amount,
            session_id: session.id,
            merchant: merchant.to_string(),
            category,
            terminal_id: terminal.id,
        };

        let receipt = match tokio::time::timeout(self.ledger_timeout, self.ledger.debit(debit)).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(TapError::InsufficientFunds)) => return Err(TapError::InsufficientFunds),
            Ok(Err(e @ TapError::LedgerUnavailable(_))) => return Err(e),
            Ok(Err(e)) => return Err(TapError::LedgerUnavailable(e.to_string())),
            Err(_) => return Err(TapError::LedgerUnavailable("ledger call timed out".into())),
        };

        Ok(CaptureReceipt {
            success: true,
            session_id: session.id,
            amount_captured: amount.value(),
            points_earned: receipt.points_earned,
            balance_source: session.balance_source,
            ledger_entry_id: receipt.entry_id,
        })
    }

    async fn authenticate(&self, raw_credential: &str) -> Result<MerchantTerminal> {
        let credential = TerminalCredential::parse(raw_credential)?;
        match self
            .within_store_timeout(self.terminals.find_by_credential(&credential))
            .await?
        {
            Some(terminal) if terminal.active => Ok(terminal),
            _ => Err(TapError::UnauthorizedTerminal),
        }
    }

    /// Best effort: a concurrent capture or expiry may already have moved it.
    async fn mark_expired(&self, session: &Session) {
        let result = self
            .within_store_timeout(self.sessions.compare_and_transition(
                session.id,
                SessionStatus::Pending,
                SessionStatus::Expired,
            ))
            .await;
        if let Err(e) = result {
            tracing::warn!(session_id = %session.id, error = %e, "Could not mark session expired");
        }
    }

    async fn within_store_timeout<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.store_timeout, op)
            .await
            .map_err(|_| TapError::StoreUnavailable)?
    }
}

/// Every signed claim must equal the stored row; neither side wins a tie.
fn cross_validate(claims: &TokenClaims, session: &Session) -> Result<()> {
    if claims.user_id != session.user_id {
        return Err(TapError::SessionMismatch(MismatchedField::UserId));
    }
    if claims.balance_source != session.balance_source {
        return Err(TapError::SessionMismatch(MismatchedField::BalanceSource));
    }
    if claims.amount_cap != session.amount_cap.value() {
        return Err(TapError::SessionMismatch(MismatchedField::AmountCap));
    }
    Ok(())
}
