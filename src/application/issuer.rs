use super::token_codec::TokenCodec;
use crate::config::TapConfig;
use crate::domain::claims::TokenClaims;
use crate::domain::money::Amount;
use crate::domain::ports::{ClockRef, SessionStoreRef};
use crate::domain::session::{BalanceSource, BearerToken, Session, SessionId, SessionStatus, UserId};
use crate::error::{Result, TapError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;

/// Returned to the student for rendering. `token` is the QR payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
    pub session_id: SessionId,
    pub token: BearerToken,
    pub expires_at: DateTime<Utc>,
    pub balance_source: BalanceSource,
    pub amount_cap: Decimal,
}

/// Creates tap sessions on behalf of an authenticated student.
pub struct SessionIssuer {
    codec: TokenCodec,
    sessions: SessionStoreRef,
    clock: ClockRef,
    window: chrono::Duration,
    store_timeout: Duration,
}

impl SessionIssuer {
    pub fn new(
        codec: TokenCodec,
        sessions: SessionStoreRef,
        clock: ClockRef,
        config: &TapConfig,
    ) -> Self {
        Self {
            codec,
            sessions,
            clock,
            window: config.window(),
            store_timeout: config.store_timeout,
        }
    }

    /// Mints a token for `amount_cap` on `balance_source` and stores the
    /// pending session it stands for.
    ///
    /// `balance_source` is the raw caller value; anything outside the closed
    /// set fails with `InvalidRequest`.
    pub async fn create_session(
        &self,
        user_id: UserId,
        balance_source: &str,
        amount_cap: Decimal,
    ) -> Result<SessionGrant> {
        let balance_source: BalanceSource = balance_source.parse()?;
        let amount_cap = Amount::new(amount_cap)?;

        let now = self.clock.now();
        // Claims carry millisecond precision; keep the row identical.
        let expires_at = DateTime::from_timestamp_millis((now + self.window).timestamp_millis())
            .ok_or_else(|| TapError::InvalidRequest("Expiry out of range".into()))?;

        let mut session = Session {
            id: SessionId::generate(),
            user_id,
            balance_source,
            amount_cap,
            token: BearerToken::new(String::new()),
            status: SessionStatus::Pending,
            created_at: now,
            expires_at,
        };
        session.token = self.codec.encode(&TokenClaims::for_session(&session))?;

        let session = tokio::time::timeout(self.store_timeout, self.sessions.create(session))
            .await
            .map_err(|_| TapError::StoreUnavailable)??;

        tracing::info!(
            session_id = %session.id,
            user_id = %session.user_id,
            balance_source = %session.balance_source,
            amount_cap = %session.amount_cap,
            token = %session.token.fingerprint(),
            "Tap session issued"
        );

        Ok(SessionGrant {
            session_id: session.id,
            token: session.token,
            expires_at: session.expires_at,
            balance_source: session.balance_source,
            amount_cap: session.amount_cap.value(),
        })
    }
}

impl SessionGrant {
    /// Truncated token for display beside the QR code.
    pub fn token_preview(&self) -> String {
        self.token.preview()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SigningSecret;
    use crate::domain::ports::{Clock, SessionStore};
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::InMemorySessionStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn issuer(store: Arc<InMemorySessionStore>, clock: ManualClock) -> SessionIssuer {
        let secret = SigningSecret::new("issuer-test-secret-key-0123456789abc").unwrap();
        SessionIssuer::new(
            TokenCodec::new(&secret).unwrap(),
            store,
            Arc::new(clock),
            &TapConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_create_session_persists_pending_row() {
        let store = Arc::new(InMemorySessionStore::new());
        let clock = ManualClock::default();
        let issuer = issuer(store.clone(), clock.clone());

        let grant = issuer
            .create_session(
                UserId::new("student-1").unwrap(),
                "dining_dollars",
                dec!(20.00),
            )
            .await
            .unwrap();

        let stored = store.get_by_token(&grant.token).await.unwrap().unwrap();
        assert_eq!(stored.id, grant.session_id);
        assert_eq!(stored.status, SessionStatus::Pending);
        assert_eq!(stored.balance_source, BalanceSource::DiningDollars);
        assert_eq!(stored.amount_cap.value(), dec!(20.00));
        assert_eq!(
            stored.expires_at.timestamp_millis(),
            (clock.now() + chrono::Duration::seconds(60)).timestamp_millis()
        );
        assert_eq!(grant.expires_at, stored.expires_at);
    }

    #[tokio::test]
    async fn test_token_claims_match_row() {
        let store = Arc::new(InMemorySessionStore::new());
        let clock = ManualClock::default();
        let issuer = issuer(store.clone(), clock.clone());

        let grant = issuer
            .create_session(UserId::new("student-1").unwrap(), "campus_card", dec!(7.5))
            .await
            .unwrap();
        let claims = issuer.codec.decode_at(&grant.token, clock.now()).unwrap();
        let stored = store.get(grant.session_id).await.unwrap().unwrap();
        assert_eq!(claims, TokenClaims::for_session(&stored));
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected() {
        let store = Arc::new(InMemorySessionStore::new());
        let issuer = issuer(store, ManualClock::default());
        let user = UserId::new("student-1").unwrap();

        for (source, cap) in [
            ("gift_card", dec!(5)),
            ("dining_dollars", dec!(0)),
            ("dining_dollars", dec!(-3)),
            ("campus_card", dec!(1.234)),
        ] {
            let result = issuer.create_session(user.clone(), source, cap).await;
            assert!(
                matches!(result, Err(TapError::InvalidRequest(_))),
                "{source} {cap}"
            );
        }
    }

    #[tokio::test]
    async fn test_identical_token_is_never_stored_twice() {
        let store = Arc::new(InMemorySessionStore::new());
        let clock = ManualClock::default();
        let issuer = issuer(store, clock.clone());
        let user = UserId::new("student-1").unwrap();

        issuer
            .create_session(user.clone(), "meal_plan", dec!(1))
            .await
            .unwrap();
        // Same claims in the same millisecond mint the same token
        let duplicate = issuer.create_session(user.clone(), "meal_plan", dec!(1)).await;
        assert!(matches!(duplicate, Err(TapError::DuplicateSession)));

        clock.advance(chrono::Duration::milliseconds(1));
        assert!(issuer.create_session(user, "meal_plan", dec!(1)).await.is_ok());
    }
}
