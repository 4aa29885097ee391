use campus_tap::domain::money::Amount;
use campus_tap::domain::ports::{
    Clock, ClockRef, LedgerRef, SessionStoreRef, TerminalRegistryRef, Transition,
};
use campus_tap::domain::session::{
    BalanceSource, BearerToken, Session, SessionId, SessionStatus, UserId,
};
use campus_tap::domain::terminal::TerminalRegistration;
use campus_tap::infrastructure::clock::SystemClock;
use campus_tap::infrastructure::in_memory::{
    InMemoryLedger, InMemorySessionStore, InMemoryTerminalRegistry,
};
use chrono::Duration;
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::test]
async fn test_ports_as_trait_objects() {
    let sessions: SessionStoreRef = Arc::new(InMemorySessionStore::new());
    let ledger: LedgerRef = Arc::new(InMemoryLedger::new());
    let terminals: TerminalRegistryRef = Arc::new(InMemoryTerminalRegistry::new());
    let clock: ClockRef = Arc::new(SystemClock);

    let now = clock.now();
    let session = Session {
        id: SessionId::generate(),
        user_id: UserId::new("student-1").unwrap(),
        balance_source: BalanceSource::CampusCard,
        amount_cap: Amount::new(dec!(9.99)).unwrap(),
        token: BearerToken::new("TAP_claims.mac"),
        status: SessionStatus::Pending,
        created_at: now,
        expires_at: now + Duration::seconds(60),
    };
    let id = session.id;

    // Verify Send + Sync by spawning tasks
    let session_handle = tokio::spawn(async move {
        sessions.create(session).await.unwrap();
        sessions
            .compare_and_transition(id, SessionStatus::Pending, SessionStatus::Captured)
            .await
            .unwrap()
    });

    let ledger_handle = tokio::spawn(async move {
        let user = UserId::new("student-1").unwrap();
        ledger
            .credit(&user, BalanceSource::CampusCard, Amount::new(dec!(12)).unwrap())
            .await
            .unwrap();
        ledger.account(&user).await.unwrap().unwrap()
    });

    let terminal_handle = tokio::spawn(async move {
        let terminal = terminals
            .register(TerminalRegistration {
                merchant_name: "South Deli".into(),
                campus_location: "Union".into(),
                category: "Dining".into(),
            })
            .await
            .unwrap();
        terminals
            .find_by_credential(&terminal.credential)
            .await
            .unwrap()
            .unwrap()
    });

    assert_eq!(session_handle.await.unwrap(), Transition::Applied);
    assert_eq!(ledger_handle.await.unwrap().campus_card.0, dec!(12));
    assert!(terminal_handle.await.unwrap().active);
}
