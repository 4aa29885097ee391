#![allow(dead_code)]

use campus_tap::application::authorizer::CaptureRequest;
use campus_tap::application::engine::{Backends, CreateSessionRequest, TapEngine};
use campus_tap::config::{SigningSecret, TapConfig};
use campus_tap::domain::session::{BalanceSource, BearerToken, UserId};
use campus_tap::domain::terminal::{MerchantTerminal, TerminalRegistration};
use campus_tap::infrastructure::clock::ManualClock;
use rust_decimal::Decimal;
use std::sync::Arc;

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const OTHER_SECRET: &str = "some-other-deployment-secret-0123456789";

/// An in-memory engine on a clock the test controls.
pub fn engine() -> (Arc<TapEngine>, ManualClock) {
    let clock = ManualClock::default();
    let config = TapConfig::default();
    let backends = Backends {
        clock: Arc::new(clock.clone()),
        ..Backends::in_memory(&config)
    };
    let secret = SigningSecret::new(SECRET).unwrap();
    let engine = TapEngine::new(&secret, &config, backends).unwrap();
    (Arc::new(engine), clock)
}

pub fn student(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

pub async fn terminal(engine: &TapEngine) -> MerchantTerminal {
    engine
        .register_terminal(TerminalRegistration {
            merchant_name: "North Cafe".into(),
            campus_location: "Library, ground floor".into(),
            category: "Dining".into(),
        })
        .await
        .unwrap()
}

/// Credits every wallet of `user` generously.
pub async fn fund(engine: &TapEngine, user: &UserId) {
    engine
        .add_funds(user, BalanceSource::MealPlan, Decimal::from(20))
        .await
        .unwrap();
    for source in [BalanceSource::DiningDollars, BalanceSource::CampusCard] {
        engine
            .add_funds(user, source, Decimal::from(500))
            .await
            .unwrap();
    }
}

pub fn session(source: &str, cap: Decimal) -> CreateSessionRequest {
    CreateSessionRequest {
        balance_source: source.into(),
        amount_cap: cap,
    }
}

pub fn capture(token: &BearerToken, amount: Decimal, terminal: &MerchantTerminal) -> CaptureRequest {
    CaptureRequest {
        token: token.clone(),
        amount,
        merchant_name: terminal.merchant_name.clone(),
        category: None,
        terminal_credential: terminal.credential.expose().to_string(),
    }
}
