use crate::error::{Result, TapError};
use std::fmt;
use std::time::Duration;

/// Shortest HMAC key accepted at start-up.
pub const MIN_SECRET_LEN: usize = 32;

/// Symmetric key shared by the token issuer and verifier.
///
/// `Debug` and `Display` never print the key.
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(TapError::Configuration(
                "signing secret is required".into(),
            ));
        }
        if secret.len() < MIN_SECRET_LEN {
            return Err(TapError::Configuration(format!(
                "signing secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        Ok(Self(secret))
    }

    pub fn expose_secret(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret([REDACTED])")
    }
}

impl fmt::Display for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Runtime knobs for issuing and capturing sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct TapConfig {
    /// How long a freshly issued token stays redeemable.
    pub session_window: Duration,
    /// Upper bound on a single session store round-trip.
    pub store_timeout: Duration,
    /// Upper bound on the ledger call that follows a capture.
    pub ledger_timeout: Duration,
    /// Category recorded when a terminal does not send one.
    pub default_category: String,
    /// Reward points credited per settled capture.
    pub points_per_capture: u64,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            session_window: Duration::from_secs(60),
            store_timeout: Duration::from_secs(2),
            ledger_timeout: Duration::from_secs(5),
            default_category: "Dining".to_string(),
            points_per_capture: 10,
        }
    }
}

impl TapConfig {
    pub fn validate(&self) -> Result<()> {
        if self.session_window.is_zero() {
            return Err(TapError::Configuration(
                "session window must be positive".into(),
            ));
        }
        if self.store_timeout.is_zero() || self.ledger_timeout.is_zero() {
            return Err(TapError::Configuration("timeouts must be positive".into()));
        }
        if self.default_category.trim().is_empty() {
            return Err(TapError::Configuration(
                "default category must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn window(&self) -> chrono::Duration {
        // Validated configs never exceed chrono's range in practice.
        chrono::Duration::from_std(self.session_window).unwrap_or(chrono::Duration::MAX)
    }
}
