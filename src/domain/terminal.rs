use crate::error::TapError;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const CREDENTIAL_PREFIX: &str = "TERM_";
const CREDENTIAL_HEX_LEN: usize = 32;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(transparent)]
pub struct TerminalId(pub Uuid);

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// API key a merchant terminal presents on every capture.
///
/// Well-formed credentials are `TERM_` followed by 32 lowercase hex digits.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TerminalCredential(String);

impl TerminalCredential {
    pub fn generate() -> Self {
        let mut bytes = [0u8; CREDENTIAL_HEX_LEN / 2];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(format!("{CREDENTIAL_PREFIX}{}", hex::encode(bytes)))
    }

    /// Checks the shape only; registration is checked by the registry.
    pub fn parse(raw: &str) -> Result<Self, TapError> {
        let well_formed = raw
            .strip_prefix(CREDENTIAL_PREFIX)
            .is_some_and(|hex| {
                hex.len() == CREDENTIAL_HEX_LEN
                    && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
            });
        if well_formed {
            Ok(Self(raw.to_owned()))
        } else {
            Err(TapError::UnauthorizedTerminal)
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TerminalCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TerminalCredential([REDACTED])")
    }
}

impl TryFrom<String> for TerminalCredential {
    type Error = TapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TerminalCredential> for String {
    fn from(credential: TerminalCredential) -> Self {
        credential.0
    }
}

/// A point-of-sale device allowed to redeem tap tokens.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MerchantTerminal {
    pub id: TerminalId,
    pub merchant_name: String,
    pub campus_location: String,
    pub category: String,
    pub credential: TerminalCredential,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Details supplied when registering a terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalRegistration {
    pub merchant_name: String,
    pub campus_location: String,
    pub category: String,
}

impl TerminalRegistration {
    pub fn into_terminal(self, now: DateTime<Utc>) -> Result<MerchantTerminal, TapError> {
        if self.merchant_name.trim().is_empty() {
            return Err(TapError::InvalidRequest(
                "Merchant name must not be empty".into(),
            ));
        }
        Ok(MerchantTerminal {
            id: TerminalId(Uuid::new_v4()),
            merchant_name: self.merchant_name,
            campus_location: self.campus_location,
            category: self.category,
            credential: TerminalCredential::generate(),
            active: true,
            created_at: now,
        })
    }
}
