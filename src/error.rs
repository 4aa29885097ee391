use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Machine-checkable failure kinds reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidRequest,
    InvalidFormat,
    InvalidSignature,
    Expired,
    SessionNotFound,
    SessionExpired,
    SessionMismatch,
    CapExceeded,
    AlreadyFinalized,
    UnauthorizedTerminal,
    InsufficientFunds,
    LedgerUnavailable,
    StoreUnavailable,
    Storage,
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InvalidFormat => "INVALID_FORMAT",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::Expired => "EXPIRED",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::SessionMismatch => "SESSION_MISMATCH",
            Self::CapExceeded => "CAP_EXCEEDED",
            Self::AlreadyFinalized => "ALREADY_FINALIZED",
            Self::UnauthorizedTerminal => "UNAUTHORIZED_TERMINAL",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::LedgerUnavailable => "LEDGER_UNAVAILABLE",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::Storage => "STORAGE",
            Self::Configuration => "CONFIGURATION",
        };
        f.write_str(name)
    }
}

/// Field of a session that disagreed with the signed claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchedField {
    UserId,
    BalanceSource,
    AmountCap,
}

impl fmt::Display for MismatchedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserId => f.write_str("user"),
            Self::BalanceSource => f.write_str("balance source"),
            Self::AmountCap => f.write_str("amount cap"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TapError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    // Format and signature failures share one client-visible message.
    #[error("Invalid token")]
    InvalidFormat,
    #[error("Invalid token")]
    InvalidSignature,
    #[error("Token expired")]
    Expired,
    #[error("An identical session was already issued")]
    DuplicateSession,
    #[error("Session not found")]
    SessionNotFound,
    #[error("Session expired")]
    SessionExpired,
    #[error("Session {0} mismatch")]
    SessionMismatch(MismatchedField),
    #[error("Amount {requested} exceeds session cap {cap}")]
    CapExceeded { requested: Decimal, cap: Decimal },
    #[error("Session already used")]
    AlreadyFinalized,
    #[error("Invalid terminal credentials")]
    UnauthorizedTerminal,
    #[error("Insufficient balance")]
    InsufficientFunds,
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),
    #[error("Session store unavailable")]
    StoreUnavailable,
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

impl TapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) | Self::DuplicateSession => ErrorKind::InvalidRequest,
            Self::InvalidFormat => ErrorKind::InvalidFormat,
            Self::InvalidSignature => ErrorKind::InvalidSignature,
            Self::Expired => ErrorKind::Expired,
            Self::SessionNotFound => ErrorKind::SessionNotFound,
            Self::SessionExpired => ErrorKind::SessionExpired,
            Self::SessionMismatch(_) => ErrorKind::SessionMismatch,
            Self::CapExceeded { .. } => ErrorKind::CapExceeded,
            Self::AlreadyFinalized => ErrorKind::AlreadyFinalized,
            Self::UnauthorizedTerminal => ErrorKind::UnauthorizedTerminal,
            Self::InsufficientFunds => ErrorKind::InsufficientFunds,
            Self::LedgerUnavailable(_) => ErrorKind::LedgerUnavailable,
            Self::StoreUnavailable => ErrorKind::StoreUnavailable,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Storage(_) | Self::Csv(_) | Self::Serialization(_) => ErrorKind::Storage,
            #[cfg(feature = "storage-rocksdb")]
            Self::RocksDb(_) => ErrorKind::Storage,
        }
    }

    /// The authorization was consumed but settlement still has to be reconciled.
    pub fn requires_reconciliation(&self) -> bool {
        matches!(self, Self::LedgerUnavailable(_))
    }

    /// The token can never succeed again; the student has to mint a new session.
    pub fn is_final_for_token(&self) -> bool {
        matches!(
            self,
            Self::AlreadyFinalized | Self::SessionExpired | Self::Expired
        )
    }

    pub(crate) fn storage(e: impl fmt::Display) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TapError>;
