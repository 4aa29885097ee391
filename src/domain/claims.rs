use super::session::{BalanceSource, Session, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The signed copy of a session's defining fields carried inside a token.
///
/// Field order is fixed, so serializing the same claims always yields the
/// same bytes. Unknown keys are rejected on decode.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TokenClaims {
    pub user_id: UserId,
    pub balance_source: BalanceSource,
    /// Encoded as a JSON number, not a string.
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub amount_cap: Decimal,
    /// Epoch milliseconds.
    pub expires_at: i64,
}

impl TokenClaims {
    pub fn for_session(session: &Session) -> Self {
        Self {
            user_id: session.user_id.clone(),
            balance_source: session.balance_source,
            amount_cap: session.amount_cap.value(),
            expires_at: session.expires_at.timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_claims_wire_keys() {
        let claims = TokenClaims {
            user_id: UserId::new("u-1").unwrap(),
            balance_source: BalanceSource::CampusCard,
            amount_cap: dec!(12.5),
            expires_at: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&claims).unwrap();
        assert_eq!(
            json,
            r#"{"userId":"u-1","balanceSource":"campus_card","amountCap":12.5,"expiresAt":1700000000000}"#
        );
    }

    #[test]
    fn test_claims_reject_extra_fields() {
        let json = r#"{"userId":"u-1","balanceSource":"campus_card","amountCap":1,"expiresAt":1,"admin":true}"#;
        assert!(serde_json::from_str::<TokenClaims>(json).is_err());
    }

    #[test]
    fn test_claims_reject_unknown_source() {
        let json = r#"{"userId":"u-1","balanceSource":"gift_card","amountCap":1,"expiresAt":1}"#;
        assert!(serde_json::from_str::<TokenClaims>(json).is_err());
    }
}
