use super::money::{Amount, Balance};
use super::session::{BalanceSource, SessionId, UserId};
use super::terminal::TerminalId;
use crate::error::TapError;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-student balances across the three campus wallets.
///
/// Meal plan balances are counted in swipes; the two cash wallets hold
/// decimal balances.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct WalletAccount {
    pub user_id: UserId,
    pub meal_plan_swipes: u32,
    pub dining_dollars: Balance,
    pub campus_card: Balance,
    pub reward_points: u64,
}

impl WalletAccount {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            meal_plan_swipes: 0,
            dining_dollars: Balance::ZERO,
            campus_card: Balance::ZERO,
            reward_points: 0,
        }
    }

    /// Debits a wallet if it can cover the charge. A meal plan charge always
    /// consumes exactly one swipe, whatever the amount.
    pub fn debit(&mut self, source: BalanceSource, amount: Amount) -> Result<(), TapError> {
        let amount = Balance::from(amount);
        match source {
            BalanceSource::MealPlan => {
                if self.meal_plan_swipes == 0 {
                    return Err(TapError::InsufficientFunds);
                }
                self.meal_plan_swipes -= 1;
            }
            BalanceSource::DiningDollars => {
                if self.dining_dollars < amount {
                    return Err(TapError::InsufficientFunds);
                }
                self.dining_dollars -= amount;
            }
            BalanceSource::CampusCard => {
                if self.campus_card < amount {
                    return Err(TapError::InsufficientFunds);
                }
                self.campus_card -= amount;
            }
        }
        Ok(())
    }

    /// Adds funds to one wallet. For the meal plan the amount is a swipe count.
    /// A credit that would overflow the wallet is refused and changes nothing.
    pub fn credit(&mut self, source: BalanceSource, amount: Amount) -> Result<(), TapError> {
        match source {
            BalanceSource::MealPlan => {
                self.meal_plan_swipes = self
                    .meal_plan_swipes
                    .checked_add(swipe_count(amount)?)
                    .ok_or_else(|| TapError::InvalidRequest("Too many meal plan swipes".into()))?;
            }
            BalanceSource::DiningDollars => {
                self.dining_dollars = add_to_balance(self.dining_dollars, amount)?;
            }
            BalanceSource::CampusCard => {
                self.campus_card = add_to_balance(self.campus_card, amount)?;
            }
        }
        Ok(())
    }

    /// Applies every credit or none of them.
    pub fn credit_all(&mut self, credits: &[(BalanceSource, Amount)]) -> Result<(), TapError> {
        let mut updated = self.clone();
        for (source, amount) in credits {
            updated.credit(*source, *amount)?;
        }
        *self = updated;
        Ok(())
    }
}

fn add_to_balance(balance: Balance, amount: Amount) -> Result<Balance, TapError> {
    balance
        .checked_add(amount.into())
        .ok_or_else(|| TapError::InvalidRequest("Balance limit exceeded".into()))
}

fn swipe_count(amount: Amount) -> Result<u32, TapError> {
    let value = amount.value();
    if !value.fract().is_zero() {
        return Err(TapError::InvalidRequest(
            "Meal plan credits must be whole swipes".into(),
        ));
    }
    value
        .to_u32()
        .ok_or_else(|| TapError::InvalidRequest("Too many meal plan swipes".into()))
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Debit,
    Credit,
}

/// A line in the student's transaction history.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub amount: Amount,
    pub category: String,
    pub merchant: String,
    pub description: String,
    pub kind: EntryKind,
    pub payment_method: BalanceSource,
    pub tap_session_id: Option<SessionId>,
    pub terminal_id: Option<TerminalId>,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// History line for money added to a wallet.
    pub fn funds(
        user_id: &UserId,
        source: BalanceSource,
        amount: Amount,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.clone(),
            amount,
            category: "Funds".to_string(),
            merchant: "Campus Wallet".to_string(),
            description: format!("Added funds to {source}"),
            kind: EntryKind::Credit,
            payment_method: source,
            tap_session_id: None,
            terminal_id: None,
            recorded_at,
        }
    }
}

/// What the authorizer asks the ledger to settle after a capture.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerDebit {
    pub user_id: UserId,
    pub source: BalanceSource,
    pub amount: Amount,
    pub session_id: SessionId,
    pub merchant: String,
    pub category: String,
    pub terminal_id: TerminalId,
}

impl LedgerDebit {
    pub fn description(&self) -> String {
        format!("Tap & Pay: {}", self.merchant)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReceipt {
    pub entry_id: Uuid,
    pub points_earned: u64,
}
