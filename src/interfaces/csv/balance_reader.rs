use crate::domain::session::{BalanceSource, UserId};
use crate::error::{Result, TapError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of an opening-balance import.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OpeningBalance {
    pub user_id: UserId,
    pub meal_plan_swipes: u32,
    pub dining_dollars: Decimal,
    pub campus_card: Decimal,
}

impl OpeningBalance {
    /// Non-zero credits to apply, one per wallet.
    pub fn credits(&self) -> Vec<(BalanceSource, Decimal)> {
        [
            (BalanceSource::MealPlan, Decimal::from(self.meal_plan_swipes)),
            (BalanceSource::DiningDollars, self.dining_dollars),
            (BalanceSource::CampusCard, self.campus_card),
        ]
        .into_iter()
        .filter(|(_, amount)| !amount.is_zero())
        .collect()
    }
}

/// Reads opening balances from a CSV source.
///
/// Expects the header `user_id,meal_plan_swipes,dining_dollars,campus_card`.
/// Whitespace around fields is trimmed.
pub struct BalanceReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> BalanceReader<R> {
    /// Creates a new `BalanceReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and deserializes rows; a bad row does not stop the stream.
    pub fn balances(self) -> impl Iterator<Item = Result<OpeningBalance>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(TapError::from))
    }
}
