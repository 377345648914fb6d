//! Random sample transactions for the continuous producer.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use schemagate_schema::{Country, Currency, Transaction};
use uuid::Uuid;

pub const ACCOUNTS: [&str; 5] = ["ACC-1001", "ACC-1002", "ACC-1003", "ACC-1004", "ACC-1005"];

pub const MERCHANTS: [&str; 5] = ["Amazon", "Jarir Bookstore", "Carrefour", "STC Pay", "Noon"];

pub const MIN_AMOUNT: f64 = 100.0;
pub const MAX_AMOUNT: f64 = 10_000.0;

/// Produces plausible payments: a known account and merchant, an amount in
/// `[100, 10000)` rounded to cents, and the current time.
pub struct TransactionGenerator<R = StdRng> {
    rng: R,
}

impl TransactionGenerator<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible sequence, for tests.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for TransactionGenerator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> TransactionGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    pub fn next_transaction(&mut self) -> Transaction {
        let account = ACCOUNTS.choose(&mut self.rng).copied().unwrap_or(ACCOUNTS[0]);
        let merchant = MERCHANTS.choose(&mut self.rng).copied().unwrap_or(MERCHANTS[0]);
        let currency = *Currency::ALL.choose(&mut self.rng).unwrap_or(&Currency::SAR);
        let country = *Country::ALL.choose(&mut self.rng).unwrap_or(&Country::SA);

        Transaction::new(
            transaction_id(),
            account,
            self.amount(),
            currency,
            merchant,
            country,
            Utc::now().timestamp_millis(),
        )
    }

    fn amount(&mut self) -> f64 {
        let raw = self.rng.gen_range(MIN_AMOUNT..MAX_AMOUNT);
        let cents = (raw * 100.0).round() / 100.0;
        // Rounding can land on the exclusive upper bound
        if cents >= MAX_AMOUNT {
            (MAX_AMOUNT * 100.0 - 1.0) / 100.0
        } else {
            cents
        }
    }
}

/// `TXN-` followed by 12 upper-case hex digits.
pub fn transaction_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("TXN-{}", id[..12].to_uppercase())
}
